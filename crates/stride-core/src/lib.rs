// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Stride Core
//!
//! Foundational types shared by every part of the stride movement core:
//! the per-step [`KccData`] record, [`KccSettings`], network-stable
//! identifiers, stage identifiers, the error taxonomy, and the pooled
//! free-list allocator used to keep the hot path allocation-free.
//!
//! Nothing in this crate knows about processors or the controller itself.

#![warn(missing_docs)]

pub mod bitflags;
pub mod data;
pub mod error;
pub mod features;
pub mod id;
pub mod math;
pub mod pool;
pub mod settings;
pub mod stage;

pub use data::KccData;
pub use error::{KccError, KccResult};
pub use features::KccFeatures;
pub use id::{ColliderId, NetworkId};
pub use math::{Vec3, EPSILON};
pub use pool::Pool;
pub use settings::KccSettings;
pub use stage::StageKind;
