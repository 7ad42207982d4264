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

//! # Stride KCC
//!
//! The execution core of a kinematic character controller.
//!
//! A [`Kcc`] tracks its relationships with the simulated world in
//! pooled interaction registries (collisions, modifiers, ignores, hits).
//! Each relationship may contribute a [`Processor`]. Every move runs a
//! fixed sequence of stages and dispatches each processor that opts into a
//! stage in a deterministic order: priority, then category, then
//! registration order. Processors can inspect and suppress the rest of
//! the stage, run nested custom stages and queue post-processes.
//!
//! Snapshots of the subject's state feed rollback and resimulation.

#![warn(missing_docs)]

pub mod entity;
pub mod interactions;
pub mod kcc;
pub mod physics;
pub mod processor;
pub mod processors;
pub mod provider;
pub mod snapshot;
pub mod stages;

pub use entity::{EntityResolver, NetworkEntity};
pub use interactions::{Interaction, InteractionKind, InteractionSet, Interactions};
pub use kcc::Kcc;
pub use physics::{CollisionType, OverlapHit, OverlapInfo, PhysicsQuery};
pub use processor::{downcast_arc, is_processor, same_processor, AsAny, Processor, ProcessorRef};
pub use provider::{InteractionProvider, ProcessorProvider, ProcessorSource};
pub use snapshot::{IgnoredCollider, InteractionIds, KccSnapshot, RebuildReport, SnapshotHistory};
pub use stages::{AfterMoveStep, BeginMove, EndMove, HitsQuery, PostProcess, PrepareData, Stage, StageFrame};

pub use stride_core;
pub use stride_core::{
    ColliderId, KccData, KccError, KccFeatures, KccResult, KccSettings, NetworkId, Pool, StageKind, Vec3,
};
