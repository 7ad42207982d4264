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

//! Errors raised by the controller.
//!
//! Only programmer and setup defects end up here. Routine outcomes such as
//! a missing record or an unresolvable entity are reported as `bool` or
//! `Option` by the operations themselves.

use crate::stage::StageKind;
use thiserror::Error;

/// Convenience alias for results carrying a [`KccError`].
pub type KccResult<T> = Result<T, KccError>;

/// Error taxonomy of the controller core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KccError {
    /// A stage-scoped query or mutation was made while no stage runs.
    #[error("`{operation}` requires an active stage")]
    NoActiveStage {
        /// The rejected operation.
        operation: &'static str,
    },

    /// A built-in stage was requested explicitly.
    #[error("stage {0} is driven by the movement pipeline and cannot be executed explicitly")]
    ReservedStage(StageKind),

    /// The operation is only valid inside a specific root stage.
    #[error("`{operation}` is only valid inside the {required} stage")]
    StageRestricted {
        /// The rejected operation.
        operation: &'static str,
        /// The stage it is restricted to.
        required: StageKind,
    },

    /// Nested stage execution went deeper than configured.
    #[error("nested stage limit of {limit} exceeded")]
    NestedStageOverflow {
        /// The configured limit.
        limit: usize,
    },

    /// The frame popped at the end of a stage was not the one it pushed.
    #[error("stage frame stack corrupted while finishing {kind}")]
    StageStackCorrupted {
        /// The stage that was finishing.
        kind: StageKind,
    },

    /// The subject has been despawned.
    #[error("the subject is not spawned")]
    NotSpawned,

    /// Settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Settings text could not be parsed.
    #[error("failed to parse settings: {0}")]
    SettingsParse(String),

    /// A snapshot could not be encoded, decoded or applied.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}
