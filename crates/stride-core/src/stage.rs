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

//! Identifiers of the stages a subject executes.

use std::fmt;

/// A named point in the per-step pipeline.
///
/// The first four are driven by the movement pipeline itself and cannot be
/// executed explicitly. `Stay` and `Interpolate` are the per-tick and
/// per-render notifications. `Custom` stages are defined by gameplay code
/// and may be executed from anywhere, including from inside another stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Start of a move, before any data is derived.
    BeginMove,
    /// Velocities and pending delta are derived here.
    PrepareData,
    /// After every (sub-)step of the move.
    AfterMoveStep,
    /// End of a move.
    EndMove,
    /// Tick notification for every tracked processor.
    Stay,
    /// Render notification for every tracked processor.
    Interpolate,
    /// A user-defined stage.
    Custom(&'static str),
}

impl StageKind {
    /// `true` for the stages owned by the movement pipeline.
    pub const fn is_builtin(&self) -> bool {
        !matches!(self, StageKind::Custom(_))
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::BeginMove => write!(f, "BeginMove"),
            StageKind::PrepareData => write!(f, "PrepareData"),
            StageKind::AfterMoveStep => write!(f, "AfterMoveStep"),
            StageKind::EndMove => write!(f, "EndMove"),
            StageKind::Stay => write!(f, "Stay"),
            StageKind::Interpolate => write!(f, "Interpolate"),
            StageKind::Custom(name) => write!(f, "Custom({name})"),
        }
    }
}
