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

//! Stage objects and stage frames.
//!
//! A stage object is passed to every processor taking part in a stage and
//! may carry stage-local state (see [`AfterMoveStep`]). It also acts as the
//! last participant of its own stage through [`Stage::execute`].
//!
//! User-defined stages implement [`Stage`] with a [`StageKind::Custom`]
//! kind and forward [`Stage::invoke`] to [`Processor::custom_stage`]:
//!
//! ```
//! use stride_kcc::{Kcc, Processor, Stage, StageKind};
//! use stride_core::KccData;
//!
//! #[derive(Default)]
//! struct Footsteps {
//!     emitted: u32,
//! }
//!
//! impl Stage for Footsteps {
//!     fn kind(&self) -> StageKind {
//!         StageKind::Custom("footsteps")
//!     }
//!
//!     fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData) {
//!         processor.custom_stage(self, kcc, data);
//!     }
//! }
//! ```

mod builtin;
mod frame;

pub use builtin::{AfterMoveStep, BeginMove, EndMove, HitsQuery, PrepareData};
pub use frame::{PostProcess, StageFrame};

pub(crate) use builtin::{InterpolateStage, StayStage};

use crate::kcc::Kcc;
use crate::processor::{AsAny, Processor};
use stride_core::{KccData, StageKind};

/// A stage object.
pub trait Stage: AsAny {
    /// Which stage this object drives.
    fn kind(&self) -> StageKind;

    /// Calls the callback of `processor` matching this stage.
    fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData);

    /// Runs before the first processor.
    fn before_stage(&mut self, _kcc: &mut Kcc, _data: &mut KccData) {}

    /// Runs after the last processor, before queued post-processes.
    fn execute(&mut self, _kcc: &mut Kcc, _data: &mut KccData) {}

    /// Runs after queued post-processes.
    fn after_stage(&mut self, _kcc: &mut Kcc, _data: &mut KccData) {}
}
