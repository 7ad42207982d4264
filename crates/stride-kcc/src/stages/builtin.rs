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

//! Stage objects driven by the movement pipeline.

use super::Stage;
use crate::kcc::Kcc;
use crate::physics::OverlapInfo;
use crate::processor::Processor;
use stride_core::{KccData, StageKind};

/// Start of a move. Features can be enforced or suppressed here.
#[derive(Debug, Default)]
pub struct BeginMove;

impl Stage for BeginMove {
    fn kind(&self) -> StageKind {
        StageKind::BeginMove
    }

    fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData) {
        processor.begin_move(self, kcc, data);
    }
}

/// Velocities and the pending delta of the move are derived here.
#[derive(Debug, Default)]
pub struct PrepareData;

impl Stage for PrepareData {
    fn kind(&self) -> StageKind {
        StageKind::PrepareData
    }

    fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData) {
        processor.prepare_data(self, kcc, data);
    }
}

/// End of a move.
#[derive(Debug, Default)]
pub struct EndMove;

impl Stage for EndMove {
    fn kind(&self) -> StageKind {
        StageKind::EndMove
    }

    fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData) {
        processor.end_move(self, kcc, data);
    }
}

/// How hits are re-derived after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitsQuery {
    /// Reuse the base query if all of its hits lie within the extent,
    /// query again otherwise.
    #[default]
    Default,
    /// Always reuse the base query.
    Reuse,
    /// Always query again.
    New,
}

/// After every (sub-)step of a move.
///
/// Carries the overlap query of the step. Processors that move the
/// subject can ask for hits to be re-derived once the stage ends.
#[derive(Debug, Default)]
pub struct AfterMoveStep {
    /// Overlap query of this step, ignored colliders already filtered out.
    pub overlap_info: OverlapInfo,
    update_hits_requested: bool,
    update_hits_query: HitsQuery,
}

impl AfterMoveStep {
    /// Re-derive hits when the stage ends. With `force_new_query` a fresh
    /// overlap query is made even if the step's query would do.
    pub fn request_update_hits(&mut self, force_new_query: bool) {
        self.update_hits_requested = true;
        if force_new_query {
            self.update_hits_query = HitsQuery::New;
        }
    }

    /// `true` if a processor asked for hits to be re-derived.
    pub fn update_hits_requested(&self) -> bool {
        self.update_hits_requested
    }
}

impl Stage for AfterMoveStep {
    fn kind(&self) -> StageKind {
        StageKind::AfterMoveStep
    }

    fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData) {
        processor.after_move_step(self, kcc, data);
    }

    fn before_stage(&mut self, _kcc: &mut Kcc, _data: &mut KccData) {
        self.update_hits_requested = false;
        self.update_hits_query = HitsQuery::Default;
    }

    fn after_stage(&mut self, kcc: &mut Kcc, data: &mut KccData) {
        if self.update_hits_requested {
            kcc.update_hits(data, Some(&self.overlap_info), self.update_hits_query);
        }
    }
}

/// Dispatches `on_stay` to the cached processors.
#[derive(Debug, Default)]
pub(crate) struct StayStage;

impl Stage for StayStage {
    fn kind(&self) -> StageKind {
        StageKind::Stay
    }

    fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData) {
        processor.on_stay(kcc, data);
    }
}

/// Dispatches `on_interpolate` to the cached processors.
#[derive(Debug, Default)]
pub(crate) struct InterpolateStage;

impl Stage for InterpolateStage {
    fn kind(&self) -> StageKind {
        StageKind::Interpolate
    }

    fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData) {
        processor.on_interpolate(kcc, data);
    }
}
