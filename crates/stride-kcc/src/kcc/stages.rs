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

//! Stage execution: the frame stack, dispatch loop and the queries a
//! processor may issue while it runs.

use super::Kcc;
use crate::processor::{same_processor, sort_by_priority, Processor};
use crate::stages::{Stage, StageFrame};
use std::sync::Arc;
use stride_core::{KccData, KccError, KccFeatures, KccResult, StageKind};

impl Kcc {
    /// Executes a custom stage.
    ///
    /// Built-in kinds are driven by the movement pipeline and rejected
    /// here. Outside any active stage the processor cache is rebuilt first;
    /// from inside a processor callback the stage runs nested over the
    /// processors of the current move.
    pub fn execute_stage(&mut self, stage: &mut dyn Stage, data: &mut KccData) -> KccResult<()> {
        if !self.spawned {
            return Ok(());
        }

        let kind = stage.kind();
        if kind.is_builtin() {
            log::error!("{}: {kind} can only be executed by the movement pipeline", self.name);
            return Err(KccError::ReservedStage(kind));
        }

        if self.active_stages.is_empty() {
            self.cache_processors();
        }
        self.run_stage(stage, data)
    }

    /// Runs one stage to completion on a fresh frame.
    pub(crate) fn run_stage(&mut self, stage: &mut dyn Stage, data: &mut KccData) -> KccResult<()> {
        if !self.spawned {
            return Ok(());
        }

        let kind = stage.kind();
        let depth = self.active_stages.len();
        let limit = self.settings.max_nested_stages;
        if depth >= limit {
            log::error!("{}: {kind} exceeds the nested stage limit of {limit}", self.name);
            return Err(KccError::NestedStageOverflow { limit });
        }

        self.frame_serial = self.frame_serial.wrapping_add(1);
        let serial = self.frame_serial;
        let mut frame = self.frame_pool.acquire();
        frame.begin(kind, depth, serial);
        self.gather_stage_processors(kind, &mut frame);
        self.active_stages.push(frame);

        stage.before_stage(self, data);

        let mut index = 0;
        loop {
            let Some(frame) = self.frame_mut(depth, serial) else {
                break;
            };
            if index >= frame.processors.len() {
                break;
            }
            frame.advance_to(index);
            let slot = frame.processors[index].clone();
            index += 1;

            let Some(processor) = slot else {
                continue;
            };
            if !processor.is_active(self) {
                continue;
            }
            if self.settings.trace_stages {
                log::trace!("{}: {kind} [{depth}] -> {}", self.name, processor.name());
            }
            stage.invoke(processor.as_ref(), self, data);
        }

        match self.frame_mut(depth, serial) {
            Some(frame) => frame.finish_dispatch(),
            None => return self.finish_stage(kind, depth, serial),
        }

        stage.execute(self, data);
        self.run_post_processes(depth, serial, data);
        stage.after_stage(self, data);
        self.run_post_processes(depth, serial, data);

        self.finish_stage(kind, depth, serial)
    }

    fn gather_stage_processors(&mut self, kind: StageKind, frame: &mut StageFrame) {
        match kind {
            StageKind::Stay | StageKind::Interpolate => {
                frame.processors.extend(self.cached_processors.iter().cloned());
            }
            _ => {
                frame.processors.extend(
                    self.stage_processors
                        .iter()
                        .filter(|slot| slot.as_ref().is_some_and(|p| p.handles_stage(kind)))
                        .cloned(),
                );
                let mut priorities = std::mem::take(&mut self.sort_priorities);
                sort_by_priority(&mut frame.processors, &mut priorities, |slot| {
                    slot.as_ref().map_or(f32::MIN, |p| p.stage_priority(kind, self))
                });
                self.sort_priorities = priorities;
            }
        }
    }

    fn frame_mut(&mut self, depth: usize, serial: u64) -> Option<&mut StageFrame> {
        self.active_stages
            .get_mut(depth)
            .filter(|frame| frame.serial == serial)
    }

    /// Runs queued actions until the frame's queue stays empty. Actions may
    /// queue further actions on the same frame.
    fn run_post_processes(&mut self, depth: usize, serial: u64, data: &mut KccData) {
        loop {
            let Some(frame) = self.frame_mut(depth, serial) else {
                return;
            };
            if frame.post_processes.is_empty() {
                return;
            }

            let mut queued = std::mem::take(&mut frame.post_processes);
            for action in queued.drain(..) {
                action(self, data);
            }

            if let Some(frame) = self.frame_mut(depth, serial) {
                if frame.post_processes.is_empty() {
                    frame.post_processes = queued;
                }
            }
        }
    }

    fn finish_stage(&mut self, kind: StageKind, depth: usize, serial: u64) -> KccResult<()> {
        if self.active_stages.last().is_some_and(|top| top.serial == serial) {
            if let Some(mut frame) = self.active_stages.pop() {
                frame.clear();
                self.frame_pool.release(frame);
            }
            return Ok(());
        }

        // Despawn drains the stack from inside a callback.
        if !self.spawned {
            return Ok(());
        }

        log::error!("{}: {kind} at depth {depth} is not on top of the stage stack", self.name);
        if let Some(position) = self.active_stages.iter().position(|f| f.serial == serial) {
            for mut frame in self.active_stages.split_off(position) {
                frame.clear();
                self.frame_pool.release(frame);
            }
        }
        Err(KccError::StageStackCorrupted { kind })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stage state
    // ─────────────────────────────────────────────────────────────────────

    /// Kind of the innermost active stage.
    pub fn current_stage(&self) -> Option<StageKind> {
        self.active_stages.last().and_then(StageFrame::kind)
    }

    /// Number of active stage frames.
    pub fn stage_depth(&self) -> usize {
        self.active_stages.len()
    }

    /// The innermost active frame.
    pub fn active_frame(&self) -> Option<&StageFrame> {
        self.active_stages.last()
    }

    fn top_frame(&self, operation: &'static str) -> KccResult<&StageFrame> {
        self.active_stages
            .last()
            .ok_or(KccError::NoActiveStage { operation })
    }

    fn top_frame_mut(&mut self, operation: &'static str) -> KccResult<&mut StageFrame> {
        self.active_stages
            .last_mut()
            .ok_or(KccError::NoActiveStage { operation })
    }

    fn frames_of(
        &self,
        kind: StageKind,
        operation: &'static str,
    ) -> KccResult<impl DoubleEndedIterator<Item = &StageFrame>> {
        if self.active_stages.is_empty() {
            return Err(KccError::NoActiveStage { operation });
        }
        Ok(self
            .active_stages
            .iter()
            .filter(move |frame| frame.kind == Some(kind)))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pending / executed queries
    // ─────────────────────────────────────────────────────────────────────

    /// `true` if `processor` has not run yet in the current stage.
    pub fn has_pending_processor(&self, processor: &dyn Processor) -> KccResult<bool> {
        Ok(self.top_frame("has_pending_processor")?.has_pending(processor))
    }

    /// Like [`has_pending_processor`](Self::has_pending_processor) over
    /// every active stage of `kind`.
    pub fn has_pending_processor_in_stage(
        &self,
        kind: StageKind,
        processor: &dyn Processor,
    ) -> KccResult<bool> {
        Ok(self
            .frames_of(kind, "has_pending_processor_in_stage")?
            .any(|frame| frame.has_pending(processor)))
    }

    /// `true` if a `T` has not run yet in the current stage.
    pub fn has_pending_processor_of<T: Processor>(&self) -> KccResult<bool> {
        Ok(self.top_frame("has_pending_processor_of")?.has_pending_of::<T>())
    }

    /// Like [`has_pending_processor_of`](Self::has_pending_processor_of)
    /// over every active stage of `kind`.
    pub fn has_pending_processor_of_in_stage<T: Processor>(&self, kind: StageKind) -> KccResult<bool> {
        Ok(self
            .frames_of(kind, "has_pending_processor_of_in_stage")?
            .any(StageFrame::has_pending_of::<T>))
    }

    /// The next `T` that will run in the current stage.
    pub fn get_pending_processor<T: Processor>(&self) -> KccResult<Option<Arc<T>>> {
        Ok(self.top_frame("get_pending_processor")?.pending_of::<T>())
    }

    /// Every `T` still pending in the current stage, in dispatch order.
    /// `out` is cleared first.
    pub fn get_pending_processors<T: Processor>(&self, out: &mut Vec<Arc<T>>) -> KccResult<()> {
        out.clear();
        self.top_frame("get_pending_processors")?.pending_into(out);
        Ok(())
    }

    /// The next pending `T` in the innermost active stage of `kind` that
    /// still has one.
    pub fn get_pending_processor_in_stage<T: Processor>(&self, kind: StageKind) -> KccResult<Option<Arc<T>>> {
        Ok(self
            .frames_of(kind, "get_pending_processor_in_stage")?
            .rev()
            .find_map(StageFrame::pending_of::<T>))
    }

    /// Every `T` still pending in the active stages of `kind`, innermost
    /// stage first. `out` is cleared first.
    pub fn get_pending_processors_in_stage<T: Processor>(
        &self,
        kind: StageKind,
        out: &mut Vec<Arc<T>>,
    ) -> KccResult<()> {
        out.clear();
        for frame in self.frames_of(kind, "get_pending_processors_in_stage")?.rev() {
            frame.pending_into(out);
        }
        Ok(())
    }

    /// `true` if `processor` already ran in the current stage.
    pub fn has_executed_processor(&self, processor: &dyn Processor) -> KccResult<bool> {
        Ok(self.top_frame("has_executed_processor")?.has_executed(processor))
    }

    /// Like [`has_executed_processor`](Self::has_executed_processor) over
    /// every active stage of `kind`.
    pub fn has_executed_processor_in_stage(
        &self,
        kind: StageKind,
        processor: &dyn Processor,
    ) -> KccResult<bool> {
        Ok(self
            .frames_of(kind, "has_executed_processor_in_stage")?
            .any(|frame| frame.has_executed(processor)))
    }

    /// `true` if a `T` already ran in the current stage.
    pub fn has_executed_processor_of<T: Processor>(&self) -> KccResult<bool> {
        Ok(self.top_frame("has_executed_processor_of")?.has_executed_of::<T>())
    }

    /// Like [`has_executed_processor_of`](Self::has_executed_processor_of)
    /// over every active stage of `kind`.
    pub fn has_executed_processor_of_in_stage<T: Processor>(&self, kind: StageKind) -> KccResult<bool> {
        Ok(self
            .frames_of(kind, "has_executed_processor_of_in_stage")?
            .any(StageFrame::has_executed_of::<T>))
    }

    /// The most recently executed `T` of the current stage.
    pub fn get_executed_processor<T: Processor>(&self) -> KccResult<Option<Arc<T>>> {
        Ok(self.top_frame("get_executed_processor")?.executed_of::<T>())
    }

    /// Every `T` already executed in the current stage, in dispatch order.
    /// `out` is cleared first.
    pub fn get_executed_processors<T: Processor>(&self, out: &mut Vec<Arc<T>>) -> KccResult<()> {
        out.clear();
        self.top_frame("get_executed_processors")?.executed_into(out);
        Ok(())
    }

    /// The most recently executed `T` of the innermost active stage of
    /// `kind` that ran one.
    pub fn get_executed_processor_in_stage<T: Processor>(&self, kind: StageKind) -> KccResult<Option<Arc<T>>> {
        Ok(self
            .frames_of(kind, "get_executed_processor_in_stage")?
            .rev()
            .find_map(StageFrame::executed_of::<T>))
    }

    /// Every `T` already executed in the active stages of `kind`, outermost
    /// stage first. `out` is cleared first.
    pub fn get_executed_processors_in_stage<T: Processor>(
        &self,
        kind: StageKind,
        out: &mut Vec<Arc<T>>,
    ) -> KccResult<()> {
        out.clear();
        for frame in self.frames_of(kind, "get_executed_processors_in_stage")? {
            frame.executed_into(out);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Suppression
    // ─────────────────────────────────────────────────────────────────────

    /// Skips `processor` for the rest of the current stage.
    ///
    /// With `in_future_stages` it is also skipped by every later stage of
    /// this move. Returns `true` if a pending slot was nulled.
    pub fn suppress_processor(
        &mut self,
        processor: &dyn Processor,
        in_future_stages: bool,
    ) -> KccResult<bool> {
        let suppressed = self.top_frame_mut("suppress_processor")?.suppress(processor);
        if in_future_stages {
            self.retain_stage_processors(|p| !same_processor(p, processor));
        }
        Ok(suppressed)
    }

    /// Skips `processor` in every active stage of `kind`.
    pub fn suppress_processor_in_stage(
        &mut self,
        kind: StageKind,
        processor: &dyn Processor,
    ) -> KccResult<bool> {
        if self.active_stages.is_empty() {
            return Err(KccError::NoActiveStage { operation: "suppress_processor_in_stage" });
        }
        let mut suppressed = false;
        for frame in self.active_stages.iter_mut().filter(|f| f.kind == Some(kind)) {
            suppressed |= frame.suppress(processor);
        }
        Ok(suppressed)
    }

    /// Skips every pending `T` of the current stage.
    pub fn suppress_processors_of<T: Processor>(&mut self, in_future_stages: bool) -> KccResult<bool> {
        let suppressed = self.top_frame_mut("suppress_processors_of")?.suppress_of::<T>();
        if in_future_stages {
            self.retain_stage_processors(|p| !p.as_any().is::<T>());
        }
        Ok(suppressed)
    }

    /// Skips every pending `T` in every active stage of `kind`.
    pub fn suppress_processors_of_in_stage<T: Processor>(&mut self, kind: StageKind) -> KccResult<bool> {
        if self.active_stages.is_empty() {
            return Err(KccError::NoActiveStage { operation: "suppress_processors_of_in_stage" });
        }
        let mut suppressed = false;
        for frame in self.active_stages.iter_mut().filter(|f| f.kind == Some(kind)) {
            suppressed |= frame.suppress_of::<T>();
        }
        Ok(suppressed)
    }

    /// Skips every pending processor of the current stage except `keep`.
    pub fn suppress_processors_except(
        &mut self,
        keep: &dyn Processor,
        in_future_stages: bool,
    ) -> KccResult<()> {
        self.top_frame_mut("suppress_processors_except")?.suppress_except(keep);
        if in_future_stages {
            self.retain_stage_processors(|p| same_processor(p, keep));
        }
        Ok(())
    }

    /// Skips every pending processor of the current stage that is not a `T`.
    pub fn suppress_processors_except_of<T: Processor>(&mut self, in_future_stages: bool) -> KccResult<()> {
        self.top_frame_mut("suppress_processors_except_of")?.suppress_except_of::<T>();
        if in_future_stages {
            self.retain_stage_processors(|p| p.as_any().is::<T>());
        }
        Ok(())
    }

    /// Skips every pending processor that is not a `T` in every active
    /// stage of `kind`.
    pub fn suppress_processors_except_of_in_stage<T: Processor>(&mut self, kind: StageKind) -> KccResult<()> {
        if self.active_stages.is_empty() {
            return Err(KccError::NoActiveStage { operation: "suppress_processors_except_of_in_stage" });
        }
        for frame in self.active_stages.iter_mut().filter(|f| f.kind == Some(kind)) {
            frame.suppress_except_of::<T>();
        }
        Ok(())
    }

    fn retain_stage_processors(&mut self, mut keep: impl FnMut(&dyn Processor) -> bool) {
        for slot in &mut self.stage_processors {
            if slot.as_ref().is_some_and(|p| !keep(p.as_ref())) {
                *slot = None;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Post-processes
    // ─────────────────────────────────────────────────────────────────────

    /// Queues `action` to run when the current stage finishes dispatching.
    pub fn enqueue_post_process<F>(&mut self, action: F) -> KccResult<()>
    where
        F: FnOnce(&mut Kcc, &mut KccData) + Send + 'static,
    {
        self.top_frame_mut("enqueue_post_process")?
            .post_processes
            .push(Box::new(action));
        Ok(())
    }

    /// Queues `action` on the innermost active stage of `kind`. Returns
    /// `false` if no stage of that kind is active.
    pub fn enqueue_post_process_in_stage<F>(&mut self, kind: StageKind, action: F) -> KccResult<bool>
    where
        F: FnOnce(&mut Kcc, &mut KccData) + Send + 'static,
    {
        if self.active_stages.is_empty() {
            return Err(KccError::NoActiveStage { operation: "enqueue_post_process_in_stage" });
        }
        match self
            .active_stages
            .iter_mut()
            .rev()
            .find(|frame| frame.kind == Some(kind))
        {
            Some(frame) => {
                frame.post_processes.push(Box::new(action));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Features
    // ─────────────────────────────────────────────────────────────────────

    /// Activates `feature` for the current move.
    pub fn enforce_feature(&mut self, feature: KccFeatures) -> KccResult<()> {
        self.require_begin_move("enforce_feature")?;
        self.active_features.insert(feature);
        Ok(())
    }

    /// Deactivates `feature` for the current move.
    pub fn suppress_feature(&mut self, feature: KccFeatures) -> KccResult<()> {
        self.require_begin_move("suppress_feature")?;
        self.active_features.remove(feature);
        Ok(())
    }

    fn require_begin_move(&self, operation: &'static str) -> KccResult<()> {
        let root = self
            .active_stages
            .first()
            .ok_or(KccError::NoActiveStage { operation })?;
        if root.kind == Some(StageKind::BeginMove) {
            Ok(())
        } else {
            log::warn!("{}: {operation} outside of {}", self.name, StageKind::BeginMove);
            Err(KccError::StageRestricted {
                operation,
                required: StageKind::BeginMove,
            })
        }
    }
}
