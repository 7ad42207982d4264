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

//! One entry of the stage stack.

use crate::kcc::Kcc;
use crate::processor::{downcast_arc, is_processor, same_processor, Processor, ProcessorRef};
use std::sync::Arc;
use stride_core::{KccData, StageKind};

/// Deferred action queued by a processor, run when its stage ends.
pub type PostProcess = Box<dyn FnOnce(&mut Kcc, &mut KccData) + Send>;

/// Execution state of one (possibly nested) stage.
///
/// Holds the processors captured when the stage began, in dispatch order.
/// While processor `i` runs, slots `i + 1..` are *pending* and slots `..i`
/// are *executed*. Before dispatch starts everything is pending; once it
/// ends everything is executed. Only pending slots can be suppressed.
#[derive(Default)]
pub struct StageFrame {
    pub(crate) kind: Option<StageKind>,
    pub(crate) depth: usize,
    pub(crate) serial: u64,
    pub(crate) processors: Vec<Option<ProcessorRef>>,
    pub(crate) next: usize,
    pub(crate) current: Option<usize>,
    pub(crate) post_processes: Vec<PostProcess>,
}

impl StageFrame {
    pub(crate) fn begin(&mut self, kind: StageKind, depth: usize, serial: u64) {
        self.kind = Some(kind);
        self.depth = depth;
        self.serial = serial;
        self.processors.clear();
        self.next = 0;
        self.current = None;
        self.post_processes.clear();
    }

    /// Clears every slot and queued action before the frame is pooled.
    pub(crate) fn clear(&mut self) {
        self.kind = None;
        self.depth = 0;
        self.serial = 0;
        self.processors.clear();
        self.next = 0;
        self.current = None;
        self.post_processes.clear();
    }

    /// Marks slot `index` as running.
    pub(crate) fn advance_to(&mut self, index: usize) {
        self.current = Some(index);
        self.next = index + 1;
    }

    /// Ends dispatch: every slot counts as executed.
    pub(crate) fn finish_dispatch(&mut self) {
        self.current = None;
        self.next = self.processors.len();
    }

    /// The stage this frame runs.
    pub fn kind(&self) -> Option<StageKind> {
        self.kind
    }

    /// Nesting depth, `0` for a root stage.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of processors captured for this stage.
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    fn pending(&self) -> impl Iterator<Item = &ProcessorRef> {
        let start = self.next.min(self.processors.len());
        self.processors[start..].iter().flatten()
    }

    fn executed(&self) -> impl Iterator<Item = &ProcessorRef> {
        let end = self.current.unwrap_or(self.next).min(self.processors.len());
        self.processors[..end].iter().flatten()
    }

    fn pending_slots(&mut self) -> &mut [Option<ProcessorRef>] {
        let start = self.next.min(self.processors.len());
        &mut self.processors[start..]
    }

    // --- Pending ---

    /// `true` if `processor` has yet to run in this stage.
    pub fn has_pending(&self, processor: &dyn Processor) -> bool {
        self.pending().any(|p| same_processor(p.as_ref(), processor))
    }

    /// `true` if a processor of type `T` has yet to run.
    pub fn has_pending_of<T: Processor>(&self) -> bool {
        self.pending().any(|p| is_processor::<T>(p.as_ref()))
    }

    /// The first pending processor of type `T`.
    pub fn pending_of<T: Processor>(&self) -> Option<Arc<T>> {
        self.pending().find_map(downcast_arc::<T, _>)
    }

    /// Appends every pending processor of type `T` to `out`.
    pub fn pending_into<T: Processor>(&self, out: &mut Vec<Arc<T>>) {
        out.extend(self.pending().filter_map(downcast_arc::<T, _>));
    }

    // --- Executed ---

    /// `true` if `processor` already ran in this stage.
    pub fn has_executed(&self, processor: &dyn Processor) -> bool {
        self.executed().any(|p| same_processor(p.as_ref(), processor))
    }

    /// `true` if a processor of type `T` already ran.
    pub fn has_executed_of<T: Processor>(&self) -> bool {
        self.executed().any(|p| is_processor::<T>(p.as_ref()))
    }

    /// The most recently executed processor of type `T`.
    pub fn executed_of<T: Processor>(&self) -> Option<Arc<T>> {
        let end = self.current.unwrap_or(self.next).min(self.processors.len());
        self.processors[..end]
            .iter()
            .rev()
            .flatten()
            .find_map(downcast_arc::<T, _>)
    }

    /// Appends every executed processor of type `T` to `out`, in run order.
    pub fn executed_into<T: Processor>(&self, out: &mut Vec<Arc<T>>) {
        out.extend(self.executed().filter_map(downcast_arc::<T, _>));
    }

    // --- Suppression ---

    /// Skips `processor` if it is pending.
    pub fn suppress(&mut self, processor: &dyn Processor) -> bool {
        for slot in self.pending_slots() {
            if slot.as_ref().is_some_and(|p| same_processor(p.as_ref(), processor)) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Skips every pending processor of type `T`.
    pub fn suppress_of<T: Processor>(&mut self) -> bool {
        let mut suppressed = false;
        for slot in self.pending_slots() {
            if slot.as_ref().is_some_and(|p| is_processor::<T>(p.as_ref())) {
                *slot = None;
                suppressed = true;
            }
        }
        suppressed
    }

    /// Skips every pending processor except `processor`.
    pub fn suppress_except(&mut self, processor: &dyn Processor) {
        for slot in self.pending_slots() {
            if slot.as_ref().is_some_and(|p| !same_processor(p.as_ref(), processor)) {
                *slot = None;
            }
        }
    }

    /// Skips every pending processor that is not a `T`.
    pub fn suppress_except_of<T: Processor>(&mut self) {
        for slot in self.pending_slots() {
            if slot.as_ref().is_some_and(|p| !is_processor::<T>(p.as_ref())) {
                *slot = None;
            }
        }
    }

    /// Nulls `processor` in every slot, executed or not.
    pub(crate) fn forget(&mut self, processor: &dyn Processor) {
        for slot in &mut self.processors {
            if slot.as_ref().is_some_and(|p| same_processor(p.as_ref(), processor)) {
                *slot = None;
            }
        }
    }
}

impl std::fmt::Debug for StageFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageFrame")
            .field("kind", &self.kind)
            .field("depth", &self.depth)
            .field("processors", &self.processors.len())
            .field("next", &self.next)
            .field("post_processes", &self.post_processes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    impl Processor for A {}
    struct B;
    impl Processor for B {}

    fn frame(processors: &[ProcessorRef]) -> StageFrame {
        let mut frame = StageFrame::default();
        frame.begin(StageKind::Custom("test"), 0, 1);
        frame.processors.extend(processors.iter().cloned().map(Some));
        frame
    }

    #[test]
    fn test_windows_follow_the_cursor() {
        let a: ProcessorRef = Arc::new(A);
        let b: ProcessorRef = Arc::new(B);
        let c: ProcessorRef = Arc::new(A);
        let mut frame = frame(&[a.clone(), b.clone(), c.clone()]);

        assert!(frame.has_pending(a.as_ref()));
        assert!(!frame.has_executed_of::<A>());

        frame.advance_to(1);
        assert!(frame.has_executed(a.as_ref()));
        assert!(!frame.has_pending(b.as_ref()));
        assert!(!frame.has_executed(b.as_ref()));
        assert!(frame.has_pending(c.as_ref()));

        frame.finish_dispatch();
        assert!(frame.has_executed(c.as_ref()));
        assert!(!frame.has_pending_of::<A>());
    }

    #[test]
    fn test_suppression_only_touches_pending() {
        let a: ProcessorRef = Arc::new(A);
        let b: ProcessorRef = Arc::new(B);
        let c: ProcessorRef = Arc::new(A);
        let mut frame = frame(&[a.clone(), b.clone(), c.clone()]);

        frame.advance_to(1);
        assert!(!frame.suppress(a.as_ref()));
        assert!(!frame.suppress(b.as_ref()));
        assert!(frame.suppress_of::<A>());
        assert!(frame.processors[0].is_some());
        assert!(frame.processors[2].is_none());
    }

    #[test]
    fn test_suppress_except_keeps_one() {
        let procs: Vec<ProcessorRef> = vec![Arc::new(A), Arc::new(B), Arc::new(A), Arc::new(B)];
        let mut frame = frame(&procs);
        frame.advance_to(0);
        frame.suppress_except(procs[3].as_ref());
        let alive: Vec<bool> = frame.processors.iter().map(Option::is_some).collect();
        assert_eq!(alive, vec![true, false, false, true]);
    }
}
