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

//! Capability providers: collaborators that may expose a processor and
//! gate when their interaction with a subject starts or stops.

use crate::kcc::Kcc;
use crate::processor::{AsAny, ProcessorRef};
use std::sync::atomic::{AtomicBool, Ordering};
use stride_core::KccData;

/// Resolves a collaborator to zero or one processor.
pub trait InteractionProvider: AsAny {
    /// Vetoes the start of an interaction.
    fn can_start_interaction(&self, _kcc: &Kcc, _data: &KccData) -> bool {
        true
    }

    /// Vetoes the end of an interaction. Ignored when the subject is
    /// despawned or a removal is forced.
    fn can_stop_interaction(&self, _kcc: &Kcc, _data: &KccData) -> bool {
        true
    }

    /// The processor this collaborator contributes, if any.
    fn processor(&self) -> Option<ProcessorRef> {
        None
    }
}

/// A provider wrapping a fixed processor, with runtime-switchable gates.
pub struct ProcessorProvider {
    processor: Option<ProcessorRef>,
    can_start: AtomicBool,
    can_stop: AtomicBool,
}

impl ProcessorProvider {
    /// Wraps `processor`. Both gates start open.
    pub fn new(processor: ProcessorRef) -> Self {
        Self {
            processor: Some(processor),
            can_start: AtomicBool::new(true),
            can_stop: AtomicBool::new(true),
        }
    }

    /// A provider without a processor; the interaction is tracked only.
    pub fn empty() -> Self {
        Self {
            processor: None,
            can_start: AtomicBool::new(true),
            can_stop: AtomicBool::new(true),
        }
    }

    /// Opens or closes the start gate.
    pub fn set_can_start(&self, value: bool) {
        self.can_start.store(value, Ordering::Relaxed);
    }

    /// Opens or closes the stop gate.
    pub fn set_can_stop(&self, value: bool) {
        self.can_stop.store(value, Ordering::Relaxed);
    }
}

impl InteractionProvider for ProcessorProvider {
    fn can_start_interaction(&self, _kcc: &Kcc, _data: &KccData) -> bool {
        self.can_start.load(Ordering::Relaxed)
    }

    fn can_stop_interaction(&self, _kcc: &Kcc, _data: &KccData) -> bool {
        self.can_stop.load(Ordering::Relaxed)
    }

    fn processor(&self) -> Option<ProcessorRef> {
        self.processor.clone()
    }
}

/// Source of externally injected processors.
///
/// Asked once per processor cache pass to append its processors to a
/// buffer owned by the subject.
pub trait ProcessorSource: Send + Sync {
    /// Appends processors to `out`.
    fn collect(&self, out: &mut Vec<ProcessorRef>);
}

impl<F> ProcessorSource for F
where
    F: Fn(&mut Vec<ProcessorRef>) + Send + Sync,
{
    fn collect(&self, out: &mut Vec<ProcessorRef>) {
        self(out)
    }
}
