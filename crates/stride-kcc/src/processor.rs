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

//! The processor capability.
//!
//! A processor is any collaborator that wants a say in how the subject
//! moves. It never owns anything the subject owns: registries hold weak
//! references to it, stage frames hold short-lived strong ones.
//!
//! Processors are shared (`Arc`) and called through `&self`, so
//! implementations keep mutable state behind interior mutability.

use crate::kcc::Kcc;
use crate::stages::{AfterMoveStep, BeginMove, EndMove, PrepareData, Stage};
use std::any::Any;
use std::sync::Arc;
use stride_core::{KccData, StageKind};

/// Shared handle to a processor.
pub type ProcessorRef = Arc<dyn Processor>;

/// Dynamic type access for trait objects.
///
/// Implemented for every sized `'static` type. Call it on the trait object
/// itself (`processor.as_ref().as_any()`), not on the `Arc` holding it.
pub trait AsAny: Any + Send + Sync {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Returns `self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Converts a shared handle into a shared `Any` handle.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Callbacks a collaborator exposes to the movement pipeline.
///
/// Every method has a no-op default. Stage callbacks are only dispatched
/// for the stages a processor declares through
/// [`handles_stage`](Processor::handles_stage); the enter/exit/stay and
/// interpolate notifications reach every tracked processor.
pub trait Processor: AsAny {
    /// Name used in log messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Inactive processors stay registered but are skipped by every stage.
    fn is_active(&self, _kcc: &Kcc) -> bool {
        true
    }

    /// Execution priority. Higher runs first.
    fn priority(&self, _kcc: &Kcc) -> f32 {
        0.0
    }

    /// Priority within one stage, defaults to [`priority`](Processor::priority).
    fn stage_priority(&self, _kind: StageKind, kcc: &Kcc) -> f32 {
        self.priority(kcc)
    }

    /// Declares the stages whose callbacks this processor implements.
    fn handles_stage(&self, _kind: StageKind) -> bool {
        false
    }

    /// The processor started interacting with the subject.
    fn on_enter(&self, _kcc: &mut Kcc, _data: &mut KccData) {}

    /// The processor stopped interacting with the subject.
    fn on_exit(&self, _kcc: &mut Kcc, _data: &mut KccData) {}

    /// Once per simulated move, after `EndMove`.
    fn on_stay(&self, _kcc: &mut Kcc, _data: &mut KccData) {}

    /// Once per render update.
    fn on_interpolate(&self, _kcc: &mut Kcc, _data: &mut KccData) {}

    /// `BeginMove` stage callback.
    fn begin_move(&self, _stage: &mut BeginMove, _kcc: &mut Kcc, _data: &mut KccData) {}

    /// `PrepareData` stage callback.
    fn prepare_data(&self, _stage: &mut PrepareData, _kcc: &mut Kcc, _data: &mut KccData) {}

    /// `AfterMoveStep` stage callback.
    fn after_move_step(&self, _stage: &mut AfterMoveStep, _kcc: &mut Kcc, _data: &mut KccData) {}

    /// `EndMove` stage callback.
    fn end_move(&self, _stage: &mut EndMove, _kcc: &mut Kcc, _data: &mut KccData) {}

    /// Callback of user-defined stages. Downcast `stage` through
    /// [`AsAny::as_any_mut`] to reach its concrete type.
    fn custom_stage(&self, _stage: &mut dyn Stage, _kcc: &mut Kcc, _data: &mut KccData) {}
}

/// Identity comparison of two processors.
#[inline]
pub fn same_processor(a: &dyn Processor, b: &dyn Processor) -> bool {
    std::ptr::addr_eq(a as *const dyn Processor, b as *const dyn Processor)
}

/// `true` if `processor` is a `T`.
#[inline]
pub fn is_processor<T: Processor>(processor: &dyn Processor) -> bool {
    processor.as_any().is::<T>()
}

/// Recovers the concrete type behind a shared trait object.
pub fn downcast_arc<T, U>(value: &Arc<U>) -> Option<Arc<T>>
where
    T: Any + Send + Sync,
    U: AsAny + ?Sized,
{
    if (**value).as_any().is::<T>() {
        Arc::clone(value).into_any_arc().downcast::<T>().ok()
    } else {
        None
    }
}

/// Stable descending sort of `items` by precomputed priorities.
///
/// `priorities` is scratch space owned by the caller so the hot path does
/// not allocate. Equal priorities keep their relative order.
pub(crate) fn sort_by_priority<T>(
    items: &mut [T],
    priorities: &mut Vec<f32>,
    mut priority_of: impl FnMut(&T) -> f32,
) {
    if items.len() <= 1 {
        return;
    }

    priorities.clear();
    priorities.extend(items.iter().map(&mut priority_of));

    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && priorities[j - 1] < priorities[j] {
            priorities.swap(j - 1, j);
            items.swap(j - 1, j);
            j -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;
    impl Processor for Marker {}

    struct Other;
    impl Processor for Other {}

    #[test]
    fn test_sort_is_stable_and_descending() {
        let mut items = vec![("a", 1.0), ("b", 5.0), ("c", 1.0), ("d", 5.0), ("e", 3.0)];
        let mut scratch = Vec::new();
        sort_by_priority(&mut items, &mut scratch, |item| item.1);
        let order: Vec<&str> = items.iter().map(|item| item.0).collect();
        assert_eq!(order, vec!["b", "d", "e", "a", "c"]);
    }

    #[test]
    fn test_downcast_and_identity() {
        let marker: ProcessorRef = Arc::new(Marker);
        let other: ProcessorRef = Arc::new(Other);

        assert!(downcast_arc::<Marker, _>(&marker).is_some());
        assert!(downcast_arc::<Marker, _>(&other).is_none());
        assert!(is_processor::<Other>(other.as_ref()));

        let alias = Arc::clone(&marker);
        assert!(same_processor(marker.as_ref(), alias.as_ref()));
        assert!(!same_processor(marker.as_ref(), other.as_ref()));
    }
}
