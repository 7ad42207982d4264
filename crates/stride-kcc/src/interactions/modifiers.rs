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

use super::{resolve_processor, InteractionKind, Interactions};
use crate::processor::ProcessorRef;
use crate::provider::InteractionProvider;
use std::sync::Arc;

/// A manually registered collaborator. One per entity, whatever its
/// colliders.
#[derive(Default)]
pub struct Modifier {
    processor: Option<ProcessorRef>,
}

impl std::fmt::Debug for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modifier")
            .field("processor", &self.processor.as_ref().map(|p| p.name()))
            .finish()
    }
}

impl InteractionKind for Modifier {
    const NAME: &'static str = "Modifier";
    const KEYED_BY_COLLIDER: bool = false;

    fn initialize(&mut self, provider: Option<&Arc<dyn InteractionProvider>>) {
        self.processor = resolve_processor(provider);
    }

    fn deinitialize(&mut self) {
        self.processor = None;
    }

    fn copy_from(&mut self, other: &Self) {
        self.processor.clone_from(&other.processor);
    }

    fn processor(&self) -> Option<&ProcessorRef> {
        self.processor.as_ref()
    }
}

/// Active modifiers, keyed by entity.
pub type Modifiers = Interactions<Modifier>;
