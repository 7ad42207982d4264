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

//! Networked entities and their resolution from persistent ids.

use crate::provider::InteractionProvider;
use std::sync::Arc;
use stride_core::{ColliderId, NetworkId};

/// An object of the networked simulation the subject can interact with.
pub trait NetworkEntity: Send + Sync {
    /// Persistent identity, stable across resimulation.
    fn network_id(&self) -> NetworkId;

    /// The provider attached to this entity, if any.
    fn interaction_provider(&self) -> Option<Arc<dyn InteractionProvider>> {
        None
    }

    /// The entity's primary collider, if it has one.
    fn collider(&self) -> Option<ColliderId> {
        None
    }
}

/// Re-binds persistent ids to live entities.
pub trait EntityResolver {
    /// Returns the live entity for `id`, or `None` if it no longer exists.
    fn resolve(&self, id: NetworkId) -> Option<Arc<dyn NetworkEntity>>;
}
