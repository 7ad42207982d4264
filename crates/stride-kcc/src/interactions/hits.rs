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

use super::{InteractionKind, Interactions};
use crate::physics::{CollisionType, OverlapHit};

/// A collider reported by the last overlap query.
#[derive(Debug, Default)]
pub struct Hit {
    /// Classification reported by the physics collaborator.
    pub collision_type: CollisionType,
    /// The collider is a trigger.
    pub is_trigger: bool,
}

impl Hit {
    pub(crate) fn set(&mut self, hit: &OverlapHit) {
        self.collision_type = hit.collision_type;
        self.is_trigger = hit.is_trigger;
    }
}

impl InteractionKind for Hit {
    const NAME: &'static str = "Hit";
    const KEYED_BY_COLLIDER: bool = true;

    fn deinitialize(&mut self) {
        self.collision_type = CollisionType::None;
        self.is_trigger = false;
    }

    fn copy_from(&mut self, other: &Self) {
        self.collision_type = other.collision_type;
        self.is_trigger = other.is_trigger;
    }
}

/// Overlap hits, keyed by collider.
pub type Hits = Interactions<Hit>;

impl Hits {
    /// `true` if any hit has the given classification.
    pub fn has_collision_type(&self, collision_type: CollisionType) -> bool {
        self.iter().any(|record| record.kind().collision_type == collision_type)
    }
}
