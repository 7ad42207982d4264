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

//! Overlap queries against the physics collaborator.
//!
//! The controller performs no geometry of its own. It asks a
//! [`PhysicsQuery`] which colliders overlap its capsule and derives hits
//! and collisions from the answer.

use crate::entity::NetworkEntity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stride_core::{ColliderId, Vec3};

/// Classification of an overlapping collider relative to the capsule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollisionType {
    /// Not classified.
    #[default]
    None,
    /// Walkable surface below.
    Ground,
    /// Surface too steep to stand on.
    Slope,
    /// Vertical surface.
    Wall,
    /// Overhang the capsule can hang from.
    Hang,
    /// Surface above.
    Top,
    /// Trigger volume.
    Trigger,
}

/// One collider reported by an overlap query.
#[derive(Clone, Default)]
pub struct OverlapHit {
    /// The overlapping collider.
    pub collider: ColliderId,
    /// The networked entity owning the collider. Colliders of
    /// non-networked objects produce neither hits nor collisions.
    pub entity: Option<Arc<dyn NetworkEntity>>,
    /// Classification reported by the physics collaborator.
    pub collision_type: CollisionType,
    /// The collider is a trigger.
    pub is_trigger: bool,
    /// The collider lies within the query's skin extent.
    pub is_within_extent: bool,
}

impl std::fmt::Debug for OverlapHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlapHit")
            .field("collider", &self.collider)
            .field("entity", &self.entity.as_ref().map(|e| e.network_id()))
            .field("collision_type", &self.collision_type)
            .field("is_trigger", &self.is_trigger)
            .finish()
    }
}

/// Result buffer of one capsule overlap query. Reused between queries.
#[derive(Debug, Clone, Default)]
pub struct OverlapInfo {
    /// Capsule base position.
    pub position: Vec3,
    /// Capsule radius.
    pub radius: f32,
    /// Capsule height.
    pub height: f32,
    /// Skin extent added around the capsule.
    pub extent: f32,
    hits: Vec<OverlapHit>,
}

impl OverlapInfo {
    /// Creates a buffer with room for `capacity` hits.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hits: Vec::with_capacity(capacity),
            ..Default::default()
        }
    }

    /// Clears the hits and query parameters, keeping the allocation.
    pub fn reset(&mut self) {
        self.position = Vec3::ZERO;
        self.radius = 0.0;
        self.height = 0.0;
        self.extent = 0.0;
        self.hits.clear();
    }

    /// Stores query parameters and clears previous hits.
    pub fn begin(&mut self, position: Vec3, radius: f32, height: f32, extent: f32) {
        self.position = position;
        self.radius = radius;
        self.height = height;
        self.extent = extent;
        self.hits.clear();
    }

    /// Appends a hit.
    pub fn add_hit(&mut self, hit: OverlapHit) {
        self.hits.push(hit);
    }

    /// Every hit, triggers included.
    pub fn all_hits(&self) -> &[OverlapHit] {
        &self.hits
    }

    /// Hits of solid colliders.
    pub fn collider_hits(&self) -> impl Iterator<Item = &OverlapHit> {
        self.hits.iter().filter(|hit| !hit.is_trigger)
    }

    /// Hits of trigger colliders.
    pub fn trigger_hits(&self) -> impl Iterator<Item = &OverlapHit> {
        self.hits.iter().filter(|hit| hit.is_trigger)
    }

    /// `true` if the query reported nothing.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// `true` if every hit lies within the skin extent.
    pub fn all_hits_within_extent(&self) -> bool {
        self.hits.iter().all(|hit| hit.is_within_extent)
    }

    /// `true` if a hit for `collider` exists.
    pub fn contains(&self, collider: ColliderId) -> bool {
        self.hits.iter().any(|hit| hit.collider == collider)
    }

    /// Finds the hit for `collider`.
    pub fn find(&self, collider: ColliderId) -> Option<&OverlapHit> {
        self.hits.iter().find(|hit| hit.collider == collider)
    }

    /// Keeps only the hits matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&OverlapHit) -> bool) {
        self.hits.retain(keep);
    }

    /// Overwrites this buffer with `other`, reusing the allocation.
    pub fn copy_from(&mut self, other: &OverlapInfo) {
        self.position = other.position;
        self.radius = other.radius;
        self.height = other.height;
        self.extent = other.extent;
        self.hits.clone_from(&other.hits);
    }

    /// Copies the classification of matching colliders from `other`.
    pub(crate) fn merge_classification(&mut self, other: &OverlapInfo) {
        for hit in &mut self.hits {
            if let Some(source) = other.find(hit.collider) {
                hit.collision_type = source.collision_type;
            }
        }
    }
}

/// The physics collaborator.
pub trait PhysicsQuery: Send + Sync {
    /// Reports every collider overlapping the capsule standing at
    /// `position`, inflated by `extent`. `out` has been prepared with
    /// [`OverlapInfo::begin`] and only needs [`OverlapInfo::add_hit`].
    fn overlap(&self, position: Vec3, radius: f32, height: f32, extent: f32, out: &mut OverlapInfo);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(collider: u32, is_trigger: bool, within: bool) -> OverlapHit {
        OverlapHit {
            collider: ColliderId(collider),
            is_trigger,
            is_within_extent: within,
            ..Default::default()
        }
    }

    #[test]
    fn test_trigger_and_collider_split() {
        let mut info = OverlapInfo::with_capacity(4);
        info.add_hit(hit(1, false, true));
        info.add_hit(hit(2, true, true));
        info.add_hit(hit(3, false, false));

        assert_eq!(info.collider_hits().count(), 2);
        assert_eq!(info.trigger_hits().count(), 1);
        assert!(!info.all_hits_within_extent());

        info.retain(|h| h.is_within_extent);
        assert!(info.all_hits_within_extent());
        assert!(!info.contains(ColliderId(3)));
    }

    #[test]
    fn test_merge_classification_by_collider() {
        let mut base = OverlapInfo::default();
        base.add_hit(OverlapHit {
            collision_type: CollisionType::Ground,
            ..hit(7, false, true)
        });

        let mut track = OverlapInfo::default();
        track.add_hit(hit(7, false, true));
        track.add_hit(hit(8, false, true));
        track.merge_classification(&base);

        assert_eq!(track.find(ColliderId(7)).map(|h| h.collision_type), Some(CollisionType::Ground));
        assert_eq!(track.find(ColliderId(8)).map(|h| h.collision_type), Some(CollisionType::None));
    }
}
