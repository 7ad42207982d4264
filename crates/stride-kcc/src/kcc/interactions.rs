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

//! Interaction management on the subject: modifiers, collisions, ignores,
//! local and external processors, and the queries that span them.

use super::Kcc;
use crate::entity::NetworkEntity;
use crate::physics::OverlapInfo;
use crate::processor::{downcast_arc, same_processor, sort_by_priority, Processor, ProcessorRef};
use crate::provider::{InteractionProvider, ProcessorSource};
use crate::stages::HitsQuery;
use std::any::Any;
use std::sync::Arc;
use stride_core::{ColliderId, KccData, NetworkId, Vec3};

impl Kcc {
    // ─────────────────────────────────────────────────────────────────────
    // Modifiers
    // ─────────────────────────────────────────────────────────────────────

    /// Registers `entity` as a modifier and enters its processor.
    ///
    /// Unless `force` is set the provider may veto through
    /// `can_start_interaction`. Returns `false` if vetoed, already tracked,
    /// or the subject is despawned.
    pub fn add_modifier(&mut self, entity: &Arc<dyn NetworkEntity>, data: &mut KccData, force: bool) -> bool {
        if !self.spawned {
            return false;
        }

        let entity_id = entity.network_id();
        if self.interactions.modifiers.contains_entity(entity_id) {
            log::debug!("{}: modifier {entity_id} already registered", self.name);
            return false;
        }

        let provider = entity.interaction_provider();
        if !force {
            if let Some(provider) = &provider {
                if !provider.can_start_interaction(self, data) {
                    log::warn!("{}: modifier {entity_id} refused to start", self.name);
                    return false;
                }
            }
        }

        let processor = self.interactions.modifiers.add(entity, provider).processor();
        log::debug!("{}: added modifier {entity_id}", self.name);
        if let Some(processor) = processor {
            processor.on_enter(self, data);
        }
        true
    }

    /// Unregisters the modifier bound to `provider` and exits its processor.
    pub fn remove_modifier(
        &mut self,
        provider: &Arc<dyn InteractionProvider>,
        data: &mut KccData,
        force: bool,
    ) -> bool {
        match self.interactions.modifiers.position_provider(provider) {
            Some(index) => self.remove_modifier_at(index, data, force),
            None => false,
        }
    }

    /// Unregisters the modifier tracking `entity_id`.
    pub fn remove_modifier_entity(&mut self, entity_id: NetworkId, data: &mut KccData, force: bool) -> bool {
        match self.interactions.modifiers.position(entity_id, None) {
            Some(index) => self.remove_modifier_at(index, data, force),
            None => false,
        }
    }

    pub(crate) fn remove_modifier_at(&mut self, index: usize, data: &mut KccData, force: bool) -> bool {
        let Some(record) = self.interactions.modifiers.all().get(index) else {
            return false;
        };
        let entity_id = record.entity_id();
        let provider = record.provider();
        let processor = record.processor();

        if !force && self.spawned {
            if let Some(provider) = &provider {
                if !provider.can_stop_interaction(self, data) {
                    log::warn!("{}: modifier {entity_id} refused to stop", self.name);
                    return false;
                }
            }
        }

        self.interactions.modifiers.remove_at(index);
        log::debug!("{}: removed modifier {entity_id}", self.name);
        if let Some(processor) = processor {
            self.on_processor_removed(&processor, data);
        }
        true
    }

    /// `true` if a modifier tracks `entity_id`.
    pub fn has_modifier(&self, entity_id: NetworkId) -> bool {
        self.interactions.modifiers.contains_entity(entity_id)
    }

    /// `true` if a modifier is bound to `provider`.
    pub fn has_modifier_provider(&self, provider: &Arc<dyn InteractionProvider>) -> bool {
        self.interactions.modifiers.has_provider_ref(provider)
    }

    /// `true` if a modifier caches a processor of type `T`.
    pub fn has_modifier_processor<T: Processor>(&self) -> bool {
        self.interactions.modifiers.has_processor::<T>()
    }

    /// The first modifier processor of type `T`.
    pub fn get_modifier<T: Processor>(&self) -> Option<Arc<T>> {
        self.interactions.modifiers.get_processor::<T>()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Collisions
    // ─────────────────────────────────────────────────────────────────────

    /// Starts a collision with `entity` on `collider` and enters its
    /// processor. The provider may veto through `can_start_interaction`.
    pub fn add_collision(
        &mut self,
        entity: &Arc<dyn NetworkEntity>,
        provider: Option<Arc<dyn InteractionProvider>>,
        collider: Option<ColliderId>,
        data: &mut KccData,
    ) -> bool {
        if !self.spawned {
            return false;
        }

        let entity_id = entity.network_id();
        if self.interactions.collisions.position(entity_id, collider).is_some() {
            return false;
        }
        if let Some(provider) = &provider {
            if !provider.can_start_interaction(self, data) {
                log::debug!("{}: collision with {entity_id} refused to start", self.name);
                return false;
            }
        }

        let processor = self
            .interactions
            .collisions
            .add_with_collider(entity, provider, collider)
            .processor();
        log::debug!("{}: added collision with {entity_id}", self.name);
        if let Some(processor) = processor {
            processor.on_enter(self, data);
        }
        true
    }

    /// Ends the collision bound to `provider` and exits its processor.
    pub fn remove_collision(
        &mut self,
        provider: &Arc<dyn InteractionProvider>,
        data: &mut KccData,
        force: bool,
    ) -> bool {
        match self.interactions.collisions.position_provider(provider) {
            Some(index) => self.remove_collision_at(index, data, force),
            None => false,
        }
    }

    pub(crate) fn remove_collision_at(&mut self, index: usize, data: &mut KccData, force: bool) -> bool {
        let Some(record) = self.interactions.collisions.all().get(index) else {
            return false;
        };
        let entity_id = record.entity_id();
        let provider = record.provider();
        let processor = record.processor();

        if !force && self.spawned {
            if let Some(provider) = &provider {
                if !provider.can_stop_interaction(self, data) {
                    log::debug!("{}: collision with {entity_id} refused to stop", self.name);
                    return false;
                }
            }
        }

        self.interactions.collisions.remove_at(index);
        log::debug!("{}: removed collision with {entity_id}", self.name);
        if let Some(processor) = processor {
            self.on_processor_removed(&processor, data);
        }
        true
    }

    /// Ends every collision, from the most recent backwards.
    pub(crate) fn force_remove_collisions(&mut self, data: &mut KccData) {
        while !self.interactions.collisions.is_empty() {
            let index = self.interactions.collisions.len() - 1;
            self.remove_collision_at(index, data, true);
        }
    }

    /// `true` if a collision tracks `entity_id`.
    pub fn has_collision(&self, entity_id: NetworkId) -> bool {
        self.interactions.collisions.contains_entity(entity_id)
    }

    /// `true` if a collision is keyed by `collider`.
    pub fn has_collision_collider(&self, collider: ColliderId) -> bool {
        self.interactions.collisions.contains_collider(collider)
    }

    /// `true` if a collision is bound to `provider`.
    pub fn has_collision_provider(&self, provider: &Arc<dyn InteractionProvider>) -> bool {
        self.interactions.collisions.has_provider_ref(provider)
    }

    /// `true` if a collision caches a processor of type `T`.
    pub fn has_collision_processor<T: Processor>(&self) -> bool {
        self.interactions.collisions.has_processor::<T>()
    }

    /// The first collision processor of type `T`.
    pub fn get_collision<T: Processor>(&self) -> Option<Arc<T>> {
        self.interactions.collisions.get_processor::<T>()
    }

    /// Reconciles collisions with the tracked overlap: vanished colliders
    /// stop (subject to `can_stop_interaction`), new networked colliders
    /// start (subject to `can_start_interaction`).
    pub(crate) fn update_collisions(&mut self, data: &mut KccData) {
        let mut removed = std::mem::take(&mut self.removed_collisions);
        removed.clear();
        for record in self.interactions.collisions.iter() {
            let present = record
                .collider()
                .is_none_or(|collider| self.track_overlap.contains(collider));
            if !present {
                removed.push((record.entity_id(), record.collider()));
            }
        }
        for &(entity_id, collider) in &removed {
            if let Some(index) = self.interactions.collisions.position(entity_id, collider) {
                self.remove_collision_at(index, data, false);
            }
        }
        self.removed_collisions = removed;

        let mut added = std::mem::take(&mut self.added_collisions);
        added.clear();
        for (index, hit) in self.track_overlap.all_hits().iter().enumerate() {
            if hit.entity.is_some() && !self.interactions.collisions.contains_collider(hit.collider) {
                added.push(index);
            }
        }
        for &index in &added {
            let Some(hit) = self.track_overlap.all_hits().get(index) else {
                continue;
            };
            let collider = hit.collider;
            let Some(entity) = hit.entity.clone() else {
                continue;
            };
            let provider = entity.interaction_provider();
            self.add_collision(&entity, provider, Some(collider), data);
        }
        self.added_collisions = added;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ignores
    // ─────────────────────────────────────────────────────────────────────

    /// Excludes `collider` of `entity` from overlap results.
    ///
    /// With `check_existing` an already ignored collider is reported as
    /// `false`.
    pub fn add_ignore(&mut self, entity: &Arc<dyn NetworkEntity>, collider: ColliderId, check_existing: bool) -> bool {
        if check_existing && self.interactions.ignores.contains_collider(collider) {
            return false;
        }
        self.interactions.ignores.add_with_collider(entity, None, Some(collider));
        log::debug!("{}: ignoring {collider} of {}", self.name, entity.network_id());
        true
    }

    /// Stops ignoring `collider`.
    pub fn remove_ignore(&mut self, collider: ColliderId) -> bool {
        match self.interactions.ignores.position_collider(collider) {
            Some(index) => self.interactions.ignores.remove_at(index),
            None => false,
        }
    }

    /// Starts or stops ignoring `collider` of `entity`.
    pub fn set_ignore_collider(&mut self, entity: &Arc<dyn NetworkEntity>, collider: ColliderId, ignore: bool) -> bool {
        if ignore {
            self.add_ignore(entity, collider, true)
        } else {
            self.remove_ignore(collider)
        }
    }

    /// `true` if `collider` is excluded from overlap results.
    pub fn is_ignoring(&self, collider: ColliderId) -> bool {
        self.interactions.ignores.contains_collider(collider)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Local / external processors
    // ─────────────────────────────────────────────────────────────────────

    /// Adds a processor owned by the subject itself and enters it.
    pub fn add_local_processor(&mut self, processor: ProcessorRef, data: &mut KccData) -> bool {
        if !self.spawned {
            return false;
        }
        if self
            .local_processors
            .iter()
            .any(|p| same_processor(p.as_ref(), processor.as_ref()))
        {
            log::warn!("{}: local processor {} already added", self.name, processor.name());
            return false;
        }

        self.local_processors.push(Arc::clone(&processor));
        processor.on_enter(self, data);
        true
    }

    /// Removes a local processor and exits it.
    pub fn remove_local_processor(&mut self, processor: &dyn Processor, data: &mut KccData) -> bool {
        let Some(index) = self
            .local_processors
            .iter()
            .position(|p| same_processor(p.as_ref(), processor))
        else {
            return false;
        };
        let removed = self.local_processors.remove(index);
        self.on_processor_removed(&removed, data);
        true
    }

    /// Local processors in registration order.
    pub fn local_processors(&self) -> &[ProcessorRef] {
        &self.local_processors
    }

    /// Installs the source asked for external processors on every cache
    /// pass, or removes it.
    pub fn set_external_processors(&mut self, source: Option<Box<dyn ProcessorSource>>) {
        self.external_source = source;
        self.external_processors.clear();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Aggregated queries
    // ─────────────────────────────────────────────────────────────────────

    /// `true` if any source holds a processor of type `T`.
    pub fn has_processor<T: Processor>(&self) -> bool {
        self.interactions.modifiers.has_processor::<T>()
            || self.interactions.collisions.has_processor::<T>()
            || self.local_processors.iter().any(|p| (**p).as_any().is::<T>())
            || self.external_processors.iter().any(|p| (**p).as_any().is::<T>())
    }

    /// `true` if any source holds `processor`.
    pub fn has_processor_ref(&self, processor: &dyn Processor) -> bool {
        self.interactions.modifiers.has_processor_ref(processor)
            || self.interactions.collisions.has_processor_ref(processor)
            || self.local_processors.iter().any(|p| same_processor(p.as_ref(), processor))
            || self.external_processors.iter().any(|p| same_processor(p.as_ref(), processor))
    }

    /// The first processor of type `T`, searching modifiers, collisions,
    /// local and external processors in that order.
    pub fn get_processor<T: Processor>(&self) -> Option<Arc<T>> {
        self.interactions
            .modifiers
            .get_processor::<T>()
            .or_else(|| self.interactions.collisions.get_processor::<T>())
            .or_else(|| self.local_processors.iter().find_map(downcast_arc::<T, _>))
            .or_else(|| self.external_processors.iter().find_map(downcast_arc::<T, _>))
    }

    /// Collects every processor of type `T` into `out`, after clearing it.
    /// With `sort` the result is ordered by descending priority.
    pub fn get_processors<T: Processor>(&self, out: &mut Vec<Arc<T>>, sort: bool) {
        out.clear();
        self.interactions.modifiers.get_processors(out, false);
        self.interactions.collisions.get_processors(out, false);
        out.extend(self.local_processors.iter().filter_map(downcast_arc::<T, _>));
        out.extend(self.external_processors.iter().filter_map(downcast_arc::<T, _>));

        if sort {
            let mut priorities = Vec::with_capacity(out.len());
            sort_by_priority(out, &mut priorities, |p| p.priority(self));
        }
    }

    /// `true` if a collision or modifier tracks `entity_id`.
    pub fn has_interaction(&self, entity_id: NetworkId) -> bool {
        self.interactions.collisions.contains_entity(entity_id) || self.interactions.modifiers.contains_entity(entity_id)
    }

    /// `true` if a collision or modifier is bound to `provider`.
    pub fn has_interaction_provider(&self, provider: &Arc<dyn InteractionProvider>) -> bool {
        self.interactions.collisions.has_provider_ref(provider) || self.interactions.modifiers.has_provider_ref(provider)
    }

    /// `true` if a collision or modifier provider is a `T`.
    pub fn has_interaction_of<T: Any>(&self) -> bool {
        self.interactions.collisions.has_provider::<T>() || self.interactions.modifiers.has_provider::<T>()
    }

    /// The first collision or modifier provider that is a `T`.
    pub fn get_interaction<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.interactions
            .collisions
            .get_provider::<T>()
            .or_else(|| self.interactions.modifiers.get_provider::<T>())
    }

    /// Every collision and modifier provider that is a `T`.
    pub fn get_interactions<T: Any + Send + Sync>(&self, out: &mut Vec<Arc<T>>) {
        self.interactions.collisions.get_providers(out, true);
        self.interactions.modifiers.get_providers(out, false);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Overlaps and hits
    // ─────────────────────────────────────────────────────────────────────

    /// Queries the bound physics collaborator for colliders overlapping the
    /// capsule at `position`, inflated by `extent`. Ignored colliders are
    /// dropped from the result. Without physics the result is empty.
    pub fn overlap_capsule(&self, position: Vec3, extent: f32, out: &mut OverlapInfo) {
        let radius = self.settings.radius;
        let height = self.settings.height;
        out.begin(position, radius, height, extent);
        if let Some(physics) = &self.physics {
            physics.overlap(position, radius, height, extent, out);
        }

        let ignores = &self.interactions.ignores;
        if !ignores.is_empty() {
            out.retain(|hit| !ignores.contains_collider(hit.collider));
        }
    }

    /// The overlap the hit registry was last rebuilt from.
    pub fn track_overlap(&self) -> &OverlapInfo {
        &self.track_overlap
    }

    /// Rebuilds the hit registry.
    ///
    /// `base` is the overlap of the current step. It is reused as is when
    /// `query` is [`HitsQuery::Reuse`], or [`HitsQuery::Default`] with every
    /// hit within the extent. Otherwise a fresh query runs at the base
    /// position, keeping the base classification of colliders found again.
    /// Without `base` a fresh query runs at the target position.
    pub fn update_hits(&mut self, data: &KccData, base: Option<&OverlapInfo>, query: HitsQuery) {
        let mut track = std::mem::take(&mut self.track_overlap);
        let extent = self.settings.extent;

        match base {
            Some(base) => {
                let reuse = match query {
                    HitsQuery::Reuse => true,
                    HitsQuery::New => false,
                    HitsQuery::Default => base.all_hits_within_extent(),
                };
                if reuse {
                    track.copy_from(base);
                } else {
                    self.overlap_capsule(base.position, extent, &mut track);
                    track.merge_classification(base);
                }
            }
            None => self.overlap_capsule(data.target_position, extent, &mut track),
        }

        let hits = &mut self.interactions.hits;
        hits.clear();
        for hit in track.all_hits() {
            if let Some(entity) = &hit.entity {
                hits.add_with_collider(entity, None, Some(hit.collider))
                    .kind_mut()
                    .set(hit);
            }
        }

        self.track_overlap = track;
    }
}
