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

//! Interaction registries.
//!
//! A registry tracks the relationships between its subject and external
//! collaborators, one record per (kind, entity). Records are pooled per
//! registry and hold weak references to the entity and its provider, so a
//! destroyed collaborator shows up as a stale record instead of a dangling
//! one. The processor a provider resolves is held strongly until the
//! record is released.
//!
//! Every lookup is a linear scan over the active list. Registries hold
//! tens of entries at most, and none of the scans allocate.
//!
//! The active list keeps insertion order. Stage dispatch uses that order to
//! break priority ties, so removal shifts the tail instead of swapping.

mod collisions;
mod hits;
mod ignores;
mod modifiers;

pub use collisions::{Collision, Collisions};
pub use hits::{Hit, Hits};
pub use ignores::{Ignore, Ignores};
pub use modifiers::{Modifier, Modifiers};

use crate::entity::NetworkEntity;
use crate::processor::{downcast_arc, same_processor, Processor, ProcessorRef};
use crate::provider::InteractionProvider;
use std::any::Any;
use std::sync::{Arc, Weak};
use stride_core::{ColliderId, NetworkId, Pool};

// ─────────────────────────────────────────────────────────────────────────────
// Record kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Kind-specific payload of an interaction record.
pub trait InteractionKind: Default + Send + Sync + 'static {
    /// Kind name used in log messages.
    const NAME: &'static str;

    /// Records of this kind are told apart by collider as well as by entity.
    const KEYED_BY_COLLIDER: bool;

    /// Called when a record is bound to a new collaborator.
    fn initialize(&mut self, _provider: Option<&Arc<dyn InteractionProvider>>) {}

    /// Called before a record returns to the pool.
    fn deinitialize(&mut self) {}

    /// Copies the payload of `other`.
    fn copy_from(&mut self, other: &Self);

    /// The processor cached by this record, if the kind caches one.
    ///
    /// The record keeps it alive until the record is released, so a
    /// provider may build a fresh processor each time it is asked.
    fn processor(&self) -> Option<&ProcessorRef> {
        None
    }
}

/// Resolves the processor of `provider`.
pub(crate) fn resolve_processor(provider: Option<&Arc<dyn InteractionProvider>>) -> Option<ProcessorRef> {
    provider.and_then(|provider| provider.processor())
}

// ─────────────────────────────────────────────────────────────────────────────
// Record
// ─────────────────────────────────────────────────────────────────────────────

/// One active relationship between the subject and a collaborator.
pub struct Interaction<K> {
    entity_id: NetworkId,
    collider: Option<ColliderId>,
    entity: Option<Weak<dyn NetworkEntity>>,
    provider: Option<Weak<dyn InteractionProvider>>,
    kind: K,
}

impl<K: Default> Default for Interaction<K> {
    fn default() -> Self {
        Self {
            entity_id: NetworkId::INVALID,
            collider: None,
            entity: None,
            provider: None,
            kind: K::default(),
        }
    }
}

impl<K: InteractionKind> Interaction<K> {
    /// Persistent identity of the tracked entity.
    pub fn entity_id(&self) -> NetworkId {
        self.entity_id
    }

    /// Collider this record is keyed by, if the kind is collider-keyed.
    pub fn collider(&self) -> Option<ColliderId> {
        self.collider
    }

    /// The tracked entity, if it still exists.
    pub fn entity(&self) -> Option<Arc<dyn NetworkEntity>> {
        self.entity.as_ref().and_then(Weak::upgrade)
    }

    /// The provider, if the entity has one and it still exists.
    pub fn provider(&self) -> Option<Arc<dyn InteractionProvider>> {
        self.provider.as_ref().and_then(Weak::upgrade)
    }

    /// The cached processor, if the kind caches one.
    pub fn processor(&self) -> Option<ProcessorRef> {
        self.kind.processor().cloned()
    }

    /// Kind-specific payload.
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Mutable kind-specific payload.
    pub fn kind_mut(&mut self) -> &mut K {
        &mut self.kind
    }

    /// `true` once the entity or its provider is gone.
    pub fn is_stale(&self) -> bool {
        self.entity.as_ref().is_some_and(|w| w.strong_count() == 0)
            || self.provider.as_ref().is_some_and(|w| w.strong_count() == 0)
    }

    /// `true` if this record was bound to `provider`.
    pub fn is_provider(&self, provider: &Arc<dyn InteractionProvider>) -> bool {
        self.provider
            .as_ref()
            .is_some_and(|w| std::ptr::addr_eq(w.as_ptr(), Arc::as_ptr(provider)))
    }

    /// `true` if this record caches `processor`.
    pub fn is_processor(&self, processor: &dyn Processor) -> bool {
        self.kind
            .processor()
            .is_some_and(|cached| same_processor(cached.as_ref(), processor))
    }

    fn matches(&self, entity_id: NetworkId, collider: Option<ColliderId>) -> bool {
        self.entity_id == entity_id && self.collider == collider
    }

    fn bind(
        &mut self,
        entity_id: NetworkId,
        collider: Option<ColliderId>,
        entity: Option<Weak<dyn NetworkEntity>>,
        provider: Option<Weak<dyn InteractionProvider>>,
    ) {
        self.entity_id = entity_id;
        self.collider = if K::KEYED_BY_COLLIDER { collider } else { None };
        self.entity = entity;
        self.provider = provider;
    }

    fn copy_from(&mut self, other: &Self) {
        self.entity_id = other.entity_id;
        self.collider = other.collider;
        self.entity.clone_from(&other.entity);
        self.provider.clone_from(&other.provider);
        self.kind.copy_from(&other.kind);
    }

    fn reset(&mut self) {
        self.kind.deinitialize();
        self.entity_id = NetworkId::INVALID;
        self.collider = None;
        self.entity = None;
        self.provider = None;
    }
}

impl<K: InteractionKind + std::fmt::Debug> std::fmt::Debug for Interaction<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(K::NAME)
            .field("entity_id", &self.entity_id)
            .field("collider", &self.collider)
            .field("stale", &self.is_stale())
            .field("kind", &self.kind)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Pooled, ordered collection of interaction records of one kind.
pub struct Interactions<K: InteractionKind> {
    all: Vec<Interaction<K>>,
    pool: Pool<Interaction<K>>,
}

impl<K: InteractionKind> Default for Interactions<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: InteractionKind> Interactions<K> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            all: Vec::new(),
            pool: Pool::new(),
        }
    }

    /// Creates a registry with `capacity` records pooled up front.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            all: Vec::with_capacity(capacity),
            pool: Pool::with_capacity(capacity, true),
        }
    }

    /// Number of active records.
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// `true` if no record is active.
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Active records in insertion order.
    pub fn all(&self) -> &[Interaction<K>] {
        &self.all
    }

    /// Iterates active records in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Interaction<K>> {
        self.all.iter()
    }

    /// Mutable access to an active record.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Interaction<K>> {
        self.all.get_mut(index)
    }

    /// Records waiting in the pool.
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    // --- Add ---

    /// Starts tracking `entity` through `provider`, keyed by the entity's
    /// primary collider.
    ///
    /// If the entity is already tracked the existing record is returned and
    /// nothing is added.
    pub fn add(
        &mut self,
        entity: &Arc<dyn NetworkEntity>,
        provider: Option<Arc<dyn InteractionProvider>>,
    ) -> &mut Interaction<K> {
        let collider = entity.collider();
        self.add_with_collider(entity, provider, collider)
    }

    /// Like [`add`](Self::add) with an explicit collider.
    pub fn add_with_collider(
        &mut self,
        entity: &Arc<dyn NetworkEntity>,
        provider: Option<Arc<dyn InteractionProvider>>,
        collider: Option<ColliderId>,
    ) -> &mut Interaction<K> {
        let entity_id = entity.network_id();
        let collider = if K::KEYED_BY_COLLIDER { collider } else { None };

        if let Some(index) = self.position(entity_id, collider) {
            log::debug!("{}: {} already tracked", K::NAME, entity_id);
            return &mut self.all[index];
        }

        let mut record = self.pool.acquire();
        record.bind(
            entity_id,
            collider,
            Some(Arc::downgrade(entity)),
            provider.as_ref().map(Arc::downgrade),
        );
        record.kind.initialize(provider.as_ref());
        self.all.push(record);

        let last = self.all.len() - 1;
        &mut self.all[last]
    }

    /// Rebuild path: binds a freshly resolved entity for a persistent id.
    ///
    /// Returns `false` if the entity could not be resolved or resolves to a
    /// different id.
    pub fn add_resolved(&mut self, entity: Option<&Arc<dyn NetworkEntity>>, entity_id: NetworkId) -> bool {
        let Some(entity) = entity else {
            return false;
        };
        if entity.network_id() != entity_id {
            log::warn!(
                "{}: {} resolved to an entity reporting {}",
                K::NAME,
                entity_id,
                entity.network_id()
            );
            return false;
        }

        let provider = entity.interaction_provider();
        self.add(entity, provider);
        true
    }

    // --- Remove ---

    /// Stops tracking the record identified by `entity_id` and `collider`.
    pub fn remove(&mut self, entity_id: NetworkId, collider: Option<ColliderId>) -> bool {
        let collider = if K::KEYED_BY_COLLIDER { collider } else { None };
        match self.position(entity_id, collider) {
            Some(index) => self.remove_at(index),
            None => false,
        }
    }

    /// Stops tracking the record bound to `provider`.
    pub fn remove_provider(&mut self, provider: &Arc<dyn InteractionProvider>) -> bool {
        match self.position_provider(provider) {
            Some(index) => self.remove_at(index),
            None => false,
        }
    }

    /// Stops tracking the record at `index`, keeping the order of the rest.
    pub fn remove_at(&mut self, index: usize) -> bool {
        if index >= self.all.len() {
            return false;
        }
        let record = self.all.remove(index);
        self.release(record);
        true
    }

    /// Returns every record to the pool.
    pub fn clear(&mut self) {
        while let Some(record) = self.all.pop() {
            self.release(record);
        }
    }

    /// Drops records whose entity or provider no longer exists.
    /// Returns the number of records removed.
    pub fn sweep_stale(&mut self) -> usize {
        let mut removed = 0;
        let mut index = 0;
        while index < self.all.len() {
            if self.all[index].is_stale() {
                log::debug!("{}: dropping stale record of {}", K::NAME, self.all[index].entity_id);
                self.remove_at(index);
                removed += 1;
            } else {
                index += 1;
            }
        }
        removed
    }

    fn release(&mut self, mut record: Interaction<K>) {
        record.reset();
        self.pool.release(record);
    }

    // --- Lookup ---

    /// Index of the record for `entity_id` and `collider`.
    pub fn position(&self, entity_id: NetworkId, collider: Option<ColliderId>) -> Option<usize> {
        self.all.iter().position(|record| record.matches(entity_id, collider))
    }

    /// Index of the record bound to `provider`.
    pub fn position_provider(&self, provider: &Arc<dyn InteractionProvider>) -> Option<usize> {
        self.all.iter().position(|record| record.is_provider(provider))
    }

    /// Index of the first record keyed by `collider`.
    pub fn position_collider(&self, collider: ColliderId) -> Option<usize> {
        self.all.iter().position(|record| record.collider == Some(collider))
    }

    /// The record bound to `provider`.
    pub fn find(&self, provider: &Arc<dyn InteractionProvider>) -> Option<&Interaction<K>> {
        self.all.iter().find(|record| record.is_provider(provider))
    }

    /// The first record tracking `entity_id`.
    pub fn find_entity(&self, entity_id: NetworkId) -> Option<&Interaction<K>> {
        self.all.iter().find(|record| record.entity_id == entity_id)
    }

    /// The record keyed by `collider`.
    pub fn find_collider(&self, collider: ColliderId) -> Option<&Interaction<K>> {
        self.all.iter().find(|record| record.collider == Some(collider))
    }

    /// `true` if a record tracks `entity_id`.
    pub fn contains_entity(&self, entity_id: NetworkId) -> bool {
        self.find_entity(entity_id).is_some()
    }

    /// `true` if a record is keyed by `collider`.
    pub fn contains_collider(&self, collider: ColliderId) -> bool {
        self.find_collider(collider).is_some()
    }

    // --- Provider queries ---

    /// `true` if a record is bound to `provider`.
    pub fn has_provider_ref(&self, provider: &Arc<dyn InteractionProvider>) -> bool {
        self.find(provider).is_some()
    }

    /// `true` if a record's provider is a `T`.
    pub fn has_provider<T: Any>(&self) -> bool {
        self.all.iter().any(|record| {
            record
                .provider
                .as_ref()
                .and_then(Weak::upgrade)
                .is_some_and(|provider| (*provider).as_any().is::<T>())
        })
    }

    /// The first provider that is a `T`.
    pub fn get_provider<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.all
            .iter()
            .find_map(|record| record.provider().and_then(|provider| downcast_arc::<T, _>(&provider)))
    }

    /// Appends every provider that is a `T` to `out`, after clearing it.
    pub fn get_providers<T: Any + Send + Sync>(&self, out: &mut Vec<Arc<T>>, clear: bool) {
        if clear {
            out.clear();
        }
        out.extend(
            self.all
                .iter()
                .filter_map(|record| record.provider().and_then(|provider| downcast_arc::<T, _>(&provider))),
        );
    }

    // --- Processor queries ---

    /// `true` if a record caches `processor`.
    pub fn has_processor_ref(&self, processor: &dyn Processor) -> bool {
        self.all.iter().any(|record| record.is_processor(processor))
    }

    /// `true` if a record caches a processor of type `T`.
    pub fn has_processor<T: Processor>(&self) -> bool {
        self.all.iter().any(|record| {
            record
                .processor()
                .is_some_and(|processor| (*processor).as_any().is::<T>())
        })
    }

    /// The first cached processor of type `T`.
    pub fn get_processor<T: Processor>(&self) -> Option<Arc<T>> {
        self.all
            .iter()
            .find_map(|record| record.processor().and_then(|processor| downcast_arc::<T, _>(&processor)))
    }

    /// Appends every cached processor of type `T` to `out`, clearing it
    /// first when `clear` is set.
    pub fn get_processors<T: Processor>(&self, out: &mut Vec<Arc<T>>, clear: bool) {
        if clear {
            out.clear();
        }
        out.extend(
            self.all
                .iter()
                .filter_map(|record| record.processor().and_then(|processor| downcast_arc::<T, _>(&processor))),
        );
    }

    /// Index of the record caching `processor`.
    pub fn position_processor(&self, processor: &dyn Processor) -> Option<usize> {
        self.all.iter().position(|record| {
            record
                .processor()
                .is_some_and(|cached| same_processor(cached.as_ref(), processor))
        })
    }

    // --- Rollback ---

    /// Makes this registry match `other`, entry by entry.
    ///
    /// With equal counts every slot is overwritten in place. Otherwise this
    /// registry is cleared and one fresh record is bound per source entry.
    /// The in-place path does not re-check identities, so two registries of
    /// equal size but different entities converge by overwriting.
    pub fn copy_from(&mut self, other: &Self) {
        if self.all.len() == other.all.len() {
            for (record, source) in self.all.iter_mut().zip(other.all.iter()) {
                record.copy_from(source);
            }
            return;
        }

        self.clear();
        for source in &other.all {
            let mut record = self.pool.acquire();
            record.copy_from(source);
            self.all.push(record);
        }
    }
}

impl<'a, K: InteractionKind> IntoIterator for &'a Interactions<K> {
    type Item = &'a Interaction<K>;
    type IntoIter = std::slice::Iter<'a, Interaction<K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.all.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Interaction set
// ─────────────────────────────────────────────────────────────────────────────

/// The four registries owned by one subject.
#[derive(Default)]
pub struct InteractionSet {
    /// Collisions derived from overlap queries.
    pub collisions: Collisions,
    /// Manually registered modifiers.
    pub modifiers: Modifiers,
    /// Colliders excluded from overlap results.
    pub ignores: Ignores,
    /// Overlap hits of the last query.
    pub hits: Hits,
}

impl InteractionSet {
    /// Creates a set whose registries each pool `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            collisions: Interactions::with_capacity(capacity),
            modifiers: Interactions::with_capacity(capacity),
            ignores: Interactions::with_capacity(capacity),
            hits: Interactions::with_capacity(capacity),
        }
    }

    /// Reconciles every registry with `other`.
    pub fn copy_from(&mut self, other: &InteractionSet) {
        self.collisions.copy_from(&other.collisions);
        self.modifiers.copy_from(&other.modifiers);
        self.ignores.copy_from(&other.ignores);
        self.hits.copy_from(&other.hits);
    }

    /// Returns every record of every registry to its pool.
    pub fn clear(&mut self) {
        self.collisions.clear();
        self.modifiers.clear();
        self.ignores.clear();
        self.hits.clear();
    }

    /// `true` if every registry is empty.
    pub fn is_empty(&self) -> bool {
        self.collisions.is_empty() && self.modifiers.is_empty() && self.ignores.is_empty() && self.hits.is_empty()
    }

    /// Sweeps stale records out of every registry.
    pub fn sweep_stale(&mut self) -> usize {
        self.collisions.sweep_stale() + self.modifiers.sweep_stale() + self.ignores.sweep_stale() + self.hits.sweep_stale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Entity {
        id: NetworkId,
        collider: Option<ColliderId>,
        provider: Option<Arc<dyn InteractionProvider>>,
    }

    impl NetworkEntity for Entity {
        fn network_id(&self) -> NetworkId {
            self.id
        }
        fn interaction_provider(&self) -> Option<Arc<dyn InteractionProvider>> {
            self.provider.clone()
        }
        fn collider(&self) -> Option<ColliderId> {
            self.collider
        }
    }

    fn entity(id: u64) -> Arc<dyn NetworkEntity> {
        Arc::new(Entity {
            id: NetworkId(id),
            collider: Some(ColliderId(id as u32)),
            provider: None,
        })
    }

    fn ids<K: InteractionKind>(registry: &Interactions<K>) -> Vec<NetworkId> {
        registry.iter().map(Interaction::entity_id).collect()
    }

    #[test]
    fn test_add_remove_count_and_uniqueness() {
        let mut registry = Modifiers::new();
        let entities: Vec<_> = (1..=4).map(entity).collect();

        for e in &entities {
            registry.add(e, None);
        }
        registry.add(&entities[1], None);
        assert_eq!(registry.len(), 4);

        assert!(registry.remove(NetworkId(2), None));
        assert!(!registry.remove(NetworkId(2), None));
        assert!(!registry.remove(NetworkId(99), None));
        assert_eq!(registry.len(), 3);
        assert_eq!(ids(&registry), vec![NetworkId(1), NetworkId(3), NetworkId(4)]);

        let mut seen = ids(&registry);
        seen.dedup();
        assert_eq!(seen.len(), registry.len());
    }

    #[test]
    fn test_removal_returns_records_to_pool() {
        let mut registry = Hits::new();
        let e = entity(1);
        registry.add(&e, None);
        assert_eq!(registry.pooled(), 0);
        registry.clear();
        assert_eq!(registry.pooled(), 1);

        registry.add(&e, None);
        assert_eq!(registry.pooled(), 0);
    }

    #[test]
    fn test_add_resolved_rejects_missing_or_mismatched() {
        let mut registry = Ignores::new();
        let e = entity(5);
        assert!(!registry.add_resolved(None, NetworkId(5)));
        assert!(!registry.add_resolved(Some(&e), NetworkId(6)));
        assert!(registry.add_resolved(Some(&e), NetworkId(5)));
        assert_eq!(registry.find_entity(NetworkId(5)).and_then(Interaction::collider), Some(ColliderId(5)));
    }

    #[test]
    fn test_copy_from_rebuild_path() {
        let entities: Vec<_> = (1..=3).map(entity).collect();
        let mut source = Collisions::new();
        for e in &entities {
            source.add(e, None);
        }

        let mut target = Collisions::new();
        target.copy_from(&source);
        assert_eq!(ids(&target), ids(&source));

        target.copy_from(&source);
        assert_eq!(ids(&target), ids(&source));
    }

    #[test]
    fn test_copy_from_in_place_path() {
        let mut source = Collisions::new();
        for e in (1..=3).map(entity) {
            source.add(&e, None);
        }
        let mut target = Collisions::new();
        for e in (7..=9).map(entity) {
            target.add(&e, None);
        }

        target.copy_from(&source);
        assert_eq!(ids(&target), vec![NetworkId(1), NetworkId(2), NetworkId(3)]);
        assert_eq!(target.pooled(), 0);
    }

    #[test]
    fn test_stale_records_are_swept() {
        let mut registry = Modifiers::new();
        let kept = entity(1);
        {
            let dropped = entity(2);
            registry.add(&kept, None);
            registry.add(&dropped, None);
        }
        assert!(registry.all()[1].is_stale());
        assert!(registry.all()[1].entity().is_none());

        assert_eq!(registry.sweep_stale(), 1);
        assert_eq!(ids(&registry), vec![NetworkId(1)]);
    }

    /// Hands out its processor once and keeps nothing.
    struct HandOff(std::sync::Mutex<Option<ProcessorRef>>);

    impl InteractionProvider for HandOff {
        fn processor(&self) -> Option<ProcessorRef> {
            self.0.lock().unwrap().take()
        }
    }

    struct Noop;
    impl Processor for Noop {}

    #[test]
    fn test_record_keeps_handed_off_processor_until_released() {
        let processor: ProcessorRef = Arc::new(Noop);
        let watch = Arc::downgrade(&processor);
        let provider: Arc<dyn InteractionProvider> = Arc::new(HandOff(std::sync::Mutex::new(Some(processor))));
        let e = entity(3);

        let mut registry = Modifiers::new();
        assert!(registry.add(&e, Some(provider.clone())).processor().is_some());
        assert!(watch.upgrade().is_some());
        assert!(!registry.all()[0].is_stale());
        let held = watch.upgrade().unwrap();
        assert!(registry.all()[0].is_processor(held.as_ref()));
        drop(held);
        assert_eq!(registry.sweep_stale(), 0);

        assert!(registry.remove(NetworkId(3), None));
        assert!(watch.upgrade().is_none());
    }
}
