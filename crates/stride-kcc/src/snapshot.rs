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

//! Rollback state: full snapshots of a subject, a tick-indexed history of
//! them, and the compact networked identity list.

use crate::entity::EntityResolver;
use crate::interactions::InteractionSet;
use crate::kcc::Kcc;
use serde::{Deserialize, Serialize};
use stride_core::{ColliderId, KccData, KccError, KccResult, KccSettings, NetworkId};

/// Everything needed to put a subject back at one tick.
#[derive(Default)]
pub struct KccSnapshot {
    /// Tick the snapshot was captured at.
    pub tick: u32,
    /// Copy of the data record.
    pub data: KccData,
    /// Copy of the registries.
    pub interactions: InteractionSet,
}

impl KccSnapshot {
    /// Creates an empty snapshot whose registries pool `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tick: 0,
            data: KccData::default(),
            interactions: InteractionSet::with_capacity(capacity),
        }
    }
}

impl std::fmt::Debug for KccSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KccSnapshot")
            .field("tick", &self.tick)
            .field("collisions", &self.interactions.collisions.len())
            .field("modifiers", &self.interactions.modifiers.len())
            .field("ignores", &self.interactions.ignores.len())
            .field("hits", &self.interactions.hits.len())
            .finish()
    }
}

impl Kcc {
    /// Copies `data` and the registries into `out`, reusing its records.
    pub fn capture_snapshot(&self, data: &KccData, out: &mut KccSnapshot) {
        out.tick = data.tick;
        out.data.copy_from(data);
        out.interactions.copy_from(&self.interactions);
    }

    /// Puts the subject and `data` back to `snapshot`.
    ///
    /// Registries are reconciled with `copy_from`, so no enter or exit
    /// callback runs. Cached processor lists are dropped and rebuilt by the
    /// next move.
    pub fn restore_snapshot(&mut self, snapshot: &KccSnapshot, data: &mut KccData) -> KccResult<()> {
        if !self.spawned {
            return Err(KccError::NotSpawned);
        }
        if !self.active_stages.is_empty() {
            return Err(KccError::Snapshot(format!(
                "cannot restore tick {} while {} stages are active",
                snapshot.tick,
                self.active_stages.len()
            )));
        }

        self.interactions.copy_from(&snapshot.interactions);
        data.copy_from(&snapshot.data);
        self.cached_processors.clear();
        self.stage_processors.clear();

        log::debug!("{}: restored tick {}", self.name, snapshot.tick);
        Ok(())
    }

    /// Rebuilds collisions, modifiers and ignores from networked ids.
    ///
    /// Hits are cleared; the next move derives them again. No enter or exit
    /// callback runs.
    pub fn rebuild_interactions(
        &mut self,
        ids: &InteractionIds,
        resolver: &dyn EntityResolver,
    ) -> KccResult<RebuildReport> {
        if !self.spawned {
            return Err(KccError::NotSpawned);
        }
        if !self.active_stages.is_empty() {
            return Err(KccError::Snapshot("cannot rebuild interactions while a stage is active".into()));
        }

        let report = ids.rebuild(&mut self.interactions, resolver);
        self.interactions.hits.clear();
        self.cached_processors.clear();
        self.stage_processors.clear();

        log::debug!(
            "{}: rebuilt {} interactions, {} unresolved",
            self.name,
            report.resolved,
            report.unresolved
        );
        Ok(report)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// History
// ─────────────────────────────────────────────────────────────────────────────

struct HistorySlot {
    tick: Option<u32>,
    snapshot: KccSnapshot,
}

/// Ring buffer of snapshots indexed by `tick % size`.
///
/// A slot only answers for the tick it was last written with, so stale
/// entries from a previous lap are never returned.
pub struct SnapshotHistory {
    slots: Vec<HistorySlot>,
    latest: Option<u32>,
}

impl SnapshotHistory {
    /// Creates a history of `settings.history_size` slots.
    pub fn new(settings: &KccSettings) -> Self {
        Self::with_size(settings.history_size, settings.cache_size)
    }

    /// Creates a history of `size` slots whose registries pool `capacity`
    /// records each.
    pub fn with_size(size: usize, capacity: usize) -> Self {
        let slots = (0..size.max(1))
            .map(|_| HistorySlot {
                tick: None,
                snapshot: KccSnapshot::with_capacity(capacity),
            })
            .collect();
        Self { slots, latest: None }
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Most recently recorded tick.
    pub fn latest_tick(&self) -> Option<u32> {
        self.latest
    }

    fn index(&self, tick: u32) -> usize {
        tick as usize % self.slots.len()
    }

    /// Captures `kcc` and `data` into the slot of `data.tick`.
    pub fn record(&mut self, kcc: &Kcc, data: &KccData) {
        let index = self.index(data.tick);
        let slot = &mut self.slots[index];
        kcc.capture_snapshot(data, &mut slot.snapshot);
        slot.tick = Some(data.tick);
        self.latest = Some(data.tick);
    }

    /// The snapshot of `tick`, if it is still held.
    pub fn get(&self, tick: u32) -> Option<&KccSnapshot> {
        let slot = &self.slots[self.index(tick)];
        (slot.tick == Some(tick)).then_some(&slot.snapshot)
    }

    /// `true` if the snapshot of `tick` is still held.
    pub fn contains(&self, tick: u32) -> bool {
        self.get(tick).is_some()
    }

    /// Restores `kcc` and `data` to `tick`.
    pub fn restore(&self, tick: u32, kcc: &mut Kcc, data: &mut KccData) -> KccResult<()> {
        let snapshot = self
            .get(tick)
            .ok_or_else(|| KccError::Snapshot(format!("tick {tick} is not in the history")))?;
        kcc.restore_snapshot(snapshot, data)
    }

    /// Forgets every tick after `tick`, keeping the slots.
    pub fn discard_after(&mut self, tick: u32) {
        for slot in &mut self.slots {
            if slot.tick.is_some_and(|t| t > tick) {
                slot.tick = None;
            }
        }
        if self.latest.is_some_and(|t| t > tick) {
            self.latest = self.slots.iter().filter_map(|slot| slot.tick).max();
        }
    }

    /// Forgets every tick, keeping the slots.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.tick = None;
        }
        self.latest = None;
    }
}

impl std::fmt::Debug for SnapshotHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHistory")
            .field("size", &self.slots.len())
            .field("latest", &self.latest)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Networked identity list
// ─────────────────────────────────────────────────────────────────────────────

/// An ignored collider of a networked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredCollider {
    /// Owner of the collider.
    pub entity: NetworkId,
    /// The collider the subject passes through.
    pub collider: ColliderId,
}

/// Persistent ids of the interactions that travel over the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionIds {
    /// Entities the subject collides with, in registry order.
    pub collisions: Vec<NetworkId>,
    /// Entities attached as manual modifiers, in registry order.
    pub modifiers: Vec<NetworkId>,
    /// Ignored colliders, in registry order.
    pub ignores: Vec<IgnoredCollider>,
}

/// Outcome of [`InteractionIds::rebuild`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Ids bound to a live entity.
    pub resolved: usize,
    /// Ids skipped because the resolver did not know them.
    pub unresolved: usize,
}

impl InteractionIds {
    /// Captures at most `limit` ids in total: collisions first, then
    /// modifiers, then ignores.
    pub fn capture(set: &InteractionSet, limit: usize) -> Self {
        let mut ids = Self::default();
        ids.capture_into(set, limit);
        ids
    }

    /// Like [`capture`](Self::capture), reusing this list's allocations.
    pub fn capture_into(&mut self, set: &InteractionSet, limit: usize) {
        self.collisions.clear();
        self.modifiers.clear();
        self.ignores.clear();

        let mut remaining = limit;
        for record in set.collisions.iter().take(remaining) {
            self.collisions.push(record.entity_id());
        }
        remaining -= self.collisions.len();

        for record in set.modifiers.iter().take(remaining) {
            self.modifiers.push(record.entity_id());
        }
        remaining -= self.modifiers.len();

        for record in set.ignores.iter() {
            if remaining == 0 {
                break;
            }
            if let Some(collider) = record.collider() {
                self.ignores.push(IgnoredCollider {
                    entity: record.entity_id(),
                    collider,
                });
                remaining -= 1;
            }
        }

        let total = set.collisions.len() + set.modifiers.len() + set.ignores.len();
        if total > self.len() {
            log::warn!("networked interactions truncated to {limit} of {total}");
        }
    }

    /// Number of ids held.
    pub fn len(&self) -> usize {
        self.collisions.len() + self.modifiers.len() + self.ignores.len()
    }

    /// `true` if no id is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the list with bincode's standard configuration.
    pub fn encode(&self) -> KccResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| KccError::Snapshot(format!("encode interaction ids: {e}")))
    }

    /// Decodes a list produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> KccResult<Self> {
        let (ids, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| KccError::Snapshot(format!("decode interaction ids: {e}")))?;
        Ok(ids)
    }

    /// Replaces collisions, modifiers and ignores of `set` with the
    /// entities `resolver` knows. Unknown ids are skipped and counted.
    pub fn rebuild(&self, set: &mut InteractionSet, resolver: &dyn EntityResolver) -> RebuildReport {
        let mut report = RebuildReport::default();
        let mut count = |resolved: bool| {
            if resolved {
                report.resolved += 1;
            } else {
                report.unresolved += 1;
            }
        };

        set.collisions.clear();
        for &id in &self.collisions {
            count(set.collisions.add_resolved(resolver.resolve(id).as_ref(), id));
        }

        set.modifiers.clear();
        for &id in &self.modifiers {
            count(set.modifiers.add_resolved(resolver.resolve(id).as_ref(), id));
        }

        set.ignores.clear();
        for ignored in &self.ignores {
            let resolved = match resolver.resolve(ignored.entity) {
                Some(entity) if entity.network_id() == ignored.entity => {
                    set.ignores.add_with_collider(&entity, None, Some(ignored.collider));
                    true
                }
                _ => false,
            };
            count(resolved);
        }

        if report.unresolved > 0 {
            log::debug!("{} networked interactions could not be resolved", report.unresolved);
        }
        report
    }
}
