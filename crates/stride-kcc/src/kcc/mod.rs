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

//! The subject: one kinematic controller instance.
//!
//! A [`Kcc`] owns its interaction registries, its local processors and its
//! stage stack. It does not own the per-step [`KccData`]; the driver keeps
//! one record per timeline and passes it to every call.

mod interactions;
mod movement;
mod stages;

use crate::interactions::InteractionSet;
use crate::physics::{OverlapInfo, PhysicsQuery};
use crate::processor::{sort_by_priority, Processor, ProcessorRef};
use crate::provider::ProcessorSource;
use crate::stages::{AfterMoveStep, StageFrame};
use std::sync::Arc;
use stride_core::{ColliderId, KccData, KccFeatures, KccResult, KccSettings, NetworkId, Pool};

/// A kinematic character controller.
pub struct Kcc {
    pub(crate) name: String,
    pub(crate) settings: KccSettings,
    pub(crate) spawned: bool,
    pub(crate) physics: Option<Arc<dyn PhysicsQuery>>,

    pub(crate) interactions: InteractionSet,
    pub(crate) local_processors: Vec<ProcessorRef>,
    pub(crate) external_source: Option<Box<dyn ProcessorSource>>,
    pub(crate) external_processors: Vec<ProcessorRef>,

    /// Every active processor, sorted by priority. Rebuilt once per move.
    pub(crate) cached_processors: Vec<Option<ProcessorRef>>,
    /// Copy of the cache that stages of the current move draw from.
    pub(crate) stage_processors: Vec<Option<ProcessorRef>>,
    pub(crate) sort_priorities: Vec<f32>,

    pub(crate) active_stages: Vec<StageFrame>,
    pub(crate) frame_pool: Pool<StageFrame>,
    pub(crate) frame_serial: u64,
    pub(crate) active_features: KccFeatures,

    pub(crate) extended_overlap: OverlapInfo,
    pub(crate) track_overlap: OverlapInfo,
    pub(crate) after_move_step: AfterMoveStep,
    pub(crate) removed_collisions: Vec<(NetworkId, Option<ColliderId>)>,
    pub(crate) added_collisions: Vec<usize>,
}

impl Kcc {
    /// Creates a spawned subject with validated `settings`.
    pub fn new(name: impl Into<String>, settings: KccSettings) -> KccResult<Self> {
        settings.validate()?;

        let capacity = settings.cache_size;
        let name = name.into();
        log::debug!("{name}: spawned with {:?}", settings.features);

        Ok(Self {
            name,
            spawned: true,
            physics: None,
            interactions: InteractionSet::with_capacity(capacity),
            local_processors: Vec::new(),
            external_source: None,
            external_processors: Vec::with_capacity(capacity),
            cached_processors: Vec::with_capacity(capacity),
            stage_processors: Vec::with_capacity(capacity),
            sort_priorities: Vec::with_capacity(capacity),
            active_stages: Vec::with_capacity(settings.max_nested_stages),
            frame_pool: Pool::with_capacity(settings.max_nested_stages.min(capacity), true),
            frame_serial: 0,
            active_features: settings.features,
            extended_overlap: OverlapInfo::with_capacity(capacity),
            track_overlap: OverlapInfo::with_capacity(capacity),
            after_move_step: AfterMoveStep::default(),
            removed_collisions: Vec::with_capacity(capacity),
            added_collisions: Vec::with_capacity(capacity),
            settings,
        })
    }

    /// Name used as prefix in log messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured settings.
    pub fn settings(&self) -> &KccSettings {
        &self.settings
    }

    /// `false` once [`despawn`](Self::despawn) ran.
    pub fn is_spawned(&self) -> bool {
        self.spawned
    }

    /// Binds the physics collaborator used by overlap queries.
    pub fn set_physics(&mut self, physics: Arc<dyn PhysicsQuery>) {
        self.physics = Some(physics);
    }

    /// The registries of this subject.
    pub fn interactions(&self) -> &InteractionSet {
        &self.interactions
    }

    /// Features active for the current move.
    pub fn active_features(&self) -> KccFeatures {
        self.active_features
    }

    /// `true` if every flag of `feature` is active for the current move.
    pub fn has_active_feature(&self, feature: KccFeatures) -> bool {
        self.active_features.contains(feature)
    }

    /// Processors gathered by the last cache pass, in priority order.
    /// Removed processors leave a `None` behind until the next pass.
    pub fn cached_processors(&self) -> &[Option<ProcessorRef>] {
        &self.cached_processors
    }

    // ─────────────────────────────────────────────────────────────────────
    // Processor cache
    // ─────────────────────────────────────────────────────────────────────

    /// Gathers every active processor: modifiers, then collisions, then
    /// local processors, then external ones. Duplicates keep their first
    /// (highest category) position. The result is sorted by priority,
    /// stable so category and registration order break ties.
    pub(crate) fn cache_processors(&mut self) {
        let mut cached = std::mem::take(&mut self.cached_processors);
        let mut external = std::mem::take(&mut self.external_processors);
        let mut priorities = std::mem::take(&mut self.sort_priorities);
        cached.clear();
        external.clear();

        let swept = self.interactions.modifiers.sweep_stale() + self.interactions.collisions.sweep_stale();
        if swept > 0 {
            log::debug!("{}: dropped {swept} stale interactions", self.name);
        }

        for record in self.interactions.modifiers.iter() {
            if let Some(processor) = record.processor() {
                self.push_unique(&mut cached, processor);
            }
        }
        for record in self.interactions.collisions.iter() {
            if let Some(processor) = record.processor() {
                self.push_unique(&mut cached, processor);
            }
        }
        for processor in &self.local_processors {
            self.push_unique(&mut cached, Arc::clone(processor));
        }
        if let Some(source) = &self.external_source {
            source.collect(&mut external);
        }
        for processor in &external {
            self.push_unique(&mut cached, Arc::clone(processor));
        }

        sort_by_priority(&mut cached, &mut priorities, |slot| {
            slot.as_ref().map_or(f32::MIN, |p| p.priority(self))
        });

        self.stage_processors.clear();
        self.stage_processors.extend(cached.iter().cloned());

        self.cached_processors = cached;
        self.external_processors = external;
        self.sort_priorities = priorities;
    }

    fn push_unique(&self, cached: &mut Vec<Option<ProcessorRef>>, processor: ProcessorRef) {
        let duplicate = cached
            .iter()
            .flatten()
            .any(|p| crate::processor::same_processor(p.as_ref(), processor.as_ref()));
        if !duplicate && processor.is_active(self) {
            cached.push(Some(processor));
        }
    }

    /// Forgets `processor` in every list that may still dispatch it, then
    /// tells it the interaction ended.
    fn on_processor_removed(&mut self, processor: &ProcessorRef, data: &mut KccData) {
        self.forget_processor(processor.as_ref());
        processor.on_exit(self, data);
    }

    fn forget_processor(&mut self, processor: &dyn Processor) {
        for frame in &mut self.active_stages {
            frame.forget(processor);
        }
        for list in [&mut self.cached_processors, &mut self.stage_processors] {
            for slot in list.iter_mut() {
                if slot
                    .as_ref()
                    .is_some_and(|p| crate::processor::same_processor(p.as_ref(), processor))
                {
                    *slot = None;
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────

    /// Tears the subject down.
    ///
    /// Every modifier and collision is removed whatever its provider's
    /// `can_stop_interaction` says, local processors are removed, ignores
    /// and hits are cleared, and active stage frames return to the pool.
    /// Later calls into the stage engine are no-ops.
    pub fn despawn(&mut self, data: &mut KccData) {
        if !self.spawned {
            return;
        }
        log::debug!("{}: despawning", self.name);

        while !self.interactions.modifiers.is_empty() {
            let index = self.interactions.modifiers.len() - 1;
            self.remove_modifier_at(index, data, true);
        }
        while !self.interactions.collisions.is_empty() {
            let index = self.interactions.collisions.len() - 1;
            self.remove_collision_at(index, data, true);
        }
        while let Some(processor) = self.local_processors.pop() {
            self.on_processor_removed(&processor, data);
        }

        self.interactions.ignores.clear();
        self.interactions.hits.clear();
        self.extended_overlap.reset();
        self.track_overlap.reset();
        self.after_move_step.overlap_info.reset();

        self.external_source = None;
        self.external_processors.clear();
        self.cached_processors.clear();
        self.stage_processors.clear();

        while let Some(mut frame) = self.active_stages.pop() {
            frame.clear();
            self.frame_pool.release(frame);
        }

        self.spawned = false;
    }
}

impl std::fmt::Debug for Kcc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kcc")
            .field("name", &self.name)
            .field("spawned", &self.spawned)
            .field("collisions", &self.interactions.collisions.len())
            .field("modifiers", &self.interactions.modifiers.len())
            .field("local_processors", &self.local_processors.len())
            .field("active_stages", &self.active_stages.len())
            .finish()
    }
}
