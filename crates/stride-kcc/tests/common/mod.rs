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

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use stride_kcc::{
    AfterMoveStep, BeginMove, CollisionType, EndMove, InteractionProvider, Kcc, KccData, KccSettings,
    NetworkEntity, NetworkId, OverlapHit, OverlapInfo, PhysicsQuery, PrepareData, Processor,
    ProcessorProvider, ProcessorRef, Stage, StageKind, Vec3,
};
use stride_kcc::ColliderId;

pub const SCAN: StageKind = StageKind::Custom("scan");

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn kcc() -> Kcc {
    kcc_with(KccSettings::default())
}

pub fn kcc_with(settings: KccSettings) -> Kcc {
    init_logging();
    Kcc::new("test", settings).unwrap()
}

/// Ordered record of callbacks, shared between processors of one test.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Entries ending with `:{suffix}`, without the suffix.
    pub fn of(&self, suffix: &str) -> Vec<String> {
        let tail = format!(":{suffix}");
        self.entries()
            .into_iter()
            .filter_map(|entry| entry.strip_suffix(&tail).map(str::to_owned))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub type Hook = Box<dyn Fn(StageKind, &mut Kcc, &mut KccData) + Send + Sync>;

/// A processor that logs `label:Stage` for every callback it receives and
/// optionally runs a hook from its stage callbacks.
pub struct Recorder {
    pub label: &'static str,
    pub priority: f32,
    pub stages: Vec<StageKind>,
    pub log: Log,
    hook: OnceLock<Hook>,
}

impl Recorder {
    pub fn new(label: &'static str, priority: f32, stages: &[StageKind], log: &Log) -> Arc<Self> {
        Arc::new(Self {
            label,
            priority,
            stages: stages.to_vec(),
            log: log.clone(),
            hook: OnceLock::new(),
        })
    }

    pub fn set_hook(&self, hook: impl Fn(StageKind, &mut Kcc, &mut KccData) + Send + Sync + 'static) {
        if self.hook.set(Box::new(hook)).is_err() {
            panic!("hook of {} already set", self.label);
        }
    }

    fn record(&self, kind: StageKind, kcc: &mut Kcc, data: &mut KccData) {
        self.log.push(format!("{}:{kind}", self.label));
        if let Some(hook) = self.hook.get() {
            hook(kind, kcc, data);
        }
    }
}

impl Processor for Recorder {
    fn name(&self) -> &str {
        self.label
    }

    fn priority(&self, _kcc: &Kcc) -> f32 {
        self.priority
    }

    fn handles_stage(&self, kind: StageKind) -> bool {
        self.stages.contains(&kind)
    }

    fn on_enter(&self, _kcc: &mut Kcc, _data: &mut KccData) {
        self.log.push(format!("{}:enter", self.label));
    }

    fn on_exit(&self, _kcc: &mut Kcc, _data: &mut KccData) {
        self.log.push(format!("{}:exit", self.label));
    }

    fn on_stay(&self, kcc: &mut Kcc, data: &mut KccData) {
        self.record(StageKind::Stay, kcc, data);
    }

    fn on_interpolate(&self, kcc: &mut Kcc, data: &mut KccData) {
        self.record(StageKind::Interpolate, kcc, data);
    }

    fn begin_move(&self, _stage: &mut BeginMove, kcc: &mut Kcc, data: &mut KccData) {
        self.record(StageKind::BeginMove, kcc, data);
    }

    fn prepare_data(&self, _stage: &mut PrepareData, kcc: &mut Kcc, data: &mut KccData) {
        self.record(StageKind::PrepareData, kcc, data);
    }

    fn after_move_step(&self, _stage: &mut AfterMoveStep, kcc: &mut Kcc, data: &mut KccData) {
        self.record(StageKind::AfterMoveStep, kcc, data);
    }

    fn end_move(&self, _stage: &mut EndMove, kcc: &mut Kcc, data: &mut KccData) {
        self.record(StageKind::EndMove, kcc, data);
    }

    fn custom_stage(&self, stage: &mut dyn Stage, kcc: &mut Kcc, data: &mut KccData) {
        self.record(stage.kind(), kcc, data);
    }
}

/// The custom stage used by most tests.
#[derive(Default)]
pub struct Scan;

impl Stage for Scan {
    fn kind(&self) -> StageKind {
        SCAN
    }

    fn invoke(&mut self, processor: &dyn Processor, kcc: &mut Kcc, data: &mut KccData) {
        processor.custom_stage(self, kcc, data);
    }
}

/// A networked entity with an optional provider.
pub struct TestEntity {
    pub id: NetworkId,
    pub collider: Option<ColliderId>,
    pub provider: Option<Arc<dyn InteractionProvider>>,
}

impl NetworkEntity for TestEntity {
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

/// An entity with collider `id` whose provider wraps `processor`.
pub fn entity_with(id: u64, processor: ProcessorRef) -> (Arc<dyn NetworkEntity>, Arc<ProcessorProvider>) {
    let provider = Arc::new(ProcessorProvider::new(processor));
    let entity: Arc<dyn NetworkEntity> = Arc::new(TestEntity {
        id: NetworkId(id),
        collider: Some(ColliderId(id as u32)),
        provider: Some(provider.clone()),
    });
    (entity, provider)
}

/// An entity with collider `id` and no provider.
pub fn bare_entity(id: u64) -> Arc<dyn NetworkEntity> {
    Arc::new(TestEntity {
        id: NetworkId(id),
        collider: Some(ColliderId(id as u32)),
        provider: None,
    })
}

/// A slab of space along the x axis occupied by one collider.
pub struct Region {
    pub collider: ColliderId,
    pub entity: Option<Arc<dyn NetworkEntity>>,
    pub center_x: f32,
    pub half_width: f32,
    pub collision_type: CollisionType,
    pub is_trigger: bool,
}

/// Physics stand-in: colliders are slabs along x, the capsule overlaps a
/// slab when its base is within `half_width + radius + extent` of it.
#[derive(Default)]
pub struct FakePhysics {
    pub regions: Mutex<Vec<Region>>,
    pub queries: Mutex<Vec<Vec3>>,
    pub skin: f32,
    count: AtomicUsize,
}

impl FakePhysics {
    pub fn new(skin: f32) -> Arc<Self> {
        Arc::new(Self {
            skin,
            ..Default::default()
        })
    }

    pub fn add(&self, entity: Option<Arc<dyn NetworkEntity>>, collider: u32, center_x: f32, half_width: f32) {
        self.add_typed(entity, collider, center_x, half_width, CollisionType::None);
    }

    pub fn add_typed(
        &self,
        entity: Option<Arc<dyn NetworkEntity>>,
        collider: u32,
        center_x: f32,
        half_width: f32,
        collision_type: CollisionType,
    ) {
        self.regions.lock().unwrap().push(Region {
            collider: ColliderId(collider),
            entity,
            center_x,
            half_width,
            collision_type,
            is_trigger: false,
        });
    }

    pub fn remove(&self, collider: u32) {
        self.regions
            .lock()
            .unwrap()
            .retain(|region| region.collider != ColliderId(collider));
    }

    pub fn query_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn reset_queries(&self) {
        self.count.store(0, Ordering::SeqCst);
        self.queries.lock().unwrap().clear();
    }
}

impl PhysicsQuery for FakePhysics {
    fn overlap(&self, position: Vec3, radius: f32, _height: f32, extent: f32, out: &mut OverlapInfo) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(position);

        for region in self.regions.lock().unwrap().iter() {
            let distance = (position.x - region.center_x).abs();
            if distance <= region.half_width + radius + extent {
                out.add_hit(OverlapHit {
                    collider: region.collider,
                    entity: region.entity.clone(),
                    collision_type: region.collision_type,
                    is_trigger: region.is_trigger,
                    is_within_extent: distance <= region.half_width + radius + self.skin,
                });
            }
        }
    }
}

/// A data record ready for a predicted move at 60 Hz.
pub fn step_data(tick: u32) -> KccData {
    KccData {
        tick,
        delta_time: 1.0 / 60.0,
        update_delta_time: 1.0 / 60.0,
        ..Default::default()
    }
}
