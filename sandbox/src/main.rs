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

//! Walks a controller across a floor with a jump pad, rewinds a few ticks
//! and resimulates them from history, checking the replay matches.

use anyhow::{ensure, Context, Result};
use std::sync::Arc;
use stride_kcc::processors::EnvironmentProcessor;
use stride_kcc::{
    AfterMoveStep, ColliderId, CollisionType, EntityResolver, InteractionIds, InteractionProvider, Kcc, KccData,
    KccSettings, NetworkEntity, NetworkId, OverlapHit, OverlapInfo, PhysicsQuery, Processor, ProcessorProvider,
    SnapshotHistory, StageKind, Vec3,
};

const SETTINGS: &str = "(radius: 0.35, height: 1.8, history_size: 32, trace_stages: false)";
const TICKS: u32 = 90;
const REWIND_TO: u32 = 70;
const FLOOR: ColliderId = ColliderId(1);
const PAD: ColliderId = ColliderId(10);

/// Launches whoever steps on it.
struct JumpPad {
    impulse: f32,
}

impl Processor for JumpPad {
    fn name(&self) -> &str {
        "JumpPad"
    }

    fn on_enter(&self, _kcc: &mut Kcc, data: &mut KccData) {
        log::info!("tick {}: jump pad entered", data.tick);
        data.jump_impulse = Vec3::new(0.0, self.impulse, 0.0);
    }

    fn on_exit(&self, _kcc: &mut Kcc, data: &mut KccData) {
        log::info!("tick {}: jump pad left", data.tick);
    }
}

/// Keeps the capsule on top of the floor plane.
struct FloorClamp;

impl Processor for FloorClamp {
    fn priority(&self, _kcc: &Kcc) -> f32 {
        2000.0
    }

    fn handles_stage(&self, kind: StageKind) -> bool {
        kind == StageKind::AfterMoveStep
    }

    fn after_move_step(&self, _stage: &mut AfterMoveStep, _kcc: &mut Kcc, data: &mut KccData) {
        if data.target_position.y < 0.0 {
            data.target_position.y = 0.0;
        }
    }
}

struct PadEntity {
    provider: Arc<ProcessorProvider>,
}

impl NetworkEntity for PadEntity {
    fn network_id(&self) -> NetworkId {
        NetworkId(10)
    }

    fn interaction_provider(&self) -> Option<Arc<dyn InteractionProvider>> {
        Some(self.provider.clone())
    }

    fn collider(&self) -> Option<ColliderId> {
        Some(PAD)
    }
}

/// A floor at y = 0 and a pad covering `pad_min..pad_max` along x.
struct World {
    pad: Arc<dyn NetworkEntity>,
    pad_min: f32,
    pad_max: f32,
    skin: f32,
}

impl PhysicsQuery for World {
    fn overlap(&self, position: Vec3, radius: f32, _height: f32, extent: f32, out: &mut OverlapInfo) {
        let reach = radius + extent;
        if position.y <= reach {
            out.add_hit(OverlapHit {
                collider: FLOOR,
                entity: None,
                collision_type: CollisionType::Ground,
                is_trigger: false,
                is_within_extent: position.y <= radius + self.skin,
            });
        }

        let outside = (self.pad_min - position.x).max(position.x - self.pad_max).max(0.0);
        if outside <= reach && position.y <= reach {
            out.add_hit(OverlapHit {
                collider: PAD,
                entity: Some(self.pad.clone()),
                collision_type: CollisionType::Ground,
                is_trigger: true,
                is_within_extent: outside <= radius + self.skin,
            });
        }
    }
}

impl EntityResolver for World {
    fn resolve(&self, id: NetworkId) -> Option<Arc<dyn NetworkEntity>> {
        (id == self.pad.network_id()).then(|| self.pad.clone())
    }
}

fn input_for(tick: u32) -> Vec3 {
    if tick < 60 {
        Vec3::new(1.0, 0.0, 0.0)
    } else {
        Vec3::ZERO
    }
}

fn simulate(
    kcc: &mut Kcc,
    data: &mut KccData,
    history: &mut SnapshotHistory,
    ticks: std::ops::RangeInclusive<u32>,
) -> Result<Vec<KccData>> {
    let mut states = Vec::new();
    for tick in ticks {
        data.tick = tick;
        data.time = tick as f32 * data.update_delta_time;
        data.delta_time = data.update_delta_time;
        data.input_direction = input_for(tick);

        kcc.move_predicted(data).with_context(|| format!("predicted move of tick {tick}"))?;
        history.record(kcc, data);
        states.push(data.clone());
    }
    Ok(states)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = KccSettings::from_ron_str(SETTINGS)?;
    let provider = Arc::new(ProcessorProvider::new(Arc::new(JumpPad { impulse: 4.0 })));
    let world = Arc::new(World {
        pad: Arc::new(PadEntity { provider }),
        pad_min: 3.0,
        pad_max: 3.5,
        skin: settings.extent,
    });

    let mut kcc = Kcc::new("sandbox", settings)?;
    kcc.set_physics(world.clone());

    let mut data = KccData {
        update_delta_time: 1.0 / 60.0,
        ..Default::default()
    };
    kcc.add_local_processor(Arc::new(EnvironmentProcessor::new(4.0)), &mut data);
    kcc.add_local_processor(Arc::new(FloorClamp), &mut data);

    let mut history = SnapshotHistory::new(kcc.settings());
    let predicted = simulate(&mut kcc, &mut data, &mut history, 1..=TICKS)?;
    let last = predicted.last().context("nothing simulated")?;
    log::info!(
        "predicted {} ticks, ended at {:?} grounded={}",
        predicted.len(),
        last.target_position,
        last.is_grounded
    );

    let ids = InteractionIds::capture(kcc.interactions(), kcc.settings().networked_interactions);
    let payload = ids.encode()?;
    log::info!("interaction ids: {} entries in {} bytes", ids.len(), payload.len());

    // A late correction arrives: rewind and resimulate.
    history.restore(REWIND_TO, &mut kcc, &mut data)?;
    history.discard_after(REWIND_TO);
    log::info!("rewound to tick {REWIND_TO} at {:?}", data.target_position);

    let replayed = simulate(&mut kcc, &mut data, &mut history, REWIND_TO + 1..=TICKS)?;
    for state in &replayed {
        let original = &predicted[(state.tick - 1) as usize];
        ensure!(
            state == original,
            "tick {} diverged on resimulation: {:?} vs {:?}",
            state.tick,
            state.target_position,
            original.target_position
        );
    }
    log::info!("resimulated {} ticks without divergence", replayed.len());

    // A remote peer rebuilds the same interactions from the replicated ids.
    let mut remote = Kcc::new("remote", kcc.settings().clone())?;
    let report = remote.rebuild_interactions(&InteractionIds::decode(&payload)?, world.as_ref())?;
    log::info!("remote rebuild: {} resolved, {} unresolved", report.resolved, report.unresolved);

    let mut render = KccData {
        tick: TICKS,
        alpha: 0.5,
        ..data.clone()
    };
    kcc.move_interpolated(&mut render, &history)?;
    log::info!("render position at alpha 0.5: {:?}", render.target_position);

    Ok(())
}
