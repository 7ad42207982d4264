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

//! The movement pipeline: the fixed sequence of built-in stages around a
//! (possibly sub-stepped) move, and render-rate interpolation.

use super::Kcc;
use crate::snapshot::SnapshotHistory;
use crate::stages::{BeginMove, EndMove, HitsQuery, InterpolateStage, PrepareData, StayStage};
use stride_core::{KccData, KccFeatures, KccResult, Vec3, EPSILON};

/// Extra length a CCD step may take before it is split, in radii.
const CCD_STEP_TOLERANCE: f32 = 0.1;

impl Kcc {
    /// Runs one predicted move of `data`.
    ///
    /// Stages run in this order: `BeginMove`, `PrepareData`, one
    /// `AfterMoveStep` per sub-step, `EndMove`, then `on_stay`. Very small
    /// delta times extrapolate instead and skip the middle stages. An
    /// inactive record drops its collisions and hits and runs nothing.
    pub fn move_predicted(&mut self, data: &mut KccData) -> KccResult<()> {
        if !self.spawned {
            return Ok(());
        }

        self.active_features = self.settings.features;

        let base_time = data.time;
        let mut base_position = data.target_position;
        let mut desired_position = data.target_position;
        let was_grounded = data.is_grounded;

        data.base_position = base_position;
        data.desired_position = desired_position;

        if !data.is_active {
            self.deactivate(data);
            return Ok(());
        }

        self.cache_processors();
        data.has_teleported = false;
        data.max_penetration_steps = self.settings.max_penetration_steps;

        self.run_stage(&mut BeginMove, data)?;

        if !data.is_active {
            self.deactivate(data);
            return self.run_stage(&mut EndMove, data);
        }

        let base_delta_time = data.delta_time;
        base_position = data.base_position;

        if base_delta_time < self.settings.extrapolation_delta_time_threshold {
            let mut velocity = data.desired_velocity();
            if data.real_velocity.length_squared() <= velocity.length_squared() {
                velocity = data.real_velocity;
            }
            desired_position = base_position + velocity * base_delta_time;

            data.base_position = base_position;
            data.desired_position = desired_position;
            data.target_position = desired_position;

            self.run_stage(&mut EndMove, data)?;
            return self.run_stage(&mut StayStage, data);
        }

        self.run_stage(&mut PrepareData, data)?;
        self.interactions.hits.clear();

        let mut pending_delta_time = base_delta_time.clamp(0.0, 1.0);
        let mut pending_delta = data.desired_velocity() * pending_delta_time + data.external_delta;

        desired_position = data.base_position + pending_delta;
        data.desired_position = desired_position;
        data.target_position = data.base_position;
        data.external_delta = Vec3::ZERO;

        let optimal_step = self.settings.ccd_step_length();
        let max_step = optimal_step + self.settings.radius * CCD_STEP_TOLERANCE;
        let mut non_teleported_position = data.target_position;
        let mut finished = false;

        while !finished && !data.has_teleported {
            data.base_position = data.target_position;

            let mut consume_delta_time = pending_delta_time;
            let mut consume_delta = pending_delta;
            finished = true;

            if self.has_active_feature(KccFeatures::CCD) {
                let magnitude = consume_delta.length();
                if magnitude > max_step {
                    let ratio = optimal_step / magnitude;
                    consume_delta_time *= ratio;
                    consume_delta = consume_delta * ratio;
                    finished = false;
                }
            }

            pending_delta_time = (pending_delta_time - consume_delta_time).max(0.0);
            pending_delta -= consume_delta;

            data.time = base_time - pending_delta_time;
            data.delta_time = consume_delta_time;
            data.desired_position = data.base_position + consume_delta;
            data.target_position = data.desired_position;
            data.was_grounded = data.is_grounded;

            self.process_move_step(data)?;
            if !self.spawned {
                return Ok(());
            }

            if !data.has_teleported {
                non_teleported_position = data.target_position;
            }

            self.update_collisions(data);

            if data.has_teleported {
                self.update_hits(data, None, HitsQuery::New);
                self.update_collisions(data);
            }

            if finished && !data.external_delta.is_zero() {
                pending_delta += data.external_delta;
                data.external_delta = Vec3::ZERO;
                finished = false;
            }
        }

        data.time = base_time;
        data.delta_time = base_delta_time;
        data.base_position = base_position;
        data.desired_position = desired_position;
        data.was_grounded = was_grounded;
        data.real_velocity = (non_teleported_position - data.base_position) / data.delta_time;
        data.real_speed = data.real_velocity.length();

        let target_position = data.target_position;
        self.run_stage(&mut EndMove, data)?;
        self.refresh_if_moved(target_position, data);

        let target_position = data.target_position;
        self.run_stage(&mut StayStage, data)?;
        self.refresh_if_moved(target_position, data);

        Ok(())
    }

    /// One sub-step: overlap at the step target, rebuild hits, then let
    /// processors react in `AfterMoveStep`.
    fn process_move_step(&mut self, data: &mut KccData) -> KccResult<()> {
        data.is_grounded = false;
        data.ground_normal = Vec3::UP;

        self.interactions.hits.clear();

        let mut extended = std::mem::take(&mut self.extended_overlap);
        self.overlap_capsule(data.target_position, self.settings.radius, &mut extended);
        self.update_hits(data, Some(&extended), HitsQuery::Default);

        let mut step = std::mem::take(&mut self.after_move_step);
        step.overlap_info.copy_from(&extended);
        self.extended_overlap = extended;

        let result = self.run_stage(&mut step, data);
        self.after_move_step = step;
        result
    }

    fn refresh_if_moved(&mut self, previous_target: Vec3, data: &mut KccData) {
        if !data.target_position.is_equal(previous_target, EPSILON) {
            self.update_hits(data, None, HitsQuery::New);
            self.update_collisions(data);
        }
    }

    fn deactivate(&mut self, data: &mut KccData) {
        data.clear_transient();
        self.force_remove_collisions(data);
        self.interactions.hits.clear();
    }

    /// Runs one render-rate update of `data`.
    ///
    /// Positions and real velocity are interpolated by `data.alpha`
    /// between the history entries of `data.tick - 1` and `data.tick`. The
    /// current entry is used as is when it teleported, when the previous
    /// entry is missing, or when the two are further apart than
    /// `teleport_threshold`. Processors then receive `on_interpolate`.
    pub fn move_interpolated(&mut self, data: &mut KccData, history: &SnapshotHistory) -> KccResult<()> {
        if !self.spawned || !data.is_active {
            return Ok(());
        }

        if let Some(current) = history.get(data.tick) {
            let current = &current.data;
            let previous = data
                .tick
                .checked_sub(1)
                .and_then(|tick| history.get(tick))
                .map(|snapshot| &snapshot.data);

            match previous {
                Some(previous) if !current.has_teleported && !self.is_teleport(previous, current) => {
                    let alpha = data.alpha.clamp(0.0, 1.0);
                    data.base_position = Vec3::lerp(previous.base_position, current.base_position, alpha);
                    data.desired_position = Vec3::lerp(previous.desired_position, current.desired_position, alpha);
                    data.target_position = Vec3::lerp(previous.target_position, current.target_position, alpha);
                    data.real_velocity = Vec3::lerp(previous.real_velocity, current.real_velocity, alpha);
                    data.real_speed = previous.real_speed + (current.real_speed - previous.real_speed) * alpha;
                }
                _ => {
                    data.base_position = current.base_position;
                    data.desired_position = current.desired_position;
                    data.target_position = current.target_position;
                    data.real_velocity = current.real_velocity;
                    data.real_speed = current.real_speed;
                }
            }
        }

        self.cache_processors();
        self.run_stage(&mut InterpolateStage, data)
    }

    fn is_teleport(&self, previous: &KccData, current: &KccData) -> bool {
        let threshold = self.settings.teleport_threshold;
        (current.target_position - previous.target_position).length_squared() > threshold * threshold
    }
}
