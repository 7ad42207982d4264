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

use crate::kcc::Kcc;
use crate::physics::CollisionType;
use crate::processor::Processor;
use crate::stages::{AfterMoveStep, PrepareData};
use stride_core::{KccData, StageKind, Vec3};

/// Baseline movement: input-driven kinematic velocity, gravity, jumps and
/// grounding from `Ground` hits.
///
/// When several are active only the one that runs first in
/// `PrepareData` applies; it suppresses the others.
#[derive(Debug, Clone)]
pub struct EnvironmentProcessor {
    /// Horizontal speed at full input.
    pub kinematic_speed: f32,
    /// Scale of the jump impulse.
    pub jump_multiplier: f32,
    /// Overrides the gravity of the data record.
    pub gravity: Option<Vec3>,
    /// Added to [`EnvironmentProcessor::DEFAULT_PRIORITY`].
    pub relative_priority: f32,
}

impl EnvironmentProcessor {
    /// Base priority, ahead of gameplay processors.
    pub const DEFAULT_PRIORITY: f32 = 1000.0;

    /// Creates a processor moving at `kinematic_speed` that keeps the
    /// record's gravity.
    ///
    /// ```
    /// use stride_kcc::processors::EnvironmentProcessor;
    ///
    /// let walker = EnvironmentProcessor::new(6.0);
    /// assert_eq!(walker.kinematic_speed, 6.0);
    /// assert!(walker.gravity.is_none());
    /// ```
    pub fn new(kinematic_speed: f32) -> Self {
        Self {
            kinematic_speed,
            ..Default::default()
        }
    }

    fn kinematic_velocity(&self, input: Vec3) -> Vec3 {
        let planar = Vec3::new(input.x, 0.0, input.z);
        if planar.is_zero() {
            return Vec3::ZERO;
        }
        // Partial input keeps partial speed.
        let magnitude = planar.length().min(1.0);
        planar.normalize() * (self.kinematic_speed * magnitude)
    }
}

impl Default for EnvironmentProcessor {
    fn default() -> Self {
        Self {
            kinematic_speed: 8.0,
            jump_multiplier: 1.0,
            gravity: None,
            relative_priority: 0.0,
        }
    }
}

impl Processor for EnvironmentProcessor {
    fn name(&self) -> &str {
        "EnvironmentProcessor"
    }

    fn priority(&self, _kcc: &Kcc) -> f32 {
        Self::DEFAULT_PRIORITY + self.relative_priority
    }

    fn handles_stage(&self, kind: StageKind) -> bool {
        matches!(kind, StageKind::PrepareData | StageKind::AfterMoveStep)
    }

    fn prepare_data(&self, _stage: &mut PrepareData, kcc: &mut Kcc, data: &mut KccData) {
        if let Err(e) = kcc.suppress_processors_of::<EnvironmentProcessor>(false) {
            log::warn!("{}: {e}", kcc.name());
        }

        if let Some(gravity) = self.gravity {
            data.gravity = gravity;
        }

        data.kinematic_velocity = self.kinematic_velocity(data.input_direction);

        let dt = data.delta_time;
        let mut dynamic = data.dynamic_velocity;
        if !data.is_grounded {
            dynamic += data.gravity * dt;
        }
        dynamic += data.external_acceleration * dt;
        dynamic += data.external_impulse;
        dynamic += data.external_force * dt;

        if data.jump_frames > 0 {
            data.jump_frames += 1;
        }
        if !data.jump_impulse.is_zero() && self.jump_multiplier > 0.0 {
            dynamic.y = dynamic.y.max(0.0);
            dynamic += data.jump_impulse * self.jump_multiplier;
            data.jump_frames = 1;
            data.jump_impulse = Vec3::ZERO;
        }

        data.dynamic_velocity = dynamic;
        data.kinematic_velocity += data.external_velocity;

        data.external_velocity = Vec3::ZERO;
        data.external_acceleration = Vec3::ZERO;
        data.external_impulse = Vec3::ZERO;
        data.external_force = Vec3::ZERO;
    }

    fn after_move_step(&self, stage: &mut AfterMoveStep, _kcc: &mut Kcc, data: &mut KccData) {
        let grounded = !data.has_jumped()
            && stage
                .overlap_info
                .collider_hits()
                .any(|hit| hit.collision_type == CollisionType::Ground);

        data.is_grounded = grounded;
        if grounded {
            data.jump_frames = 0;
            if data.dynamic_velocity.y < 0.0 {
                data.dynamic_velocity.y = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kinematic_velocity_is_planar_and_scaled() {
        let processor = EnvironmentProcessor::new(4.0);

        let full = processor.kinematic_velocity(Vec3::new(1.0, 5.0, 0.0));
        assert_relative_eq!(full.x, 4.0);
        assert_relative_eq!(full.y, 0.0);

        let half = processor.kinematic_velocity(Vec3::new(0.0, 0.0, 0.5));
        assert_relative_eq!(half.z, 2.0);

        assert!(processor.kinematic_velocity(Vec3::UP).is_zero());
    }
}
