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

//! The per-step data record threaded through every processor callback.

use crate::math::Vec3;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Mutable state of one movement step.
///
/// The driver owns one record per timeline (fixed/render) and hands it,
/// by `&mut`, to each stage. Processors read and write it freely; the
/// pipeline only touches the fields it documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct KccData {
    /// Render frame counter.
    pub frame: u32,
    /// Simulation tick.
    pub tick: u32,
    /// Interpolation alpha for render updates.
    pub alpha: f32,
    /// Simulation time in seconds.
    pub time: f32,
    /// Delta time of the current move.
    pub delta_time: f32,
    /// Delta time of the whole update, unaffected by sub-stepping.
    pub update_delta_time: f32,
    /// Inactive records skip the move and drop their collisions.
    pub is_active: bool,

    /// Position at the start of the move.
    pub base_position: Vec3,
    /// Position the move aimed for.
    pub desired_position: Vec3,
    /// Position after the move.
    pub target_position: Vec3,

    /// Desired input direction, usually normalized.
    pub input_direction: Vec3,
    /// Gravity applied by movement processors.
    pub gravity: Vec3,
    /// Jump impulse requested this step.
    pub jump_impulse: Vec3,
    /// Frames since the last jump, `1` on the jump frame.
    pub jump_frames: u32,
    /// Penetration solver iterations per step.
    pub max_penetration_steps: u32,

    /// Kinematic part of the velocity (input driven).
    pub kinematic_velocity: Vec3,
    /// Dynamic part of the velocity (forces, impulses).
    pub dynamic_velocity: Vec3,
    /// Velocity added by collaborators for one step.
    pub external_velocity: Vec3,
    /// Acceleration added by collaborators for one step.
    pub external_acceleration: Vec3,
    /// Impulse added by collaborators for one step.
    pub external_impulse: Vec3,
    /// Force added by collaborators for one step.
    pub external_force: Vec3,
    /// Absolute position offset consumed by the next move.
    pub external_delta: Vec3,

    /// Velocity actually achieved by the last move.
    pub real_velocity: Vec3,
    /// Length of `real_velocity`.
    pub real_speed: f32,

    /// The last move was a teleport.
    pub has_teleported: bool,
    /// Grounded at the end of the move.
    pub is_grounded: bool,
    /// Grounded at the end of the previous move.
    pub was_grounded: bool,
    /// Ground normal, `UP` when not grounded.
    pub ground_normal: Vec3,
}

impl Default for KccData {
    fn default() -> Self {
        Self {
            frame: 0,
            tick: 0,
            alpha: 0.0,
            time: 0.0,
            delta_time: 0.0,
            update_delta_time: 0.0,
            is_active: true,
            base_position: Vec3::ZERO,
            desired_position: Vec3::ZERO,
            target_position: Vec3::ZERO,
            input_direction: Vec3::ZERO,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            jump_impulse: Vec3::ZERO,
            jump_frames: 0,
            max_penetration_steps: 8,
            kinematic_velocity: Vec3::ZERO,
            dynamic_velocity: Vec3::ZERO,
            external_velocity: Vec3::ZERO,
            external_acceleration: Vec3::ZERO,
            external_impulse: Vec3::ZERO,
            external_force: Vec3::ZERO,
            external_delta: Vec3::ZERO,
            real_velocity: Vec3::ZERO,
            real_speed: 0.0,
            has_teleported: false,
            is_grounded: false,
            was_grounded: false,
            ground_normal: Vec3::UP,
        }
    }
}

impl KccData {
    /// Combined kinematic and dynamic velocity.
    #[inline]
    pub fn desired_velocity(&self) -> Vec3 {
        self.kinematic_velocity + self.dynamic_velocity
    }

    /// `true` on the frame a jump was started.
    #[inline]
    pub fn has_jumped(&self) -> bool {
        self.jump_frames == 1
    }

    /// Lost ground contact during the last move.
    #[inline]
    pub fn is_on_edge(&self) -> bool {
        !self.is_grounded && self.was_grounded
    }

    /// Overwrites every field with `other`, reusing this allocation.
    pub fn copy_from(&mut self, other: &KccData) {
        self.clone_from(other);
    }

    /// Clears what must not carry over into the next step of an inactive
    /// record.
    pub fn clear_transient(&mut self) {
        self.jump_frames = 0;
        self.jump_impulse = Vec3::ZERO;
        self.external_velocity = Vec3::ZERO;
        self.external_acceleration = Vec3::ZERO;
        self.external_impulse = Vec3::ZERO;
        self.external_force = Vec3::ZERO;
    }
}
