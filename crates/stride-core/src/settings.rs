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

//! Controller settings and their RON loader.

use crate::error::{KccError, KccResult};
use crate::features::KccFeatures;
use serde::{Deserialize, Serialize};

/// Lower bound applied to [`KccSettings::ccd_radius_multiplier`] on use.
pub const MIN_CCD_RADIUS_MULTIPLIER: f32 = 0.25;
/// Upper bound applied to [`KccSettings::ccd_radius_multiplier`] on use.
pub const MAX_CCD_RADIUS_MULTIPLIER: f32 = 0.75;

/// Configuration of one subject.
///
/// Every field has a default, so a RON file only needs to name what it
/// overrides:
///
/// ```
/// use stride_core::KccSettings;
///
/// let settings = KccSettings::from_ron_str("(radius: 0.5, trace_stages: true)").unwrap();
/// assert_eq!(settings.radius, 0.5);
/// assert_eq!(settings.height, 1.8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KccSettings {
    /// Capsule radius.
    pub radius: f32,
    /// Capsule height.
    pub height: f32,
    /// Skin width added around the capsule for overlap queries.
    pub extent: f32,
    /// Features enabled for every move.
    pub features: KccFeatures,
    /// Position change above which a move counts as a teleport.
    pub teleport_threshold: f32,
    /// Penetration solver iterations copied into each step.
    pub max_penetration_steps: u32,
    /// Sub-step length relative to `radius` when CCD is active.
    pub ccd_radius_multiplier: f32,
    /// Upper bound of networked interactions (collisions, modifiers, ignores).
    pub networked_interactions: usize,
    /// Depth limit of nested stage execution.
    pub max_nested_stages: usize,
    /// Initial capacity of record pools and processor caches.
    pub cache_size: usize,
    /// Moves with a shorter delta time are extrapolated instead of simulated.
    pub extrapolation_delta_time_threshold: f32,
    /// Ticks kept by the snapshot history.
    pub history_size: usize,
    /// Logs every processor dispatch at trace level.
    pub trace_stages: bool,
}

impl Default for KccSettings {
    fn default() -> Self {
        Self {
            radius: 0.35,
            height: 1.8,
            extent: 0.035,
            features: KccFeatures::ALL,
            teleport_threshold: 1.0,
            max_penetration_steps: 8,
            ccd_radius_multiplier: 0.75,
            networked_interactions: 8,
            max_nested_stages: 32,
            cache_size: 64,
            extrapolation_delta_time_threshold: 0.00005,
            history_size: 60,
            trace_stages: false,
        }
    }
}

impl KccSettings {
    /// Parses settings from RON text and validates them.
    pub fn from_ron_str(text: &str) -> KccResult<Self> {
        let settings: KccSettings =
            ron::de::from_str(text).map_err(|e| KccError::SettingsParse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serializes the settings to pretty RON.
    pub fn to_ron_string(&self) -> KccResult<String> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty).map_err(|e| KccError::SettingsParse(e.to_string()))
    }

    /// Rejects values the controller cannot run with.
    pub fn validate(&self) -> KccResult<()> {
        let floats = [
            ("radius", self.radius),
            ("height", self.height),
            ("extent", self.extent),
            ("teleport_threshold", self.teleport_threshold),
            ("ccd_radius_multiplier", self.ccd_radius_multiplier),
            ("extrapolation_delta_time_threshold", self.extrapolation_delta_time_threshold),
        ];
        if let Some((name, value)) = floats.iter().find(|(_, value)| !value.is_finite()) {
            return Err(KccError::InvalidSettings(format!("{name} must be finite, got {value}")));
        }

        if self.radius <= 0.0 {
            return Err(KccError::InvalidSettings(format!(
                "radius must be positive, got {}",
                self.radius
            )));
        }
        if self.height < 2.0 * self.radius {
            return Err(KccError::InvalidSettings(format!(
                "height {} is smaller than the capsule diameter {}",
                self.height,
                2.0 * self.radius
            )));
        }
        if self.extent < 0.0 {
            return Err(KccError::InvalidSettings("extent must not be negative".into()));
        }
        if self.extrapolation_delta_time_threshold <= 0.0 {
            return Err(KccError::InvalidSettings(format!(
                "extrapolation_delta_time_threshold must be positive, got {}",
                self.extrapolation_delta_time_threshold
            )));
        }
        if self.max_nested_stages == 0 {
            return Err(KccError::InvalidSettings("max_nested_stages must be at least 1".into()));
        }
        if self.history_size == 0 {
            return Err(KccError::InvalidSettings("history_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Length of one CCD sub-step.
    pub fn ccd_step_length(&self) -> f32 {
        self.radius
            * self
                .ccd_radius_multiplier
                .clamp(MIN_CCD_RADIUS_MULTIPLIER, MAX_CCD_RADIUS_MULTIPLIER)
    }
}
