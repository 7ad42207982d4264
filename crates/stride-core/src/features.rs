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

//! Optional controller features.

crate::stride_bitflags! {
    /// Features a subject runs with. The configured set can be narrowed or
    /// widened per move from inside the `BeginMove` stage.
    pub struct KccFeatures: u32 {
        /// Continuous collision detection, splits long moves into sub-steps.
        const CCD = 1 << 0;
        /// Suppresses small render-position corrections.
        const ANTI_JITTER = 1 << 1;
        /// Smooths out prediction errors after a rollback.
        const PREDICTION_CORRECTION = 1 << 2;
        /// Every feature.
        const ALL = (1 << 0) | (1 << 1) | (1 << 2);
    }
}

impl KccFeatures {
    /// Resolves the set for one move: `configured`, plus `enforced`, minus
    /// `suppressed`. Suppression wins over enforcement.
    pub fn resolve(configured: Self, enforced: Self, suppressed: Self) -> Self {
        (configured | enforced) & !suppressed
    }
}
