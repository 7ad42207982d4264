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

use super::{InteractionKind, Interactions};

/// A collider excluded from overlap results.
#[derive(Debug, Default)]
pub struct Ignore;

impl InteractionKind for Ignore {
    const NAME: &'static str = "Ignore";
    const KEYED_BY_COLLIDER: bool = true;

    fn copy_from(&mut self, _other: &Self) {}
}

/// Ignored colliders.
pub type Ignores = Interactions<Ignore>;
