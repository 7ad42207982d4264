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

//! A free-list pool for short-lived values.

/// Free list of reusable values.
///
/// `acquire` pops a previously released value or builds a fresh one with
/// the pool's factory. `release` pushes a value back; when the free list is
/// full its storage doubles, which is the only allocation the pool ever
/// makes after warm-up. Callers reset released values themselves: the pool
/// never inspects what it stores.
///
/// Pools are plain owned values. Every subject owns its own, so no pool is
/// ever shared between independently scheduled subjects.
pub struct Pool<T> {
    free: Vec<T>,
    factory: fn() -> T,
    created: usize,
}

impl<T: Default> Pool<T> {
    /// Creates an empty pool building values with `T::default`.
    pub fn new() -> Self {
        Self::with_factory(T::default)
    }

    /// Creates a pool with room for `capacity` released values, optionally
    /// filling it up front.
    pub fn with_capacity(capacity: usize, prefill: bool) -> Self {
        let mut pool = Self {
            free: Vec::with_capacity(capacity),
            factory: T::default,
            created: 0,
        };
        if prefill {
            for _ in 0..capacity {
                let item = (pool.factory)();
                pool.created += 1;
                pool.free.push(item);
            }
        }
        pool
    }
}

impl<T: Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    /// Creates an empty pool building values with `factory`.
    pub fn with_factory(factory: fn() -> T) -> Self {
        Self {
            free: Vec::new(),
            factory,
            created: 0,
        }
    }

    /// Takes a value out of the pool, building a new one if none is free.
    #[must_use]
    pub fn acquire(&mut self) -> T {
        match self.free.pop() {
            Some(item) => item,
            None => {
                self.created += 1;
                (self.factory)()
            }
        }
    }

    /// Returns a value to the pool.
    pub fn release(&mut self, item: T) {
        if self.free.len() == self.free.capacity() {
            let additional = self.free.capacity().max(4);
            self.free.reserve_exact(additional);
            log::trace!(
                "pool free list grew to {} slots ({} values built)",
                self.free.capacity(),
                self.created
            );
        }
        self.free.push(item);
    }

    /// Number of values waiting to be reused.
    pub fn len(&self) -> usize {
        self.free.len()
    }

    /// `true` if the next `acquire` builds a new value.
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Size of the free-list storage.
    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    /// Values built by the factory over the pool's lifetime.
    pub fn created(&self) -> usize {
        self.created
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("free", &self.free.len())
            .field("capacity", &self.free.capacity())
            .field("created", &self.created)
            .finish()
    }
}
