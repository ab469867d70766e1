/**
 * CfpRec
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::sync::{Arc, PoisonError, RwLock};

use fnv::FnvHashMap;

use crate::error::Result;
use crate::types::{self, SparseVector, UserId};

/// Memoizes one sparse score vector per user for the lifetime of the owning model. Lookups take
/// a shared lock only; a missing entry is computed outside of any lock and published under the
/// write lock, where the first published vector for a user wins.
pub struct ScoreCache {
    entries: RwLock<FnvHashMap<UserId, Arc<SparseVector>>>,
}

impl ScoreCache {

    pub fn new() -> Self {
        ScoreCache { entries: RwLock::new(types::new_id_map(10)) }
    }

    pub fn get(&self, user: UserId) -> Option<Arc<SparseVector>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&user).cloned()
    }

    pub fn get_or_compute<F>(&self, user: UserId, compute: F) -> Result<Arc<SparseVector>>
        where F: FnOnce() -> Result<SparseVector> {

        if let Some(cached) = self.get(user) {
            return Ok(cached);
        }

        let computed = Arc::new(compute()?);

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.entry(user).or_insert(computed).clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ScoreCache {
    fn default() -> Self {
        ScoreCache::new()
    }
}
