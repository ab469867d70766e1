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

use fnv::{FnvHashMap, FnvHashSet};

pub type UserId = u64;
pub type ItemId = u64;

pub type IdSet = FnvHashSet<u64>;

/// A single observed (user, item, value) triple.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Preference {
    pub user: UserId,
    pub item: ItemId,
    pub value: f64,
}

impl Preference {
    pub fn new(user: UserId, item: ItemId, value: f64) -> Self {
        Preference { user, item, value }
    }
}

pub fn new_id_set(capacity: usize) -> IdSet {
    FnvHashSet::with_capacity_and_hasher(capacity, Default::default())
}

pub fn new_id_map<V>(capacity: usize) -> FnvHashMap<u64, V> {
    FnvHashMap::with_capacity_and_hasher(capacity, Default::default())
}

/// Sparse column vector keyed by item. Missing entries read as zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseVector {
    entries: FnvHashMap<ItemId, f64>,
}

impl SparseVector {

    pub fn new() -> Self {
        SparseVector { entries: new_id_map(10) }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SparseVector { entries: new_id_map(capacity) }
    }

    pub fn get(&self, item: ItemId) -> f64 {
        self.entries.get(&item).cloned().unwrap_or(0.0)
    }

    pub fn lookup(&self, item: ItemId) -> Option<f64> {
        self.entries.get(&item).cloned()
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.entries.contains_key(&item)
    }

    pub fn insert(&mut self, item: ItemId, value: f64) {
        self.entries.insert(item, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item=(&ItemId, &f64)> {
        self.entries.iter()
    }

    pub fn sum(&self) -> f64 {
        self.entries.values().sum()
    }

    /// In place elementwise addition.
    pub fn add_assign(&mut self, other: &SparseVector) -> &mut Self {
        for (item, value) in other.entries.iter() {
            *self.entries.entry(*item).or_insert(0.0) += *value;
        }
        self
    }

    /// In place multiplication by a scalar.
    pub fn scale(&mut self, factor: f64) -> &mut Self {
        for value in self.entries.values_mut() {
            *value *= factor;
        }
        self
    }
}

impl From<FnvHashMap<ItemId, f64>> for SparseVector {
    fn from(entries: FnvHashMap<ItemId, f64>) -> Self {
        SparseVector { entries }
    }
}
