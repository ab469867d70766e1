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

use std::sync::Arc;
use std::time::Instant;

use fnv::FnvHashMap;

use crate::cache::ScoreCache;
use crate::error::{RecError, Result};
use crate::store::RatingStore;
use crate::types::{self, ItemId, SparseVector, UserId};
use crate::utils;
use crate::Estimator;

const ALPHA: f64 = 0.9;
const WALK_STEPS: usize = 6;

/// Item-item co-occurrence counts. A row holds the counts of the items reachable from its item,
/// and `col_sums` always equals the sum of the row.
pub struct TransitionMatrix {
    rows: FnvHashMap<ItemId, FnvHashMap<ItemId, u64>>,
    col_sums: FnvHashMap<ItemId, u64>,
}

impl TransitionMatrix {

    pub fn new() -> Self {
        TransitionMatrix {
            rows: types::new_id_map(10),
            col_sums: types::new_id_map(10),
        }
    }

    /// Zero counts are ignored.
    pub fn put(&mut self, row: ItemId, column: ItemId, value: u64) {
        if value == 0 {
            return;
        }

        let entries = self.rows.entry(row).or_insert_with(|| types::new_id_map(10));
        let old_value = entries.insert(column, value).unwrap_or(0);

        let col_sum = self.col_sums.entry(row).or_insert(0);
        *col_sum = *col_sum + value - old_value;
    }

    pub fn get(&self, row: ItemId, column: ItemId) -> u64 {
        self.rows.get(&row)
            .and_then(|entries| entries.get(&column))
            .cloned()
            .unwrap_or(0)
    }

    pub fn col_sum(&self, row: ItemId) -> u64 {
        self.col_sums.get(&row).cloned().unwrap_or(0)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn normalized(&self, row: ItemId, column: ItemId) -> Result<f64> {
        let value = self.get(row, column);
        let col_sum = self.col_sum(row);

        if col_sum > 0 {
            Ok(value as f64 / col_sum as f64)
        } else if value == 0 {
            Ok(0.0)
        } else {
            Err(RecError::Inconsistent(format!(
                "column sum of item {} is 0, but its entry for item {} is {}", row, column, value)))
        }
    }

    /// Sparse product with the column-normalized transition weights.
    pub fn mul(&self, vector: &SparseVector) -> Result<SparseVector> {
        let mut product = SparseVector::with_capacity(vector.len());

        for (row, value) in vector.iter() {
            if let Some(entries) = self.rows.get(row) {
                let col_sum = self.col_sum(*row);

                if col_sum == 0 {
                    return Err(RecError::Inconsistent(format!(
                        "column sum of item {} is 0 with {} non-zero entries", row, entries.len())));
                }

                let mut contributions = SparseVector::with_capacity(entries.len());
                for (column, count) in entries.iter() {
                    contributions.insert(*column, (*count as f64 / col_sum as f64) * *value);
                }
                product.add_assign(&contributions);
            }
        }

        Ok(product)
    }

    /// Counts, for every ordered pair of items (including an item with itself), the users who
    /// interacted with both.
    pub fn from_store(store: &RatingStore) -> Result<Self> {
        let mut counts: FnvHashMap<(ItemId, ItemId), u64> = FnvHashMap::default();

        for user in store.user_ids().iter() {
            let preferences = store.preferences_from_user(*user)?;
            for preference_a in preferences.iter() {
                for preference_b in preferences.iter() {
                    *counts.entry((preference_a.item, preference_b.item)).or_insert(0) += 1;
                }
            }
        }

        let mut matrix = TransitionMatrix::new();
        for ((row, column), count) in counts.into_iter() {
            matrix.put(row, column, count);
        }

        Ok(matrix)
    }
}

impl Default for TransitionMatrix {
    fn default() -> Self {
        TransitionMatrix::new()
    }
}

/// Personalized PageRank over the item co-occurrence graph: restart mass comes from the user's
/// own preferences, optionally re-weighted per item.
pub struct PageRankModel<'a> {
    store: &'a RatingStore,
    transitions: TransitionMatrix,
    uniform: Arc<SparseVector>,
    reweight: Option<SparseVector>,
    restart_cache: ScoreCache,
    rank_cache: ScoreCache,
}

impl<'a> PageRankModel<'a> {

    pub fn build(store: &'a RatingStore) -> Result<Self> {
        let build_start = Instant::now();

        let transitions = TransitionMatrix::from_store(store)?;

        let mut uniform = SparseVector::with_capacity(store.num_items());
        let probability = 1.0 / store.num_items() as f64;
        for item in store.item_ids().iter() {
            uniform.insert(*item, probability);
        }

        info!("Built transition matrix over {} items in {}ms",
            transitions.num_rows(), utils::to_millis(build_start.elapsed()));

        Ok(PageRankModel {
            store,
            transitions,
            uniform: Arc::new(uniform),
            reweight: None,
            restart_cache: ScoreCache::new(),
            rank_cache: ScoreCache::new(),
        })
    }

    /// Multiplies every preference value with the weight of its item before normalization. Items
    /// without a weight lose their restart mass.
    pub fn with_reweighting(store: &'a RatingStore, reweight: SparseVector) -> Result<Self> {
        let mut model = PageRankModel::build(store)?;
        model.reweight = Some(reweight);
        Ok(model)
    }

    /// The user's normalized restart distribution, `None` if the (re-weighted) preference values
    /// do not sum to a positive value.
    pub fn personalized_restart(&self, user: UserId) -> Result<Option<Arc<SparseVector>>> {
        if let Some(restart) = self.restart_cache.get(user) {
            return Ok(Some(restart));
        }

        let preferences = self.store.preferences_from_user(user)?;

        let mut restart = SparseVector::with_capacity(preferences.len());
        let mut preference_sum = 0.0;

        for preference in preferences.iter() {
            let value = match self.reweight {
                Some(ref reweight) => preference.value * reweight.get(preference.item),
                None => preference.value,
            };
            restart.insert(preference.item, value);
            preference_sum += value;
        }

        if preference_sum <= 0.0 {
            return Ok(None);
        }

        restart.scale(1.0 / preference_sum);

        self.restart_cache.get_or_compute(user, move || Ok(restart)).map(Some)
    }

    /// `WALK_STEPS` damped transitions starting from the restart distribution.
    pub fn random_walk(&self, restart: &SparseVector) -> Result<SparseVector> {
        let mut rank = restart.clone();
        for _ in 0..WALK_STEPS {
            rank = self.walk(&rank, restart)?;
        }
        Ok(rank)
    }

    /// rank' = (1 - a) * ((a / (1 - a)) * T rank + restart)
    fn walk(&self, rank: &SparseVector, restart: &SparseVector) -> Result<SparseVector> {
        let mut next_rank = self.transitions.mul(rank)?;
        next_rank
            .scale(ALPHA / (1.0 - ALPHA))
            .add_assign(restart)
            .scale(1.0 - ALPHA);
        Ok(next_rank)
    }

    pub fn ranks_for(&self, user: UserId) -> Result<Arc<SparseVector>> {
        self.rank_cache.get_or_compute(user, || {
            let restart = match self.personalized_restart(user)? {
                Some(restart) => restart,
                None => {
                    debug!("No personalization available for user {}, using uniform restart", user);
                    Arc::clone(&self.uniform)
                }
            };
            self.random_walk(&restart)
        })
    }
}

impl<'a> Estimator for PageRankModel<'a> {

    fn estimate(&self, user: UserId, item: ItemId) -> Result<f64> {
        let ranks = self.ranks_for(user)?;
        Ok(ranks.get(item))
    }
}
