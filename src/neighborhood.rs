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

use crate::aspect::AspectModel;
use crate::cache::ScoreCache;
use crate::error::{RecError, Result};
use crate::recommend::{top_k, ScoredItem};
use crate::store::RatingStore;
use crate::types::{self, ItemId, SparseVector, UserId};
use crate::utils;
use crate::Estimator;

/// Similarity of two users, NaN if they share no items.
pub trait UserSimilarity: Sync {
    fn user_similarity(&self, user_a: UserId, user_b: UserId) -> Result<f64>;
}

/// Summed item weights of the intersection and the union of two users' items, found by merging
/// their item-sorted preference lists.
fn weighted_overlap<W>(store: &RatingStore, user_a: UserId, user_b: UserId, weight: W)
    -> Result<(f64, f64)>
    where W: Fn(ItemId) -> f64 {

    let preferences_a = store.preferences_from_user(user_a)?;
    let preferences_b = store.preferences_from_user(user_b)?;

    let mut intersection = 0.0;
    let mut union = 0.0;
    let (mut a, mut b) = (0, 0);

    while a < preferences_a.len() || b < preferences_b.len() {
        let item_a = preferences_a.get(a).map(|preference| preference.item);
        let item_b = preferences_b.get(b).map(|preference| preference.item);

        match (item_a, item_b) {
            (Some(item_a), Some(item_b)) if item_a == item_b => {
                let shared = weight(item_a);
                intersection += shared;
                union += shared;
                a += 1;
                b += 1;
            },
            (Some(item_a), Some(item_b)) if item_a < item_b => {
                union += weight(item_a);
                a += 1;
            },
            (Some(_), Some(item_b)) | (None, Some(item_b)) => {
                union += weight(item_b);
                b += 1;
            },
            (Some(item_a), None) => {
                union += weight(item_a);
                a += 1;
            },
            (None, None) => break,
        }
    }

    Ok((intersection, union))
}

/// Size of the item intersection over the size of the item union.
pub struct TanimotoSimilarity<'a> {
    store: &'a RatingStore,
}

impl<'a> TanimotoSimilarity<'a> {
    pub fn new(store: &'a RatingStore) -> Self {
        TanimotoSimilarity { store }
    }
}

impl<'a> UserSimilarity for TanimotoSimilarity<'a> {

    fn user_similarity(&self, user_a: UserId, user_b: UserId) -> Result<f64> {
        let (intersection, union) = weighted_overlap(self.store, user_a, user_b, |_| 1.0)?;

        if intersection == 0.0 {
            Ok(std::f64::NAN)
        } else {
            Ok(intersection / union)
        }
    }
}

/// Tanimoto coefficient over inverse user frequency weights `num_users / num_users(item)`, on
/// a log scale: `ln(intersection) / ln(union)`. Rare items count more.
pub struct IdfTanimotoSimilarity<'a> {
    store: &'a RatingStore,
    item_weights: FnvHashMap<ItemId, f64>,
}

impl<'a> IdfTanimotoSimilarity<'a> {

    pub fn new(store: &'a RatingStore) -> Self {
        let num_users = store.num_users() as f64;

        let mut item_weights = types::new_id_map(store.num_items());
        for item in store.item_ids().iter() {
            let num_users_for_item = store.num_users_with_preference_for(*item) as f64;
            item_weights.insert(*item, num_users / num_users_for_item);
        }

        IdfTanimotoSimilarity { store, item_weights }
    }

    fn weight(&self, item: ItemId) -> f64 {
        self.item_weights.get(&item).cloned().unwrap_or(0.0)
    }
}

impl<'a> UserSimilarity for IdfTanimotoSimilarity<'a> {

    fn user_similarity(&self, user_a: UserId, user_b: UserId) -> Result<f64> {
        let (intersection, union) =
            weighted_overlap(self.store, user_a, user_b, |item| self.weight(item))?;

        if intersection == 0.0 {
            Ok(std::f64::NAN)
        } else if intersection >= union {
            Ok(1.0)
        } else {
            Ok(intersection.ln() / union.ln())
        }
    }
}

/// Tanimoto coefficient where every item is weighted by the entropy of its latent factor
/// distribution `p(z | item)` under an aspect model.
pub struct EntropyTanimotoSimilarity<'a> {
    store: &'a RatingStore,
    item_weights: FnvHashMap<ItemId, f64>,
}

impl<'a> EntropyTanimotoSimilarity<'a> {

    pub fn new(store: &'a RatingStore, aspect_model: &AspectModel) -> Self {
        let prior = aspect_model.prior();
        let mut distribution = vec![0.0; aspect_model.num_factors()];

        let mut item_weights = types::new_id_map(store.num_items());
        for item in store.item_ids().iter() {
            for (factor, probability) in distribution.iter_mut().enumerate() {
                *probability = aspect_model.item_given_factor(factor, *item).unwrap_or(0.0)
                    * prior[factor];
            }
            item_weights.insert(*item, entropy(&distribution));
        }

        EntropyTanimotoSimilarity { store, item_weights }
    }

    fn weight(&self, item: ItemId) -> f64 {
        self.item_weights.get(&item).cloned().unwrap_or(0.0)
    }
}

impl<'a> UserSimilarity for EntropyTanimotoSimilarity<'a> {

    fn user_similarity(&self, user_a: UserId, user_b: UserId) -> Result<f64> {
        let (intersection, union) =
            weighted_overlap(self.store, user_a, user_b, |item| self.weight(item))?;

        if intersection <= 0.0 {
            Ok(std::f64::NAN)
        } else {
            Ok(intersection / union)
        }
    }
}

/// Shannon entropy of the normalized distribution, zero probabilities contribute as the smallest
/// positive double.
fn entropy(distribution: &[f64]) -> f64 {
    let sum: f64 = distribution.iter().sum();

    if sum <= 0.0 {
        return 0.0;
    }

    distribution.iter()
        .map(|mass| {
            let probability = if *mass > 0.0 { mass / sum } else { std::f64::MIN_POSITIVE };
            -probability * probability.ln()
        })
        .sum()
}

/// User-based collaborative filtering: a user's estimate for an item is the similarity-weighted
/// average of the values the nearest users gave it. Estimates backed by fewer than two neighbors
/// are NaN.
pub struct UserNeighborhoodModel<'a, S: UserSimilarity> {
    store: &'a RatingStore,
    similarity: S,
    num_neighbors: usize,
    score_cache: ScoreCache,
}

impl<'a, S: UserSimilarity> UserNeighborhoodModel<'a, S> {

    pub fn new(store: &'a RatingStore, similarity: S, num_neighbors: usize) -> Result<Self> {
        if num_neighbors == 0 {
            return Err(RecError::InvalidParameter(
                String::from("number of neighbors must be at least 1")));
        }

        Ok(UserNeighborhoodModel {
            store,
            similarity,
            num_neighbors,
            score_cache: ScoreCache::new(),
        })
    }

    /// The most similar other users, as scored user ids. Users with a NaN similarity are never
    /// neighbors.
    pub fn neighbors(&self, user: UserId) -> Result<Vec<ScoredItem>> {
        self.store.preferences_from_user(user)?;

        let mut candidates = Vec::with_capacity(self.store.num_users());

        for other in self.store.user_ids().iter().filter(|other| **other != user) {
            let similarity = self.similarity.user_similarity(user, *other)?;
            if !similarity.is_nan() {
                candidates.push(ScoredItem { item: *other, score: similarity });
            }
        }

        let neighbors = top_k(candidates, self.num_neighbors);
        debug!("Neighbors of user {} are {:?}", user, neighbors);

        Ok(neighbors)
    }

    /// Estimates for every item the neighbors interacted with and the user did not.
    pub fn scores_for(&self, user: UserId) -> Result<Arc<SparseVector>> {
        self.score_cache.get_or_compute(user, || {
            let compute_start = Instant::now();
            let known_items = self.store.item_ids_from_user(user)?;

            // item -> (weighted value sum, similarity sum, number of neighbors)
            let mut sums: FnvHashMap<ItemId, (f64, f64, usize)> = types::new_id_map(100);

            for neighbor in self.neighbors(user)?.iter() {
                for preference in self.store.preferences_from_user(neighbor.item)?.iter() {
                    if known_items.contains(&preference.item) {
                        continue;
                    }

                    let entry = sums.entry(preference.item).or_insert((0.0, 0.0, 0));
                    entry.0 += neighbor.score * preference.value;
                    entry.1 += neighbor.score;
                    entry.2 += 1;
                }
            }

            let mut scores = SparseVector::with_capacity(sums.len());
            for (item, (weighted_sum, similarity_sum, count)) in sums.into_iter() {
                if count > 1 && similarity_sum > 0.0 {
                    scores.insert(item, weighted_sum / similarity_sum);
                }
            }

            debug!("Estimated {} items for user {} in {}ms", scores.len(), user,
                utils::to_millis(compute_start.elapsed()));

            Ok(scores)
        })
    }
}

impl<'a, S: UserSimilarity> Estimator for UserNeighborhoodModel<'a, S> {

    fn estimate(&self, user: UserId, item: ItemId) -> Result<f64> {
        if !self.store.contains_user(user) {
            return Err(RecError::UnknownUser(user));
        }

        if !self.store.contains_item(item) {
            return Err(RecError::UnknownItem(item));
        }

        if let Ok(value) = self.store.preference_value(user, item) {
            return Ok(value);
        }

        let scores = self.scores_for(user)?;
        Ok(scores.lookup(item).unwrap_or(std::f64::NAN))
    }
}
