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

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::store::RatingStore;
use crate::types::{ItemId, UserId};
use crate::Estimator;

/// Result type used to find the top-k items per user via a binary heap
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ScoredItem {
    pub item: ItemId,
    pub score: f64,
}

/// Ordering for our max-heap, note that we must use a special implementation here as there is no
/// total order on floating point numbers. Lower scores compare as greater so the heap top is the
/// worst retained item; equal scores fall back to the item id, larger ids being worse.
fn cmp_reverse(scored_item_a: &ScoredItem, scored_item_b: &ScoredItem) -> Ordering {
    match scored_item_a.score.partial_cmp(&scored_item_b.score) {
        Some(Ordering::Less) => Ordering::Greater,
        Some(Ordering::Greater) => Ordering::Less,
        _ => scored_item_a.item.cmp(&scored_item_b.item),
    }
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_reverse(self, other)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(cmp_reverse(self, other))
    }
}

/// Keeps the `k` best of the offered items, returned best first.
pub fn top_k<I>(scored_items: I, k: usize) -> Vec<ScoredItem>
    where I: IntoIterator<Item=ScoredItem> {

    if k == 0 {
        return Vec::new();
    }

    let mut heap = BinaryHeap::with_capacity(k);

    for scored_item in scored_items {
        if heap.len() < k {
            heap.push(scored_item);
        } else if let Some(mut top) = heap.peek_mut() {
            if scored_item < *top {
                *top = scored_item;
            }
        }
    }

    heap.into_sorted_vec()
}

/// `None` if the estimator has no opinion on a pair, either because an id is unknown or because
/// the score is NaN.
pub fn opinion(estimate: Result<f64>) -> Result<Option<f64>> {
    match estimate {
        Ok(score) if !score.is_nan() => Ok(Some(score)),
        Ok(_) => Ok(None),
        Err(ref failure) if failure.is_unknown_id() => Ok(None),
        Err(failure) => Err(failure),
    }
}

/// Recommends the best scored items among all training items a user has not interacted with.
pub struct Recommender<'a> {
    store: &'a RatingStore,
    estimator: &'a dyn Estimator,
}

impl<'a> Recommender<'a> {

    pub fn new(store: &'a RatingStore, estimator: &'a dyn Estimator) -> Self {
        Recommender { store, estimator }
    }

    /// Scores of all training items the user has not interacted with. Candidates without an
    /// opinion (unknown ids) or with a NaN score are skipped, every other estimation failure is
    /// returned.
    pub fn scored_candidates(&self, user: UserId) -> Result<Vec<ScoredItem>> {
        let known_items = self.store.item_ids_from_user(user)?;

        let mut candidates = Vec::with_capacity(self.store.num_items());

        for item in self.store.item_ids().iter() {
            if known_items.contains(item) {
                continue;
            }

            if let Some(score) = opinion(self.estimator.estimate(user, *item))? {
                candidates.push(ScoredItem { item: *item, score });
            }
        }

        Ok(candidates)
    }

    pub fn recommend(&self, user: UserId, how_many: usize) -> Result<Vec<ScoredItem>> {
        let recommended = top_k(self.scored_candidates(user)?, how_many);
        debug!("Recommendations for user {} are {:?}", user, recommended);

        Ok(recommended)
    }
}
