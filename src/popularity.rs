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

use fnv::FnvHashMap;

use crate::error::Result;
use crate::store::RatingStore;
use crate::types::{self, ItemId, UserId};
use crate::Estimator;

/// Scores every item by the number of users who interacted with it, the same for every user.
pub struct PopularityModel {
    popularity: FnvHashMap<ItemId, usize>,
}

impl PopularityModel {

    pub fn build(store: &RatingStore) -> Self {
        let mut popularity = types::new_id_map(store.num_items());

        for item in store.item_ids().iter() {
            popularity.insert(*item, store.num_users_with_preference_for(*item));
        }

        PopularityModel { popularity }
    }

    pub fn popularity(&self, item: ItemId) -> usize {
        self.popularity.get(&item).cloned().unwrap_or(0)
    }
}

impl Estimator for PopularityModel {

    fn estimate(&self, _user: UserId, item: ItemId) -> Result<f64> {
        Ok(self.popularity(item) as f64)
    }
}
