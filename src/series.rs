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

use fnv::FnvHashMap;
use scoped_pool::Pool;

use crate::aspect::AspectModel;
use crate::deadline::{self, DeadlineModel};
use crate::error::{RecError, Result};
use crate::metadata::{MetaData, SeriesId};
use crate::popularity::PopularityModel;
use crate::store::RatingStore;
use crate::types::{self, ItemId, Preference, UserId};
use crate::Estimator;

/// Series of items missing from the metadata.
pub const DEFAULT_SERIES: SeriesId = 0;
/// Deadline assumed for items missing from the metadata (2009-12-22).
pub const DEFAULT_TIME: i64 = 1_261_440_000;

/// Replaces every item by its series, with an implicit value of 1 per (user, series) pair.
pub fn series_store(store: &RatingStore, metadata: &MetaData) -> Result<RatingStore> {
    let mut preferences = Vec::with_capacity(store.num_preferences());

    for user in store.user_ids().iter() {
        for preference in store.preferences_from_user(*user)?.iter() {
            let series = metadata.series_of(preference.item).unwrap_or(DEFAULT_SERIES);
            preferences.push(Preference::new(*user, series, 1.0));
        }
    }

    Ok(RatingStore::from_preferences(preferences))
}

/// Aspect model over item series, optionally weighted by how likely the user is to act around
/// the deadline of the item.
pub struct SeriesDeadlineModel {
    metadata: Arc<MetaData>,
    series_model: AspectModel,
    deadline_model: Option<DeadlineModel>,
}

impl SeriesDeadlineModel {

    pub fn train(
        store: &RatingStore,
        metadata: Arc<MetaData>,
        num_factors: usize,
        seed: Option<u64>,
        with_deadline: bool,
        pool: &Pool,
    ) -> Result<Self> {

        let deadline_model = if with_deadline {
            let time_series = deadline::time_series_from(store, metadata.times())?;
            Some(DeadlineModel::fit(time_series, pool)?)
        } else {
            None
        };

        let series_preferences = series_store(store, &metadata)?;
        info!("Fitting aspect model on {} series", series_preferences.num_items());
        let series_model = AspectModel::train(&series_preferences, num_factors, seed, pool)?;

        Ok(SeriesDeadlineModel { metadata, series_model, deadline_model })
    }

    pub fn deadline_model(&self) -> Option<&DeadlineModel> {
        self.deadline_model.as_ref()
    }
}

impl Estimator for SeriesDeadlineModel {

    fn estimate(&self, user: UserId, item: ItemId) -> Result<f64> {
        let series = self.metadata.series_of(item).unwrap_or(DEFAULT_SERIES);

        let series_score = self.series_model.estimate(user, series)
            .map_err(|failure| match failure {
                RecError::UnknownItem(_) => RecError::UnknownItem(item),
                other => other,
            })?;

        match self.deadline_model {
            Some(ref deadline_model) => {
                let time = self.metadata.time_of(item).unwrap_or(DEFAULT_TIME);
                Ok(deadline_model.density(user, time as f64) * series_score)
            },
            None => Ok(series_score),
        }
    }
}

/// Item popularity times the series and deadline score. With relative popularity, an item's
/// popularity is divided by the average popularity of the items in its series.
pub struct SeriesDeadlinePopularityModel {
    metadata: Arc<MetaData>,
    popularity_model: PopularityModel,
    series_deadline_model: SeriesDeadlineModel,
    series_popularity: Option<FnvHashMap<SeriesId, f64>>,
}

impl SeriesDeadlinePopularityModel {

    pub fn train(
        store: &RatingStore,
        metadata: Arc<MetaData>,
        num_factors: usize,
        seed: Option<u64>,
        relative: bool,
        pool: &Pool,
    ) -> Result<Self> {

        let popularity_model = PopularityModel::build(store);

        let series_popularity = if relative {
            Some(average_series_popularity(store, &metadata, &popularity_model))
        } else {
            None
        };

        let series_deadline_model =
            SeriesDeadlineModel::train(store, metadata.clone(), num_factors, seed, true, pool)?;

        Ok(SeriesDeadlinePopularityModel {
            metadata,
            popularity_model,
            series_deadline_model,
            series_popularity,
        })
    }

    fn popularity(&self, item: ItemId) -> f64 {
        let popularity = self.popularity_model.popularity(item) as f64;

        match self.series_popularity {
            Some(ref series_popularity) => {
                let series = self.metadata.series_of(item).unwrap_or(DEFAULT_SERIES);
                let average = series_popularity.get(&series).cloned().unwrap_or(0.0);

                if average > 0.0 { popularity / average } else { 0.0 }
            },
            None => popularity,
        }
    }
}

/// Average popularity per series over every item known from the metadata or the ratings.
fn average_series_popularity(
    store: &RatingStore,
    metadata: &MetaData,
    popularity_model: &PopularityModel,
) -> FnvHashMap<SeriesId, f64> {

    let mut items = types::new_id_set(metadata.len() + store.num_items());
    items.extend(metadata.series().keys());
    items.extend(store.item_ids().iter());

    let mut totals: FnvHashMap<SeriesId, (usize, usize)> = types::new_id_map(100);
    for item in items.into_iter() {
        let series = metadata.series_of(item).unwrap_or(DEFAULT_SERIES);
        let total = totals.entry(series).or_insert((0, 0));
        total.0 += popularity_model.popularity(item);
        total.1 += 1;
    }

    totals.into_iter()
        .map(|(series, (popularity, num_items))| (series, popularity as f64 / num_items as f64))
        .collect()
}

impl Estimator for SeriesDeadlinePopularityModel {

    fn estimate(&self, user: UserId, item: ItemId) -> Result<f64> {
        let series_deadline = self.series_deadline_model.estimate(user, item)?;

        Ok(self.popularity(item) * series_deadline)
    }
}

/// Scores an item by how many of the user's items belong to the same series.
pub struct SeriesOverlapModel<'a> {
    store: &'a RatingStore,
    metadata: Arc<MetaData>,
}

impl<'a> SeriesOverlapModel<'a> {
    pub fn new(store: &'a RatingStore, metadata: Arc<MetaData>) -> Self {
        SeriesOverlapModel { store, metadata }
    }
}

impl<'a> Estimator for SeriesOverlapModel<'a> {

    fn estimate(&self, user: UserId, item: ItemId) -> Result<f64> {
        let series = self.metadata.series_of(item).unwrap_or(DEFAULT_SERIES);

        let overlap = self.store.preferences_from_user(user)?.iter()
            .filter(|preference| {
                self.metadata.series_of(preference.item).unwrap_or(DEFAULT_SERIES) == series
            })
            .count();

        Ok(overlap as f64)
    }
}


#[cfg(test)]
mod tests {

    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use scoped_pool::Pool;

    use super::{series_store, SeriesDeadlineModel, SeriesDeadlinePopularityModel,
        SeriesOverlapModel, DEFAULT_SERIES};
    use crate::metadata::MetaData;
    use crate::store::RatingStore;
    use crate::types::Preference;
    use crate::Estimator;

    const YEAR: i64 = 365 * 24 * 3600;
    const START: i64 = 1_230_768_000;

    fn metadata() -> MetaData {
        let mut metadata = MetaData::new();
        metadata.insert(1, 100, START, "ICDE 2009");
        metadata.insert(2, 100, START + YEAR, "ICDE 2010");
        metadata.insert(3, 100, START + 2 * YEAR, "ICDE 2011");
        metadata.insert(4, 200, START + 30, "KDD 2009");
        metadata.insert(5, 200, START + YEAR + 30, "KDD 2010");
        metadata.insert(6, 300, START + 100, "WWW 2009");
        metadata
    }

    fn store() -> RatingStore {
        RatingStore::from_preferences(vec![
            Preference::new(1, 1, 1.0),
            Preference::new(1, 2, 1.0),
            Preference::new(1, 4, 1.0),
            Preference::new(2, 1, 1.0),
            Preference::new(2, 5, 1.0),
            Preference::new(2, 6, 1.0),
            Preference::new(3, 4, 1.0),
            Preference::new(3, 6, 1.0),
            Preference::new(3, 7, 1.0),
        ])
    }

    #[test]
    fn items_collapse_into_their_series() {
        let series = series_store(&store(), &metadata()).unwrap();

        assert_eq!(series.item_ids(), &[DEFAULT_SERIES, 100, 200, 300]);
        assert_eq!(series.preference_value(1, 100).unwrap(), 1.0);
        assert_eq!(series.preferences_from_user(1).unwrap().len(), 2);
        assert_eq!(series.preference_value(3, DEFAULT_SERIES).unwrap(), 1.0);
    }

    #[test]
    fn items_of_one_series_differ_only_by_deadline() {
        let store = store();
        let pool = Pool::new(2);
        let model = SeriesDeadlineModel::train(&store, Arc::new(metadata()), 2, Some(3), true, &pool)
            .unwrap();

        let deadline_model = model.deadline_model().unwrap();

        let score_2 = model.estimate(3, 2).unwrap();
        let score_3 = model.estimate(3, 3).unwrap();

        let density_2 = deadline_model.density(3, (START + YEAR) as f64);
        let density_3 = deadline_model.density(3, (START + 2 * YEAR) as f64);

        assert_abs_diff_eq!(score_2 * density_3, score_3 * density_2, epsilon = 1e-12);
        assert!(score_2 >= 0.0);

        assert!(model.estimate(42, 2).unwrap_err().is_unknown_id());
    }

    #[test]
    fn without_deadline_items_of_one_series_score_the_same() {
        let store = store();
        let pool = Pool::new(2);
        let model = SeriesDeadlineModel::train(&store, Arc::new(metadata()), 2, Some(3), false, &pool)
            .unwrap();

        assert!(model.deadline_model().is_none());
        assert_eq!(model.estimate(2, 1).unwrap(), model.estimate(2, 3).unwrap());
    }

    #[test]
    fn popularity_scales_the_series_deadline_score() {
        let store = store();
        let pool = Pool::new(2);

        let metadata = Arc::new(metadata());
        let combined = SeriesDeadlinePopularityModel::train(&store, metadata.clone(), 2, Some(9), false,
            &pool).unwrap();
        let series_deadline = SeriesDeadlineModel::train(&store, metadata, 2, Some(9), true, &pool)
            .unwrap();

        assert_abs_diff_eq!(combined.estimate(3, 1).unwrap(),
            2.0 * series_deadline.estimate(3, 1).unwrap(), epsilon = 1e-9);
        assert_eq!(combined.estimate(3, 3).unwrap(), 0.0);
    }

    #[test]
    fn relative_popularity_divides_by_the_series_average() {
        let store = store();
        let pool = Pool::new(2);

        let metadata = Arc::new(metadata());
        let relative = SeriesDeadlinePopularityModel::train(&store, metadata.clone(), 2, Some(9),
            true, &pool).unwrap();
        let series_deadline = SeriesDeadlineModel::train(&store, metadata, 2, Some(9), true, &pool)
            .unwrap();

        // series 100 holds items 1, 2 and 3 with popularity 2, 1 and 0
        assert_abs_diff_eq!(relative.popularity(1), 2.0, epsilon = 1e-12);
        // series 200 holds items 4 and 5 with popularity 2 and 1
        assert_abs_diff_eq!(relative.popularity(4), 2.0 / 1.5, epsilon = 1e-12);
        // item 7 is the only item without metadata
        assert_abs_diff_eq!(relative.popularity(7), 1.0, epsilon = 1e-12);
        assert_eq!(relative.popularity(3), 0.0);

        assert_abs_diff_eq!(relative.estimate(2, 4).unwrap(),
            (2.0 / 1.5) * series_deadline.estimate(2, 4).unwrap(), epsilon = 1e-9);
    }

    #[test]
    fn counts_the_users_items_of_the_same_series() {
        let store = store();
        let model = SeriesOverlapModel::new(&store, Arc::new(metadata()));

        assert_eq!(model.estimate(1, 3).unwrap(), 2.0);
        assert_eq!(model.estimate(1, 5).unwrap(), 1.0);
        assert_eq!(model.estimate(1, 6).unwrap(), 0.0);
        // items without metadata share the default series
        assert_eq!(model.estimate(3, 8).unwrap(), 1.0);

        assert!(model.estimate(42, 1).unwrap_err().is_unknown_id());
    }
}
