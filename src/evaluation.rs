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
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

use scoped_pool::Pool;

use crate::error::{RecError, Result};
use crate::io;
use crate::recommend::{self, top_k, Recommender, ScoredItem};
use crate::stats::RunningAverage;
use crate::store::RatingStore;
use crate::types::{self, IdSet, ItemId, Preference, UserId};
use crate::utils;
use crate::{Estimator, EstimatorBuilder};

/// Ranking quality of a model, averaged over users and folds. Every value is NaN or lies in
/// [0, 1], except rNDCG which drops below 0 when negative ratings are ranked high.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IrStatistics {
    pub precision: f64,
    pub r_precision: f64,
    pub recall: f64,
    pub fall_out: f64,
    pub ndcg: f64,
    pub rndcg: f64,
    pub reach: f64,
    pub macro_doa: f64,
    pub micro_doa: f64,
    pub macro_inner_doa: f64,
    pub micro_inner_doa: f64,
}

impl IrStatistics {

    /// Fails with `InvalidStatistic` for the first value that is neither NaN nor in its range,
    /// [-1, 1] for rNDCG and [0, 1] for everything else.
    pub fn validated(self) -> Result<Self> {
        let values = [
            ("precision", self.precision, 0.0),
            ("R-precision", self.r_precision, 0.0),
            ("recall", self.recall, 0.0),
            ("fall-out", self.fall_out, 0.0),
            ("nDCG", self.ndcg, 0.0),
            ("rNDCG", self.rndcg, -1.0),
            ("reach", self.reach, 0.0),
            ("macro DOA", self.macro_doa, 0.0),
            ("micro DOA", self.micro_doa, 0.0),
            ("macro inner DOA", self.macro_inner_doa, 0.0),
            ("micro inner DOA", self.micro_inner_doa, 0.0),
        ];

        for (name, value, lower_bound) in values.iter() {
            if !value.is_nan() && (*value < *lower_bound || *value > 1.0) {
                return Err(RecError::InvalidStatistic { name: *name, value: *value });
            }
        }

        Ok(self)
    }

    pub fn f1_measure(&self) -> f64 {
        self.fn_measure(1.0)
    }

    /// Weighted harmonic mean of precision and recall, recall counting `beta` times as much.
    pub fn fn_measure(&self, beta: f64) -> f64 {
        let beta_square = beta * beta;
        let denominator = beta_square * self.precision + self.recall;

        if denominator == 0.0 {
            0.0
        } else {
            (1.0 + beta_square) * self.precision * self.recall / denominator
        }
    }

    /// Labelled values in report order.
    pub fn report(&self) -> [(&'static str, f64); 12] {
        [
            ("Precision", self.precision),
            ("RPrecision", self.r_precision),
            ("Recall", self.recall),
            ("F1", self.f1_measure()),
            ("FallOut", self.fall_out),
            ("Reach", self.reach),
            ("macroDOA", self.macro_doa),
            ("microDOA", self.micro_doa),
            ("macroInnerDOA", self.macro_inner_doa),
            ("microInnerDOA", self.micro_inner_doa),
            ("NDCG", self.ndcg),
            ("rNDCG", self.rndcg),
        ]
    }
}

impl fmt::Display for IrStatistics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Precision/R-Precision/recall/fall-out/nDCG/rNDCG/reach/macroDOA/microDOA/\
            macroInnerDOA/microInnerDOA: {} / {} / {} / {} / {} / {} / {} / {} / {} / {} / {}",
            self.precision, self.r_precision, self.recall, self.fall_out, self.ndcg, self.rndcg,
            self.reach, self.macro_doa, self.micro_doa, self.macro_inner_doa, self.micro_inner_doa)
    }
}

/// Agreeing and total number of ordered item pairs.
#[derive(Clone, Copy, Debug, PartialEq)]
struct PairCounts {
    agreeing: u64,
    total: u64,
}

impl PairCounts {
    fn ratio(&self) -> f64 {
        self.agreeing as f64 / self.total as f64
    }
}

/// Metrics of a single test user.
#[derive(Clone, Debug, PartialEq)]
struct UserEvaluation {
    has_recommendations: bool,
    precision: f64,
    recall: f64,
    r_precision: f64,
    fall_out: f64,
    ndcg: f64,
    rndcg: f64,
    doa: Option<PairCounts>,
    inner_doa: Option<PairCounts>,
}

/// Per-fold running averages, merged on the driving thread after all user tasks finished.
#[derive(Default)]
struct FoldAccumulator {
    precision: RunningAverage,
    r_precision: RunningAverage,
    recall: RunningAverage,
    fall_out: RunningAverage,
    ndcg: RunningAverage,
    rndcg: RunningAverage,
    macro_doa: RunningAverage,
    micro_doa_agreeing: RunningAverage,
    micro_doa_total: RunningAverage,
    macro_inner_doa: RunningAverage,
    micro_inner_doa_agreeing: RunningAverage,
    micro_inner_doa_total: RunningAverage,
    num_evaluated: usize,
    num_with_recommendations: usize,
}

impl FoldAccumulator {

    fn add(&mut self, evaluation: &UserEvaluation) {
        self.num_evaluated += 1;
        if evaluation.has_recommendations {
            self.num_with_recommendations += 1;
        }

        self.precision.add_datum(evaluation.precision);
        self.r_precision.add_datum(evaluation.r_precision);
        self.recall.add_datum(evaluation.recall);
        self.fall_out.add_datum(evaluation.fall_out);
        self.ndcg.add_datum(evaluation.ndcg);
        self.rndcg.add_datum(evaluation.rndcg);

        if let Some(doa) = evaluation.doa {
            self.macro_doa.add_datum(doa.ratio());
            self.micro_doa_agreeing.add_datum(doa.agreeing as f64);
            self.micro_doa_total.add_datum(doa.total as f64);
        }

        if let Some(inner_doa) = evaluation.inner_doa {
            self.macro_inner_doa.add_datum(inner_doa.ratio());
            self.micro_inner_doa_agreeing.add_datum(inner_doa.agreeing as f64);
            self.micro_inner_doa_total.add_datum(inner_doa.total as f64);
        }
    }

    fn statistics(&self) -> Result<IrStatistics> {
        IrStatistics {
            precision: self.precision.average(),
            r_precision: self.r_precision.average(),
            recall: self.recall.average(),
            fall_out: self.fall_out.average(),
            ndcg: self.ndcg.average(),
            rndcg: self.rndcg.average(),
            reach: self.num_with_recommendations as f64 / self.num_evaluated as f64,
            macro_doa: self.macro_doa.average(),
            micro_doa: self.micro_doa_agreeing.sum() / self.micro_doa_total.sum(),
            macro_inner_doa: self.macro_inner_doa.average(),
            micro_inner_doa:
                self.micro_inner_doa_agreeing.sum() / self.micro_inner_doa_total.sum(),
        }.validated()
    }
}

/// Simple average of the per-fold averages.
#[derive(Default)]
struct CrossFoldAccumulator {
    precision: RunningAverage,
    r_precision: RunningAverage,
    recall: RunningAverage,
    fall_out: RunningAverage,
    ndcg: RunningAverage,
    rndcg: RunningAverage,
    reach: RunningAverage,
    macro_doa: RunningAverage,
    micro_doa: RunningAverage,
    macro_inner_doa: RunningAverage,
    micro_inner_doa: RunningAverage,
}

impl CrossFoldAccumulator {

    fn add(&mut self, statistics: &IrStatistics) {
        self.precision.add_datum(statistics.precision);
        self.r_precision.add_datum(statistics.r_precision);
        self.recall.add_datum(statistics.recall);
        self.fall_out.add_datum(statistics.fall_out);
        self.ndcg.add_datum(statistics.ndcg);
        self.rndcg.add_datum(statistics.rndcg);
        self.reach.add_datum(statistics.reach);
        self.macro_doa.add_datum(statistics.macro_doa);
        self.micro_doa.add_datum(statistics.micro_doa);
        self.macro_inner_doa.add_datum(statistics.macro_inner_doa);
        self.micro_inner_doa.add_datum(statistics.micro_inner_doa);
    }

    fn statistics(&self) -> Result<IrStatistics> {
        IrStatistics {
            precision: self.precision.average(),
            r_precision: self.r_precision.average(),
            recall: self.recall.average(),
            fall_out: self.fall_out.average(),
            ndcg: self.ndcg.average(),
            rndcg: self.rndcg.average(),
            reach: self.reach.average(),
            macro_doa: self.macro_doa.average(),
            micro_doa: self.micro_doa.average(),
            macro_inner_doa: self.macro_inner_doa.average(),
            micro_inner_doa: self.micro_inner_doa.average(),
        }.validated()
    }
}

/// N-fold evaluation of ranking quality. Models are built synchronously per fold, users of a
/// fold are evaluated in parallel on the pool.
pub struct Evaluator<'p> {
    pool: &'p Pool,
}

impl<'p> Evaluator<'p> {

    pub fn new(pool: &'p Pool) -> Self {
        Evaluator { pool }
    }

    /// Builds a model per (training, test) fold and evaluates its top-`at` recommendations
    /// against the held-out preferences. The result is the simple average of the fold averages.
    pub fn evaluate<B>(
        &self,
        builder: &B,
        folds: &[(RatingStore, RatingStore)],
        at: usize,
    ) -> Result<IrStatistics>
        where B: EstimatorBuilder + ?Sized {

        if at < 1 {
            return Err(RecError::InvalidParameter(String::from("at must be at least 1")));
        }

        if folds.is_empty() {
            return Err(RecError::InvalidParameter(String::from("no folds to evaluate")));
        }

        let mut cross_fold = CrossFoldAccumulator::default();

        for (fold, (training, test)) in folds.iter().enumerate() {
            info!("Evaluating fold {}", fold);
            let fold_start = Instant::now();

            let estimator = builder.build(training, self.pool)?;
            let statistics = self.evaluate_fold(estimator.as_ref(), training, test, at)?;

            info!("Evaluated with training/testing set # {} in {}ms", fold,
                utils::to_millis(fold_start.elapsed()));
            info!("{}", statistics);

            cross_fold.add(&statistics);
        }

        let statistics = cross_fold.statistics()?;
        info!("Cross validation {}", statistics);

        Ok(statistics)
    }

    /// Evaluates every test user who has held-out preferences and training preferences, one task
    /// per user. A failure other than an unknown id aborts the whole fold.
    pub fn evaluate_fold(
        &self,
        estimator: &dyn Estimator,
        training: &RatingStore,
        test: &RatingStore,
        at: usize,
    ) -> Result<IrStatistics> {

        let num_items = training.num_items() + test.num_items();

        let evaluations = utils::scatter_gather(self.pool, test.user_ids(), |user| {
            evaluate_user(estimator, training, test, *user, at, num_items)
                .map_err(|failure| RecError::WorkerFailed { user: *user, source: Box::new(failure) })
        });

        let mut accumulator = FoldAccumulator::default();

        for evaluation in evaluations.into_iter() {
            if let Some(evaluation) = evaluation? {
                accumulator.add(&evaluation);
            }
        }

        info!("Evaluated {} users, {} of them received recommendations",
            accumulator.num_evaluated, accumulator.num_with_recommendations);

        accumulator.statistics()
    }

    /// Writes one `user,item,prediction` line for every test user and every item of the fold
    /// the user has not interacted with in training, one output file per fold.
    pub fn predict<B>(
        &self,
        builder: &B,
        folds: &[(RatingStore, RatingStore)],
        output_paths: &[PathBuf],
    ) -> Result<()>
        where B: EstimatorBuilder + ?Sized {

        if folds.len() != output_paths.len() {
            return Err(RecError::InvalidParameter(format!(
                "{} folds but {} output files", folds.len(), output_paths.len())));
        }

        for ((training, test), output_path) in folds.iter().zip(output_paths.iter()) {
            let estimator = builder.build(training, self.pool)?;
            let estimator = estimator.as_ref();

            let mut items: Vec<ItemId> = all_items(training, test).into_iter().collect();
            items.sort();

            let mut predictions = utils::scatter_gather(self.pool, test.user_ids(), |user| {
                predictions_for(estimator, training, *user, &items)
                    .map(|predictions| (*user, predictions))
                    .map_err(|failure| RecError::WorkerFailed {
                        user: *user,
                        source: Box::new(failure),
                    })
            }).into_iter().collect::<Result<Vec<_>>>()?;

            predictions.sort_by_key(|(user, _)| *user);

            info!("Writing predictions to {}", output_path.display());

            let mut out = BufWriter::new(File::create(output_path)?);
            for (_, predictions_of_user) in predictions.iter() {
                io::write_predictions(&mut out, predictions_of_user)?;
            }
        }

        Ok(())
    }
}

fn all_items(training: &RatingStore, test: &RatingStore) -> IdSet {
    let mut items = types::new_id_set(training.num_items() + test.num_items());
    items.extend(training.item_ids().iter());
    items.extend(test.item_ids().iter());
    items
}

fn predictions_for(
    estimator: &dyn Estimator,
    training: &RatingStore,
    user: UserId,
    items: &[ItemId],
) -> Result<Vec<(UserId, ItemId, f64)>> {

    let learned = match training.item_ids_from_user(user) {
        Ok(learned) => learned,
        Err(ref failure) if failure.is_unknown_id() => types::new_id_set(0),
        Err(failure) => return Err(failure),
    };

    let mut predictions = Vec::with_capacity(items.len());

    for item in items.iter().filter(|item| !learned.contains(item)) {
        let prediction = recommend::opinion(estimator.estimate(user, *item))?
            .unwrap_or(std::f64::NAN);
        predictions.push((user, *item, prediction));
    }

    Ok(predictions)
}

/// `None` for users without training or held-out preferences, they are excluded from the fold.
fn evaluate_user(
    estimator: &dyn Estimator,
    training: &RatingStore,
    test: &RatingStore,
    user: UserId,
    at: usize,
    num_items: usize,
) -> Result<Option<UserEvaluation>> {

    let learned = match training.item_ids_from_user(user) {
        Ok(learned) => learned,
        Err(ref failure) if failure.is_unknown_id() => return Ok(None),
        Err(failure) => return Err(failure),
    };

    let held_out = test.preferences_from_user(user)?;
    let num_relevant = held_out.len();

    if num_relevant == 0 || learned.is_empty() {
        return Ok(None);
    }

    let mut relevant = types::new_id_set(num_relevant);
    relevant.extend(held_out.iter().map(|preference| preference.item));

    let candidates = Recommender::new(training, estimator).scored_candidates(user)?;

    let recommended = top_k(candidates.iter().cloned(), at);
    let recommended_at_num_relevant = top_k(candidates.iter().cloned(), num_relevant);

    let intersection_size = count_relevant(&recommended, &relevant);
    let intersection_size_at_num_relevant = count_relevant(&recommended_at_num_relevant, &relevant);

    let precision = if recommended.is_empty() {
        0.0
    } else {
        intersection_size as f64 / recommended.len() as f64
    };

    let recall = intersection_size as f64 / num_relevant as f64;
    let r_precision = intersection_size_at_num_relevant as f64 / num_relevant as f64;

    let fall_out = if num_items > num_relevant {
        (recommended.len() - intersection_size) as f64 / (num_items - num_relevant) as f64
    } else {
        0.0
    };

    let ndcg = normalized_dcg(held_out, &recommended, at, |_| 1.0);
    let rndcg = normalized_dcg(held_out, &recommended, at, |preference| preference.value);

    let mut held_out_scores = Vec::with_capacity(num_relevant);
    for preference in held_out.iter() {
        let score = recommend::opinion(estimator.estimate(user, preference.item))?;
        held_out_scores.push((preference.value, score));
    }

    let unseen: Vec<f64> = candidates.iter()
        .filter(|candidate| !relevant.contains(&candidate.item))
        .map(|candidate| candidate.score)
        .collect();

    let doa = degree_of_agreement(&unseen, &held_out_scores);
    let inner_doa = inner_degree_of_agreement(&held_out_scores);

    debug!("User {}: precision {}, recall {}, R-precision {}, fall-out {}, nDCG {}, rNDCG {}",
        user, precision, recall, r_precision, fall_out, ndcg, rndcg);

    Ok(Some(UserEvaluation {
        has_recommendations: !recommended.is_empty(),
        precision,
        recall,
        r_precision,
        fall_out,
        ndcg,
        rndcg,
        doa,
        inner_doa,
    }))
}

fn count_relevant(recommended: &[ScoredItem], relevant: &IdSet) -> usize {
    recommended.iter()
        .filter(|scored_item| relevant.contains(&scored_item.item))
        .count()
}

#[inline(always)]
fn discount(rank: usize) -> f64 {
    1.0 / (rank as f64 + 2.0).log2()
}

/// Discounted gain of the first `at` recommendations relative to the gain of the ideal ranking,
/// 0 if the ideal gain is 0. The ideal ranking orders the held-out gains by magnitude, so the
/// ratio stays within [-1, 1] for negative gains.
fn normalized_dcg<G>(held_out: &[Preference], recommended: &[ScoredItem], at: usize, gain: G) -> f64
    where G: Fn(&Preference) -> f64 {

    let mut ideal_gains: Vec<f64> = held_out.iter()
        .map(|preference| gain(preference).abs())
        .collect();
    ideal_gains.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    let ideal_gain: f64 = ideal_gains.iter()
        .take(at)
        .enumerate()
        .map(|(rank, gain)| gain * discount(rank))
        .sum();

    let achieved_gain: f64 = recommended.iter()
        .take(at)
        .enumerate()
        .filter_map(|(rank, scored_item)| {
            held_out.iter()
                .find(|preference| preference.item == scored_item.item)
                .map(|preference| gain(preference) * discount(rank))
        })
        .sum();

    if ideal_gain > 0.0 {
        achieved_gain / ideal_gain
    } else {
        0.0
    }
}

/// Pairs of an unseen and a held-out item where the held-out item scores at least as high.
fn degree_of_agreement(unseen: &[f64], held_out: &[(f64, Option<f64>)]) -> Option<PairCounts> {
    let mut counts = PairCounts { agreeing: 0, total: 0 };

    for unseen_score in unseen.iter() {
        for held_out_score in held_out.iter().filter_map(|(_, score)| *score) {
            if *unseen_score <= held_out_score {
                counts.agreeing += 1;
            }
            counts.total += 1;
        }
    }

    if counts.total > 0 { Some(counts) } else { None }
}

/// Ordered pairs of distinct held-out items whose predicted order agrees with the rating order.
fn inner_degree_of_agreement(held_out: &[(f64, Option<f64>)]) -> Option<PairCounts> {
    if held_out.len() < 2 {
        return None;
    }

    let mut counts = PairCounts { agreeing: 0, total: 0 };

    for (index_a, (rating_a, score_a)) in held_out.iter().enumerate() {
        for (index_b, (rating_b, score_b)) in held_out.iter().enumerate() {
            if index_a == index_b {
                continue;
            }

            if let (Some(prediction_a), Some(prediction_b)) = (score_a, score_b) {
                if (rating_a >= rating_b && prediction_a >= prediction_b)
                    || (rating_a <= rating_b && prediction_a <= prediction_b) {
                    counts.agreeing += 1;
                }
                counts.total += 1;
            }
        }
    }

    if counts.total > 0 { Some(counts) } else { None }
}


#[cfg(test)]
mod tests {

    use std::fs;

    use approx::assert_abs_diff_eq;
    use scoped_pool::Pool;
    use tempfile::tempdir;

    use super::{degree_of_agreement, inner_degree_of_agreement, normalized_dcg, Evaluator,
        IrStatistics, PairCounts, CrossFoldAccumulator};
    use crate::error::{RecError, Result};
    use crate::recommend::ScoredItem;
    use crate::store::RatingStore;
    use crate::types::{ItemId, Preference, UserId};
    use crate::{Estimator, EstimatorBuilder};

    /// Scores every item with a fixed value per item, no opinion on items it does not know.
    struct Fixed(Vec<(ItemId, f64)>);

    impl Estimator for Fixed {
        fn estimate(&self, _user: UserId, item: ItemId) -> Result<f64> {
            self.0.iter()
                .find(|(known, _)| *known == item)
                .map(|(_, score)| *score)
                .ok_or(RecError::UnknownItem(item))
        }
    }

    impl EstimatorBuilder for Fixed {
        fn build<'a>(&self, _store: &'a RatingStore, _pool: &Pool)
            -> Result<Box<dyn Estimator + 'a>> {
            Ok(Box::new(Fixed(self.0.clone())))
        }
    }

    /// Fails for every pair.
    struct Broken;

    impl Estimator for Broken {
        fn estimate(&self, _user: UserId, _item: ItemId) -> Result<f64> {
            Err(RecError::Inconsistent(String::from("broken model")))
        }
    }

    impl EstimatorBuilder for Broken {
        fn build<'a>(&self, _store: &'a RatingStore, _pool: &Pool)
            -> Result<Box<dyn Estimator + 'a>> {
            Ok(Box::new(Broken))
        }
    }

    fn training() -> RatingStore {
        RatingStore::from_preferences(vec![
            Preference::new(1, 1, 5.0),
            Preference::new(1, 2, 4.0),
            Preference::new(2, 1, 3.0),
            Preference::new(2, 3, 5.0),
            Preference::new(2, 4, 2.0),
            Preference::new(2, 5, 1.0),
            Preference::new(3, 6, 2.0),
        ])
    }

    fn test() -> RatingStore {
        RatingStore::from_preferences(vec![
            Preference::new(1, 3, 5.0),
            Preference::new(1, 4, 3.0),
            Preference::new(2, 6, 4.0),
            Preference::new(4, 1, 4.0),
        ])
    }

    fn scores() -> Vec<(ItemId, f64)> {
        vec![(1, 0.9), (2, 0.8), (3, 0.7), (4, 0.6), (5, 0.5), (6, 0.4)]
    }

    fn statistics(value: f64) -> IrStatistics {
        IrStatistics {
            precision: value,
            r_precision: value,
            recall: value,
            fall_out: value,
            ndcg: value,
            rndcg: value,
            reach: value,
            macro_doa: value,
            micro_doa: value,
            macro_inner_doa: value,
            micro_inner_doa: value,
        }
    }

    #[test]
    fn statistics_outside_unit_interval_are_rejected() {
        assert!(statistics(0.5).validated().is_ok());
        assert!(statistics(std::f64::NAN).validated().is_ok());

        let mut invalid = statistics(0.5);
        invalid.fall_out = 1.5;

        match invalid.validated() {
            Err(RecError::InvalidStatistic { name, value }) => {
                assert_eq!(name, "fall-out");
                assert_eq!(value, 1.5);
            },
            _ => panic!("expected an invalid statistic"),
        }
    }

    #[test]
    fn f_measures() {
        let mut values = statistics(0.0);
        assert_eq!(values.f1_measure(), 0.0);

        values.precision = 0.5;
        values.recall = 0.25;
        assert_abs_diff_eq!(values.f1_measure(), 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values.fn_measure(2.0), 5.0 * 0.125 / 2.25, epsilon = 1e-12);
    }

    #[test]
    fn report_follows_fixed_order() {
        let labels: Vec<&str> = statistics(0.5).report().iter().map(|(label, _)| *label).collect();

        assert_eq!(labels, vec!["Precision", "RPrecision", "Recall", "F1", "FallOut", "Reach",
            "macroDOA", "microDOA", "macroInnerDOA", "microInnerDOA", "NDCG", "rNDCG"]);
    }

    #[test]
    fn folds_average_to_the_mean_of_fold_averages() {
        let mut cross_fold = CrossFoldAccumulator::default();
        cross_fold.add(&statistics(0.4));
        cross_fold.add(&statistics(0.6));

        let averaged = cross_fold.statistics().unwrap();
        assert_eq!(averaged.precision, 0.5);
        assert_eq!(averaged.micro_inner_doa, 0.5);
    }

    fn held_out(values: &[(ItemId, f64)]) -> Vec<Preference> {
        values.iter().map(|(item, value)| Preference::new(1, *item, *value)).collect()
    }

    fn ranked(items: &[ItemId]) -> Vec<ScoredItem> {
        items.iter().enumerate()
            .map(|(rank, item)| ScoredItem { item: *item, score: 1.0 / (rank as f64 + 1.0) })
            .collect()
    }

    #[test]
    fn ndcg_of_true_ranking_is_one() {
        let held_out = held_out(&[(3, 5.0), (7, 4.0), (9, 1.0)]);
        let recommended = ranked(&[3, 7, 9]);

        assert_abs_diff_eq!(normalized_dcg(&held_out, &recommended, 3, |_| 1.0), 1.0,
            epsilon = 1e-12);
        assert_abs_diff_eq!(normalized_dcg(&held_out, &recommended, 3, |p| p.value), 1.0,
            epsilon = 1e-12);
    }

    #[test]
    fn ndcg_of_unrelated_items_is_zero() {
        let held_out = held_out(&[(3, 5.0), (7, 4.0)]);
        let recommended = ranked(&[1, 2, 4]);

        assert_eq!(normalized_dcg(&held_out, &recommended, 3, |_| 1.0), 0.0);
        assert_eq!(normalized_dcg(&held_out, &[], 3, |_| 1.0), 0.0);
    }

    #[test]
    fn rating_weighted_ndcg_rewards_the_better_item_first() {
        let held_out = held_out(&[(3, 5.0), (7, 1.0)]);

        let right_order = normalized_dcg(&held_out, &ranked(&[3, 7]), 2, |p| p.value);
        let wrong_order = normalized_dcg(&held_out, &ranked(&[7, 3]), 2, |p| p.value);
        let binary = normalized_dcg(&held_out, &ranked(&[7, 3]), 2, |_| 1.0);

        assert!(right_order > wrong_order);
        assert_abs_diff_eq!(binary, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn pairs_without_opinion_are_skipped() {
        let held_out = vec![(5.0, Some(0.8)), (3.0, None), (1.0, Some(0.2))];

        let doa = degree_of_agreement(&[0.1, 0.5], &held_out).unwrap();
        assert_eq!(doa, PairCounts { agreeing: 3, total: 4 });

        let inner_doa = inner_degree_of_agreement(&held_out).unwrap();
        assert_eq!(inner_doa, PairCounts { agreeing: 2, total: 2 });

        assert!(degree_of_agreement(&[], &held_out).is_none());
        assert!(inner_degree_of_agreement(&[(5.0, Some(0.8))]).is_none());
    }

    #[test]
    fn evaluates_users_with_training_and_held_out_data() {
        let pool = Pool::new(2);
        let evaluator = Evaluator::new(&pool);

        let folds = vec![(training(), test())];
        let statistics = evaluator.evaluate(&Fixed(scores()), &folds, 2).unwrap();

        // user 1 gets [3, 4] and hits both, user 2 gets [2, 6] and hits 6, user 4 is unknown
        // in training and user 3 has nothing held out
        assert_abs_diff_eq!(statistics.precision, (1.0 + 0.5) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(statistics.recall, (1.0 + 1.0) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(statistics.r_precision, (1.0 + 0.0) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(statistics.reach, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(statistics.fall_out, (0.0 / 8.0 + 1.0 / 9.0) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(statistics.ndcg, (1.0 + 1.0 / 3f64.log2()) / 2.0, epsilon = 1e-12);

        // user 1: unseen {5, 6} score below both held-out items
        // user 2: unseen {2} scores above held-out item 6
        assert_abs_diff_eq!(statistics.macro_doa, (1.0 + 0.0) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(statistics.micro_doa, 4.0 / 5.0, epsilon = 1e-12);

        // only user 1 has two held-out items, 3 (rated 5, scored 0.7) above 4 (rated 3, 0.6)
        assert_abs_diff_eq!(statistics.macro_inner_doa, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(statistics.micro_inner_doa, 1.0, epsilon = 1e-12);
    }

    /// Scores every item by 100 minus its id.
    struct DescendingIds;

    impl Estimator for DescendingIds {
        fn estimate(&self, _user: UserId, item: ItemId) -> Result<f64> {
            Ok(100.0 - item as f64)
        }
    }

    impl EstimatorBuilder for DescendingIds {
        fn build<'a>(&self, _store: &'a RatingStore, _pool: &Pool)
            -> Result<Box<dyn Estimator + 'a>> {
            Ok(Box::new(DescendingIds))
        }
    }

    #[test]
    fn negative_held_out_ratings_keep_rating_weighted_ndcg_bounded() {
        let pool = Pool::new(2);
        let evaluator = Evaluator::new(&pool);

        let training = RatingStore::from_preferences(vec![
            Preference::new(1, 1, 3.0),
            Preference::new(1, 3, 4.0),
            Preference::new(2, 2, 2.0),
            Preference::new(2, 4, 5.0),
        ]);

        let test = RatingStore::from_preferences(vec![
            Preference::new(1, 2, 5.0),
            Preference::new(1, 4, -1.0),
        ]);

        let statistics = evaluator.evaluate(&DescendingIds, &[(training, test)], 2).unwrap();

        // both held-out items are recommended, the negative one second
        let discount = 1.0 / 3f64.log2();
        assert_abs_diff_eq!(statistics.ndcg, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(statistics.rndcg, (5.0 - discount) / (5.0 + discount), epsilon = 1e-12);
    }

    #[test]
    fn ranking_negative_ratings_first_gives_negative_rating_weighted_ndcg() {
        let held_out = held_out(&[(3, -4.0), (7, 1.0)]);

        let rndcg = normalized_dcg(&held_out, &ranked(&[3, 7]), 2, |p| p.value);
        let discount = 1.0 / 3f64.log2();

        assert_abs_diff_eq!(rndcg, (-4.0 + discount) / (4.0 + discount), epsilon = 1e-12);
        assert!(rndcg >= -1.0);

        let mut statistics = statistics(0.5);
        statistics.rndcg = rndcg;
        assert!(statistics.validated().is_ok());

        statistics.rndcg = -1.5;
        assert!(statistics.validated().is_err());
    }

    #[test]
    fn fall_out_counts_training_and_test_items_separately() {
        let pool = Pool::new(2);
        let evaluator = Evaluator::new(&pool);

        let training = RatingStore::from_preferences(vec![
            Preference::new(1, 1, 1.0),
            Preference::new(2, 2, 1.0),
            Preference::new(2, 3, 1.0),
            Preference::new(2, 4, 1.0),
        ]);

        let test = RatingStore::from_preferences(vec![
            Preference::new(1, 2, 1.0),
            Preference::new(3, 3, 1.0),
            Preference::new(3, 4, 1.0),
            Preference::new(3, 5, 1.0),
        ]);

        let statistics = evaluator.evaluate(&Fixed(scores()), &[(training, test)], 3).unwrap();

        // user 1 gets [2, 3, 4] with one hit, 4 training plus 4 test items minus 1 relevant
        assert_abs_diff_eq!(statistics.fall_out, 2.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(statistics.precision, 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn users_without_recommendations_get_zero_precision() {
        let pool = Pool::new(2);
        let evaluator = Evaluator::new(&pool);

        let folds = vec![(training(), test())];
        let statistics = evaluator.evaluate(&Fixed(vec![(1, 1.0)]), &folds, 2).unwrap();

        assert_eq!(statistics.precision, 0.0);
        assert_eq!(statistics.reach, 0.0);
        assert!(statistics.macro_doa.is_nan());
    }

    #[test]
    fn worker_failures_abort_the_evaluation() {
        let pool = Pool::new(2);
        let evaluator = Evaluator::new(&pool);

        let folds = vec![(training(), test())];

        match evaluator.evaluate(&Broken, &folds, 2) {
            Err(RecError::WorkerFailed { source, .. }) => assert!(!source.is_unknown_id()),
            _ => panic!("expected a worker failure"),
        }

        assert!(evaluator.evaluate(&Fixed(scores()), &folds, 0).is_err());
        assert!(evaluator.evaluate(&Fixed(scores()), &[], 2).is_err());
    }

    #[test]
    fn predictions_cover_all_unseen_items() {
        let pool = Pool::new(2);
        let evaluator = Evaluator::new(&pool);

        let directory = tempdir().unwrap();
        let output_path = directory.path().join("u1.test.Fixed");

        let folds = vec![(training(), test())];
        let mut scores = scores();
        scores.retain(|(item, _)| *item != 6);

        evaluator.predict(&Fixed(scores), &folds, &[output_path.clone()]).unwrap();

        let written = fs::read_to_string(&output_path).unwrap();
        let lines: Vec<&str> = written.lines().collect();

        // user 1: items 3, 4, 5, 6; user 2: items 2, 6; user 4: items 1 to 6
        assert_eq!(lines.len(), 4 + 2 + 6);
        assert_eq!(lines[0], "1,3,0.7");
        assert_eq!(lines[3], "1,6,NaN");
        assert_eq!(lines[4], "2,2,0.8");
        assert_eq!(lines[6], "4,1,0.9");
    }
}
