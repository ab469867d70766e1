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

use std::ops::Range;
use std::time::Instant;

use fnv::FnvHashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scoped_pool::Pool;

use crate::error::{RecError, Result};
use crate::store::RatingStore;
use crate::types::{self, ItemId, UserId};
use crate::utils;
use crate::Estimator;

pub const MAX_FACTORS: usize = 2000;

const MIN_ITERATIONS: usize = 10;
const MAX_ITERATIONS: usize = 200;
const CONVERGENCE_THRESHOLD: f64 = 0.00001;

/// P(z), P(u|z) and P(i|z) of the aspect model, with users and items addressed by their dense
/// index.
#[derive(Clone, Debug)]
struct Parameters {
    prior: Vec<f64>,
    user_given_factor: Vec<Vec<f64>>,
    item_given_factor: Vec<Vec<f64>>,
}

impl Parameters {

    #[inline(always)]
    fn joint(&self, user: usize, item: usize, factor: usize) -> f64 {
        self.prior[factor] * self.user_given_factor[factor][user] * self.item_given_factor[factor][item]
    }

    fn probability(&self, user: usize, item: usize) -> f64 {
        (0..self.prior.len()).map(|factor| self.joint(user, item, factor)).sum()
    }
}

/// Observed (user, item) pairs grouped by user, so that the responsibilities of one user form a
/// contiguous block of the flat expectation buffer.
struct Observations {
    user_offsets: Vec<usize>,
    items: Vec<usize>,
}

impl Observations {

    fn num_users(&self) -> usize {
        self.user_offsets.len() - 1
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn of_user(&self, user: usize) -> Range<usize> {
        self.user_offsets[user]..self.user_offsets[user + 1]
    }
}

/// Runs the EM iterations for the aspect model. `AspectModel::train` drives it to convergence,
/// the individual steps are exposed to inspect the model between passes.
pub struct AspectTrainer {
    num_factors: usize,
    user_index: FnvHashMap<UserId, usize>,
    item_index: FnvHashMap<ItemId, usize>,
    observations: Observations,
    // num_observations x num_factors, row-major
    expectation: Vec<f64>,
    parameters: Parameters,
}

impl AspectTrainer {

    pub fn new(store: &RatingStore, num_factors: usize, seed: Option<u64>) -> Result<Self> {

        if num_factors < 1 || num_factors > MAX_FACTORS {
            return Err(RecError::InvalidParameter(format!(
                "number of latent factors must be between 1 and {}, got {}",
                MAX_FACTORS, num_factors)));
        }

        if store.num_preferences() == 0 {
            return Err(RecError::InvalidParameter(
                String::from("cannot fit an aspect model without preferences")));
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut user_index = types::new_id_map(store.num_users());
        for (index, user) in store.user_ids().iter().enumerate() {
            user_index.insert(*user, index);
        }

        let mut item_index = types::new_id_map(store.num_items());
        for (index, item) in store.item_ids().iter().enumerate() {
            item_index.insert(*item, index);
        }

        let mut user_offsets = Vec::with_capacity(store.num_users() + 1);
        let mut items = Vec::with_capacity(store.num_preferences());
        user_offsets.push(0);

        for user in store.user_ids().iter() {
            for preference in store.preferences_from_user(*user)?.iter() {
                items.push(item_index[&preference.item]);
            }
            user_offsets.push(items.len());
        }

        let observations = Observations { user_offsets, items };

        let prior = random_distribution(&mut rng, num_factors);

        let user_given_factor = (0..num_factors)
            .map(|_| random_distribution(&mut rng, store.num_users()))
            .collect();

        let item_given_factor = (0..num_factors)
            .map(|_| random_distribution(&mut rng, store.num_items()))
            .collect();

        let mut expectation = Vec::with_capacity(observations.len() * num_factors);
        for _ in 0..observations.len() {
            expectation.extend(random_distribution(&mut rng, num_factors));
        }

        Ok(AspectTrainer {
            num_factors,
            user_index,
            item_index,
            observations,
            expectation,
            parameters: Parameters { prior, user_given_factor, item_given_factor },
        })
    }

    /// Recomputes the responsibilities P(z|u,i) of all observations, one task per user.
    pub fn e_step(&mut self, pool: &Pool) {

        let num_factors = self.num_factors;
        let observations = &self.observations;
        let parameters = &self.parameters;
        let mut remaining: &mut [f64] = &mut self.expectation;

        pool.scoped(|scope| {
            for user in 0..observations.num_users() {
                let range = observations.of_user(user);
                let (block, rest) = std::mem::take(&mut remaining)
                    .split_at_mut(range.len() * num_factors);
                remaining = rest;

                scope.execute(move || {
                    let responsibilities = block.chunks_mut(num_factors);
                    for (observation, responsibility) in range.zip(responsibilities) {
                        let item = observations.items[observation];

                        let mut sum = 0.0;
                        for factor in 0..num_factors {
                            let joint = parameters.joint(user, item, factor);
                            responsibility[factor] = joint;
                            sum += joint;
                        }

                        if sum > 0.0 {
                            for value in responsibility.iter_mut() {
                                *value /= sum;
                            }
                        }
                    }
                });
            }
        });
    }

    /// Re-estimates P(z), P(u|z) and P(i|z) from the responsibilities, one task per factor. Each
    /// task exclusively owns the slots of its factor.
    pub fn m_step(&mut self, pool: &Pool) {

        let num_factors = self.num_factors;
        let num_observations = self.observations.len() as f64;
        let observations = &self.observations;
        let expectation = &self.expectation;
        let Parameters { prior, user_given_factor, item_given_factor } = &mut self.parameters;

        let factors = prior.iter_mut()
            .zip(user_given_factor.iter_mut())
            .zip(item_given_factor.iter_mut())
            .enumerate();

        pool.scoped(|scope| {
            for (factor, ((prior_of_factor, users_given_factor), items_given_factor)) in factors {

                scope.execute(move || {
                    for value in users_given_factor.iter_mut() {
                        *value = 0.0;
                    }
                    for value in items_given_factor.iter_mut() {
                        *value = 0.0;
                    }

                    let mut total = 0.0;

                    for user in 0..observations.num_users() {
                        for observation in observations.of_user(user) {
                            let responsibility = expectation[observation * num_factors + factor];
                            users_given_factor[user] += responsibility;
                            items_given_factor[observations.items[observation]] += responsibility;
                            total += responsibility;
                        }
                    }

                    if total > 0.0 {
                        for value in users_given_factor.iter_mut() {
                            *value /= total;
                        }
                        for value in items_given_factor.iter_mut() {
                            *value /= total;
                        }
                    } else {
                        warn!("Latent factor {} lost all of its mass", factor);
                    }

                    *prior_of_factor = total / num_observations;
                });
            }
        });
    }

    /// Total log-likelihood of the observations, one task per user. Probabilities that underflow
    /// are clamped to the smallest positive double.
    pub fn log_likelihood(&self, pool: &Pool) -> f64 {

        let users: Vec<usize> = (0..self.observations.num_users()).collect();
        let observations = &self.observations;
        let parameters = &self.parameters;

        let partial_log_likelihoods = utils::scatter_gather(pool, &users, |user| {
            observations.of_user(*user)
                .map(|observation| {
                    let probability = parameters.probability(*user, observations.items[observation]);
                    probability.max(std::f64::MIN_POSITIVE).ln()
                })
                .sum::<f64>()
        });

        partial_log_likelihoods.iter().sum()
    }

    pub fn prior(&self) -> &[f64] {
        &self.parameters.prior
    }

    /// P(z|u,i) for an observed pair.
    pub fn responsibilities(&self, user: UserId, item: ItemId) -> Option<&[f64]> {
        let user_index = *self.user_index.get(&user)?;
        let item_index = *self.item_index.get(&item)?;

        let range = self.observations.of_user(user_index);
        // items of a user are ordered by id and the dense item index preserves that order
        let position = self.observations.items[range.clone()].binary_search(&item_index).ok()?;
        let observation = range.start + position;

        Some(&self.expectation[observation * self.num_factors..(observation + 1) * self.num_factors])
    }

    pub fn into_model(self, log_likelihood: f64, iterations: usize) -> AspectModel {
        AspectModel {
            num_factors: self.num_factors,
            user_index: self.user_index,
            item_index: self.item_index,
            parameters: self.parameters,
            log_likelihood,
            iterations,
        }
    }
}

/// Random point on the probability simplex.
fn random_distribution<R: Rng>(rng: &mut R, dimensions: usize) -> Vec<f64> {
    let mut values: Vec<f64> = (0..dimensions)
        .map(|_| rng.gen_range(std::f64::EPSILON..1.0))
        .collect();

    let sum: f64 = values.iter().sum();
    for value in values.iter_mut() {
        *value /= sum;
    }

    values
}

/// Aspect model (probabilistic latent semantic analysis) of user-item co-occurrence:
/// P(u,i) = sum_z P(z) P(u|z) P(i|z), fitted with expectation maximization.
pub struct AspectModel {
    num_factors: usize,
    user_index: FnvHashMap<UserId, usize>,
    item_index: FnvHashMap<ItemId, usize>,
    parameters: Parameters,
    log_likelihood: f64,
    iterations: usize,
}

impl AspectModel {

    /// Runs at least 10 and at most 200 EM passes, stopping once the relative change of the
    /// log-likelihood drops below 1e-5. Without a seed, the random initialization differs from
    /// run to run.
    pub fn train(
        store: &RatingStore,
        num_factors: usize,
        seed: Option<u64>,
        pool: &Pool,
    ) -> Result<AspectModel> {

        let training_start = Instant::now();

        let mut trainer = AspectTrainer::new(store, num_factors, seed)?;

        let mut log_likelihood = trainer.log_likelihood(pool);
        let mut iterations = 0;

        while iterations < MAX_ITERATIONS {
            trainer.e_step(pool);
            trainer.m_step(pool);

            let previous_log_likelihood = log_likelihood;
            log_likelihood = trainer.log_likelihood(pool);
            iterations += 1;

            info!("EM pass {}: log-likelihood {} (previous {})",
                iterations, log_likelihood, previous_log_likelihood);

            let relative_change =
                ((log_likelihood - previous_log_likelihood) / previous_log_likelihood).abs();

            if iterations >= MIN_ITERATIONS && relative_change < CONVERGENCE_THRESHOLD {
                break;
            }
        }

        info!("Fitted aspect model with {} factors in {} EM passes and {}ms, final log-likelihood {}",
            num_factors, iterations, utils::to_millis(training_start.elapsed()), log_likelihood);

        Ok(trainer.into_model(log_likelihood, iterations))
    }

    pub fn num_factors(&self) -> usize {
        self.num_factors
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn prior(&self) -> &[f64] {
        &self.parameters.prior
    }

    pub fn user_given_factor(&self, factor: usize, user: UserId) -> Option<f64> {
        let user_index = self.user_index.get(&user)?;
        self.parameters.user_given_factor.get(factor).map(|users| users[*user_index])
    }

    pub fn item_given_factor(&self, factor: usize, item: ItemId) -> Option<f64> {
        let item_index = self.item_index.get(&item)?;
        self.parameters.item_given_factor.get(factor).map(|items| items[*item_index])
    }

    /// P(u,i) under the model, 0 if the user or the item was never observed.
    pub fn probability(&self, user: UserId, item: ItemId) -> f64 {
        match (self.user_index.get(&user), self.item_index.get(&item)) {
            (Some(user_index), Some(item_index)) =>
                self.parameters.probability(*user_index, *item_index),
            _ => 0.0,
        }
    }
}

impl Estimator for AspectModel {

    /// P(u,i) scaled by the number of items, which leaves the ranking per user untouched.
    fn estimate(&self, user: UserId, item: ItemId) -> Result<f64> {
        let user_index = self.user_index.get(&user).ok_or(RecError::UnknownUser(user))?;
        let item_index = self.item_index.get(&item).ok_or(RecError::UnknownItem(item))?;

        let probability = self.parameters.probability(*user_index, *item_index);

        Ok(probability * self.item_index.len() as f64)
    }
}


#[cfg(test)]
mod tests {

    use approx::assert_abs_diff_eq;
    use scoped_pool::Pool;

    use super::{AspectModel, AspectTrainer};
    use crate::store::RatingStore;
    use crate::types::Preference;
    use crate::Estimator;

    fn ratings() -> RatingStore {
        RatingStore::from_preferences(vec![
            Preference::new(1, 1, 5.0),
            Preference::new(1, 2, 4.0),
            Preference::new(1, 3, 1.0),
            Preference::new(2, 1, 4.0),
            Preference::new(2, 2, 5.0),
            Preference::new(2, 4, 2.0),
            Preference::new(3, 3, 5.0),
            Preference::new(3, 4, 4.0),
        ])
    }

    fn ranking(scores: &[(u64, f64)]) -> Vec<u64> {
        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        sorted.iter().map(|(item, _)| *item).collect()
    }

    #[test]
    fn rejects_invalid_factor_counts() {
        assert!(AspectTrainer::new(&ratings(), 0, Some(1)).is_err());
        assert!(AspectTrainer::new(&ratings(), 2001, Some(1)).is_err());
        assert!(AspectTrainer::new(&RatingStore::from_preferences(vec![]), 2, Some(1)).is_err());
    }

    #[test]
    fn distributions_stay_normalized_across_passes() {
        let store = ratings();
        let pool = Pool::new(2);
        let mut trainer = AspectTrainer::new(&store, 2, Some(7)).unwrap();

        assert_abs_diff_eq!(trainer.prior().iter().sum::<f64>(), 1.0, epsilon = 1e-9);

        for _ in 0..15 {
            trainer.e_step(&pool);

            for user in store.user_ids() {
                for preference in store.preferences_from_user(*user).unwrap() {
                    let responsibilities = trainer.responsibilities(*user, preference.item).unwrap();
                    assert_eq!(responsibilities.len(), 2);
                    assert_abs_diff_eq!(responsibilities.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
                }
            }

            trainer.m_step(&pool);
            assert_abs_diff_eq!(trainer.prior().iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }

        assert!(trainer.responsibilities(1, 4).is_none());
        assert!(trainer.responsibilities(9, 1).is_none());
    }

    #[test]
    fn em_does_not_decrease_the_log_likelihood() {
        let store = ratings();
        let pool = Pool::new(2);
        let mut trainer = AspectTrainer::new(&store, 2, Some(11)).unwrap();

        let mut previous = trainer.log_likelihood(&pool);
        for _ in 0..20 {
            trainer.e_step(&pool);
            trainer.m_step(&pool);
            let current = trainer.log_likelihood(&pool);
            assert!(current >= previous - 1e-9);
            previous = current;
        }
    }

    #[test]
    fn conditionals_sum_to_one() {
        let store = ratings();
        let pool = Pool::new(2);
        let model = AspectModel::train(&store, 2, Some(3), &pool).unwrap();

        assert!(model.iterations() >= 10 && model.iterations() <= 200);

        for factor in 0..model.num_factors() {
            let users: f64 = store.user_ids().iter()
                .map(|user| model.user_given_factor(factor, *user).unwrap())
                .sum();
            let items: f64 = store.item_ids().iter()
                .map(|item| model.item_given_factor(factor, *item).unwrap())
                .sum();

            assert_abs_diff_eq!(users, 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(items, 1.0, epsilon = 1e-9);
        }

        assert!(model.user_given_factor(2, 1).is_none());
    }

    #[test]
    fn scores_are_non_negative_and_ranking_ignores_prior_scale() {
        let store = ratings();
        let pool = Pool::new(2);
        let model = AspectModel::train(&store, 2, Some(42), &pool).unwrap();

        for user in store.user_ids() {
            let mut scores = Vec::new();
            let mut rescaled = Vec::new();

            for item in store.item_ids() {
                let score = model.estimate(*user, *item).unwrap();
                assert!(score >= 0.0);
                scores.push((*item, model.probability(*user, *item)));

                let rescaled_score: f64 = (0..model.num_factors())
                    .map(|factor| {
                        model.prior()[factor] * 3.5
                            * model.user_given_factor(factor, *user).unwrap()
                            * model.item_given_factor(factor, *item).unwrap()
                    })
                    .sum();
                rescaled.push((*item, rescaled_score));
            }

            assert_eq!(ranking(&scores), ranking(&rescaled));
        }
    }

    #[test]
    fn fixed_seed_reproduces_the_model() {
        let store = ratings();
        let pool = Pool::new(3);

        let first = AspectModel::train(&store, 2, Some(5), &pool).unwrap();
        let second = AspectModel::train(&store, 2, Some(5), &pool).unwrap();

        for user in store.user_ids() {
            for item in store.item_ids() {
                assert_abs_diff_eq!(first.probability(*user, *item),
                    second.probability(*user, *item), epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn unknown_ids_have_no_opinion() {
        let store = ratings();
        let pool = Pool::new(1);
        let model = AspectModel::train(&store, 1, Some(1), &pool).unwrap();

        assert_eq!(model.probability(99, 1), 0.0);
        assert_eq!(model.probability(1, 99), 0.0);
        assert!(model.estimate(99, 1).unwrap_err().is_unknown_id());
        assert!(model.estimate(1, 99).unwrap_err().is_unknown_id());
    }
}
