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

use std::f64::consts::PI;
use std::f64::MIN_POSITIVE;
use std::time::Instant;

use fnv::FnvHashMap;
use scoped_pool::Pool;

use crate::error::Result;
use crate::store::RatingStore;
use crate::types::{self, ItemId, UserId};
use crate::utils;

/// Seconds per year, all distances between timestamps are measured in years.
pub const SCALE: f64 = 365.0 * 24.0 * 3600.0;

const MIN_ITERATIONS: usize = 10;
const MAX_ITERATIONS: usize = 1000;
const CONVERGENCE_THRESHOLD: f64 = 0.0001;
const SIGMA_SQUARE_FLOOR: f64 = 1e-10;

pub type TimeSeries = FnvHashMap<UserId, Vec<f64>>;

/// Leave-one-out Gaussian kernel density over the timestamps of each user's items, with one
/// bandwidth shared by all users.
pub struct DeadlineModel {
    time_series: TimeSeries,
    sigma_square: f64,
    log_likelihood_trace: Vec<f64>,
}

impl DeadlineModel {

    /// Fixed-point maximum likelihood estimate of the shared bandwidth, starting from one year.
    /// Runs at least 10 iterations and stops once the relative change of the log-likelihood
    /// drops below 1e-4.
    pub fn fit(time_series: TimeSeries, pool: &Pool) -> Result<DeadlineModel> {

        let fit_start = Instant::now();

        let series: Vec<&[f64]> = time_series.values()
            .map(|timestamps| timestamps.as_slice())
            .collect();

        let mut sigma_square = 1.0;

        if !series.iter().any(|timestamps| timestamps.len() > 1) {
            warn!("No user with at least two timestamps, keeping sigma^2 = {}", sigma_square);
            return Ok(DeadlineModel {
                time_series,
                sigma_square,
                log_likelihood_trace: vec![0.0],
            });
        }

        let num_observations: usize = series.iter().map(|timestamps| timestamps.len()).sum();

        let mut log_likelihood = total_log_likelihood(pool, &series, sigma_square);
        let mut log_likelihood_trace = vec![log_likelihood];

        loop {
            info!("Likelihood: {}, sigma^2: {}", log_likelihood, sigma_square);

            let previous_log_likelihood = log_likelihood;

            sigma_square = updated_sigma_square(pool, &series, sigma_square, num_observations)
                .max(SIGMA_SQUARE_FLOOR);
            log_likelihood = total_log_likelihood(pool, &series, sigma_square);
            log_likelihood_trace.push(log_likelihood);

            let iterations = log_likelihood_trace.len() - 1;
            let relative_change =
                ((previous_log_likelihood - log_likelihood) / previous_log_likelihood).abs();

            if iterations >= MIN_ITERATIONS && !(relative_change > CONVERGENCE_THRESHOLD) {
                break;
            }

            if iterations >= MAX_ITERATIONS {
                warn!("Bandwidth did not converge within {} iterations", MAX_ITERATIONS);
                break;
            }
        }

        info!("Inference done in {}ms, likelihood: {}, sigma^2: {}",
            utils::to_millis(fit_start.elapsed()), log_likelihood, sigma_square);

        Ok(DeadlineModel { time_series, sigma_square, log_likelihood_trace })
    }

    pub fn sigma_square(&self) -> f64 {
        self.sigma_square
    }

    /// Log-likelihood before the first and after every update.
    pub fn log_likelihood_trace(&self) -> &[f64] {
        &self.log_likelihood_trace
    }

    pub fn iterations(&self) -> usize {
        self.log_likelihood_trace.len() - 1
    }

    /// Density of the user acting at `timestamp`. Users without timestamps get 1.0, which keeps
    /// the ordering of their items intact when it is used as a weight.
    pub fn density(&self, user: UserId, timestamp: f64) -> f64 {
        match self.time_series.get(&user) {
            Some(timestamps) if !timestamps.is_empty() => {
                let normalizer = (2.0 * PI * self.sigma_square).sqrt();

                let density = timestamps.iter()
                    .map(|mean| {
                        let delta = (timestamp - mean) / SCALE;
                        (-delta * delta / 2.0 / self.sigma_square).exp() / normalizer
                    })
                    .sum::<f64>() / timestamps.len() as f64;

                density.max(MIN_POSITIVE)
            },
            _ => 1.0,
        }
    }
}

fn total_log_likelihood(pool: &Pool, series: &[&[f64]], sigma_square: f64) -> f64 {
    utils::scatter_gather(pool, series, |timestamps| user_log_likelihood(timestamps, sigma_square))
        .iter()
        .sum()
}

fn updated_sigma_square(
    pool: &Pool,
    series: &[&[f64]],
    sigma_square: f64,
    num_observations: usize,
) -> f64 {
    let sum: f64 = utils::scatter_gather(pool, series, |timestamps| {
        weighted_squared_distances(timestamps, sigma_square)
    }).iter().sum();

    sum / num_observations as f64
}

fn user_log_likelihood(timestamps: &[f64], sigma_square: f64) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }

    let normalizer = (2.0 * PI * sigma_square).sqrt();
    let mut sum = 0.0;

    for (i, timestamp) in timestamps.iter().enumerate() {
        let mut probability = 0.0;
        for (j, other) in timestamps.iter().enumerate() {
            if i != j {
                let delta = (timestamp - other) / SCALE;
                probability += (-delta * delta / 2.0 / sigma_square).exp() / normalizer;
            }
        }

        probability /= (timestamps.len() - 1) as f64;
        sum += probability.max(MIN_POSITIVE).ln();
    }

    sum
}

fn weighted_squared_distances(timestamps: &[f64], sigma_square: f64) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }

    let mut sum = 0.0;

    for (i, timestamp) in timestamps.iter().enumerate() {
        let mut weighted = 0.0;
        let mut weights = 0.0;

        for (j, other) in timestamps.iter().enumerate() {
            if i != j {
                let delta = (timestamp - other) / SCALE;
                let weight = (-delta * delta / 2.0 / sigma_square).exp();
                weights += weight;
                weighted += weight * delta * delta;
            }
        }

        if weights < MIN_POSITIVE {
            if weighted > MIN_POSITIVE {
                error!("Kernel weights underflowed for a series of {} timestamps", timestamps.len());
            }
        } else {
            sum += weighted / weights;
        }
    }

    sum
}

/// Timestamps of the items each user interacted with, items without a known time are left out.
pub fn time_series_from(store: &RatingStore, times: &FnvHashMap<ItemId, i64>) -> Result<TimeSeries> {
    let mut time_series = types::new_id_map(store.num_users());

    for user in store.user_ids().iter() {
        let timestamps: Vec<f64> = store.preferences_from_user(*user)?.iter()
            .filter_map(|preference| times.get(&preference.item))
            .map(|time| *time as f64)
            .collect();

        time_series.insert(*user, timestamps);
    }

    Ok(time_series)
}
