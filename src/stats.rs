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

use std::fmt;

use crate::error::{RecError, Result};

/// Keeps track of the running average of a series of numbers without storing the series. Data
/// can be added, removed or changed, and partial averages from different workers can be merged.
/// The sum is compensated (Kahan-Babuska) so long series do not drift.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunningAverage {
    count: usize,
    sum: f64,
    compensation: f64,
}

impl RunningAverage {

    pub fn new() -> Self {
        RunningAverage { count: 0, sum: 0.0, compensation: 0.0 }
    }

    pub fn with_average(count: usize, average: f64) -> Self {
        RunningAverage { count, sum: average * count as f64, compensation: 0.0 }
    }

    pub fn add_datum(&mut self, datum: f64) {
        self.count += 1;
        self.accumulate(datum);
    }

    pub fn remove_datum(&mut self, datum: f64) -> Result<()> {
        if self.count == 0 {
            return Err(RecError::Inconsistent(
                String::from("cannot remove a datum from an empty running average")));
        }

        self.count -= 1;
        if self.count == 0 {
            self.sum = 0.0;
            self.compensation = 0.0;
        } else {
            self.accumulate(-datum);
        }

        Ok(())
    }

    /// Changes an already added datum by `delta`.
    pub fn change_datum(&mut self, delta: f64) -> Result<()> {
        if self.count == 0 {
            return Err(RecError::Inconsistent(
                String::from("cannot change a datum of an empty running average")));
        }

        self.accumulate(delta);
        Ok(())
    }

    pub fn merge(&mut self, other: &RunningAverage) {
        self.count += other.count;
        self.accumulate(other.sum);
        self.accumulate(other.compensation);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum + self.compensation
    }

    /// NaN for an empty series.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            std::f64::NAN
        } else {
            self.sum() / self.count as f64
        }
    }

    #[inline(always)]
    fn accumulate(&mut self, value: f64) {
        let total = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - total) + value;
        } else {
            self.compensation += (value - total) + self.sum;
        }
        self.sum = total;
    }
}

impl fmt::Display for RunningAverage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.average())
    }
}
