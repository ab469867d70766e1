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

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ItemId, UserId};

#[derive(Error, Debug)]
pub enum RecError {
    #[error("No such user: {0}")]
    UnknownUser(UserId),

    #[error("No such item: {0}")]
    UnknownItem(ItemId),

    #[error("Malformed input in {path:?} at line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    #[error("Evaluation of user {user} failed: {source}")]
    WorkerFailed {
        user: UserId,
        #[source]
        source: Box<RecError>,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Illegal {name}: {value}")]
    InvalidStatistic { name: &'static str, value: f64 },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RecError {
    /// Unknown users and items mean "no opinion", they never abort a run.
    pub fn is_unknown_id(&self) -> bool {
        match self {
            RecError::UnknownUser(_) | RecError::UnknownItem(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RecError>;
