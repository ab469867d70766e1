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
use std::fs::File;
use std::io::{self, stdout, BufRead, BufReader, Write};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use crate::error::{RecError, Result};
use crate::evaluation::IrStatistics;
use crate::store::RatingStore;
use crate::types::{ItemId, Preference, UserId};
use crate::utils;

/// Reads a delimited input file. We expect NO headers and no quoting; records may have a varying
/// number of fields, callers check the shape themselves.
pub fn csv_reader<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<csv::Reader<File>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .quoting(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    Ok(reader)
}

/// Tab if the first non-blank line contains one, comma otherwise.
pub fn detect_separator<P: AsRef<Path>>(path: P) -> Result<u8> {
    let reader = BufReader::new(File::open(path)?);

    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            return Ok(if line.contains('\t') { b'\t' } else { b',' });
        }
    }

    Ok(b',')
}

/// Loads preferences of the form `user,item[,value[,timestamp]]` (comma or tab separated) into a
/// store. A missing value means 1.0.
pub fn read_ratings<P: AsRef<Path>>(path: P) -> Result<RatingStore> {
    let path = path.as_ref();
    let read_start = Instant::now();

    let separator = detect_separator(path)?;
    let mut reader = csv_reader(path, separator)?;

    let mut preferences = Vec::new();

    for result in reader.records() {
        let record = result?;

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let preference = preference_from(&record).map_err(|reason| RecError::Malformed {
            path: path.to_path_buf(),
            line: record.position().map(|position| position.line()).unwrap_or(0),
            reason,
        })?;

        preferences.push(preference);
    }

    let store = RatingStore::from_preferences(preferences);

    info!("Read {} preferences of {} users for {} items from {} in {}ms",
        store.num_preferences(), store.num_users(), store.num_items(), path.display(),
        utils::to_millis(read_start.elapsed()));

    Ok(store)
}

fn preference_from(record: &csv::StringRecord) -> std::result::Result<Preference, String> {
    if record.len() < 2 || record.len() > 4 {
        return Err(format!("expected 2 to 4 fields, found {}", record.len()));
    }

    let user: UserId = parse_field(record, 0, "user id")?;
    let item: ItemId = parse_field(record, 1, "item id")?;

    let value = match record.get(2) {
        Some(field) if !field.is_empty() => parse_field::<f64>(record, 2, "preference value")?,
        _ => 1.0,
    };

    if let Some(field) = record.get(3) {
        if !field.is_empty() {
            parse_field::<i64>(record, 3, "timestamp")?;
        }
    }

    Ok(Preference::new(user, item, value))
}

pub(crate) fn parse_field<T>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
) -> std::result::Result<T, String>
    where T: FromStr, T::Err: fmt::Display {

    let field = record.get(index).unwrap_or("");

    field.parse::<T>()
        .map_err(|failure| format!("cannot parse {} from '{}': {}", name, field, failure))
}

/// Output goes to a file at `path` if given, to stdout otherwise.
pub fn output_for(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
    let out: Box<dyn Write> = match path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(stdout()),
    };

    Ok(out)
}

/// One `user,item,prediction` line per entry, predictions without an opinion are written as
/// `NaN`.
pub fn write_predictions<W: Write>(out: &mut W, predictions: &[(UserId, ItemId, f64)]) -> io::Result<()> {
    for (user, item, prediction) in predictions.iter() {
        writeln!(out, "{},{},{}", user, item, prediction)?;
    }
    out.flush()
}

/// One `label<TAB>value` line per metric.
pub fn write_report<W: Write>(out: &mut W, statistics: &IrStatistics) -> io::Result<()> {
    for (label, value) in statistics.report().iter() {
        writeln!(out, "{}\t{}", label, value)?;
    }
    out.flush()
}

pub fn write_report_json<W: Write>(out: &mut W, statistics: &IrStatistics) -> io::Result<()> {
    let statistics_as_json = serde_json::json!(statistics);
    writeln!(out, "{}", statistics_as_json.to_string())?;
    out.flush()
}
