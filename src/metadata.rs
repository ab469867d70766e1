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

use std::path::Path;

use fnv::FnvHashMap;

use crate::error::{RecError, Result};
use crate::io;
use crate::types::{self, ItemId};

pub type SeriesId = u64;

/// Series, deadline and name of every item, read from a file with the four tab-separated
/// columns item id, series id, epoch timestamp and name.
#[derive(Clone, Debug, Default)]
pub struct MetaData {
    series: FnvHashMap<ItemId, SeriesId>,
    times: FnvHashMap<ItemId, i64>,
    names: FnvHashMap<ItemId, String>,
}

impl MetaData {

    pub fn new() -> Self {
        MetaData {
            series: types::new_id_map(10),
            times: types::new_id_map(10),
            names: types::new_id_map(10),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = io::csv_reader(path, b'\t')?;

        let mut metadata = MetaData::new();

        for result in reader.records() {
            let record = result?;
            let line = record.position().map(|position| position.line()).unwrap_or(0);

            let malformed = |reason: String| RecError::Malformed {
                path: path.to_path_buf(),
                line,
                reason,
            };

            if record.len() != 4 {
                return Err(malformed(format!("expected 4 columns, found {}", record.len())));
            }

            let item: ItemId = io::parse_field(&record, 0, "item id").map_err(malformed)?;
            let series: SeriesId = io::parse_field(&record, 1, "series id").map_err(malformed)?;
            let time: i64 = io::parse_field(&record, 2, "timestamp").map_err(malformed)?;

            metadata.insert(item, series, time, &record[3]);
        }

        info!("Read metadata of {} items from {}", metadata.len(), path.display());

        Ok(metadata)
    }

    pub fn insert(&mut self, item: ItemId, series: SeriesId, time: i64, name: &str) {
        self.series.insert(item, series);
        self.times.insert(item, time);
        self.names.insert(item, String::from(name));
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn series_of(&self, item: ItemId) -> Option<SeriesId> {
        self.series.get(&item).cloned()
    }

    pub fn time_of(&self, item: ItemId) -> Option<i64> {
        self.times.get(&item).cloned()
    }

    pub fn name_of(&self, item: ItemId) -> Option<&str> {
        self.names.get(&item).map(|name| name.as_str())
    }

    pub fn series(&self) -> &FnvHashMap<ItemId, SeriesId> {
        &self.series
    }

    pub fn times(&self) -> &FnvHashMap<ItemId, i64> {
        &self.times
    }
}


#[cfg(test)]
mod tests {

    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::MetaData;
    use crate::error::RecError;

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_series_times_and_names() {
        let file = file_with("1\t7\t1261440000\tICDE 2010\n2\t7\t1293840000\tICDE 2011\n\
            3\t9\t1262304000\tKDD 2010\n");

        let metadata = MetaData::from_path(file.path()).unwrap();

        assert_eq!(metadata.len(), 3);
        assert_eq!(metadata.series_of(2), Some(7));
        assert_eq!(metadata.time_of(3), Some(1262304000));
        assert_eq!(metadata.name_of(1), Some("ICDE 2010"));
        assert_eq!(metadata.series_of(4), None);
        assert_eq!(metadata.times().len(), 3);
    }

    #[test]
    fn rejects_rows_with_wrong_column_count() {
        let file = file_with("1\t7\t1261440000\tICDE 2010\n2\t7\t1293840000\n");

        match MetaData::from_path(file.path()) {
            Err(RecError::Malformed { line, .. }) => assert_eq!(line, 2),
            _ => panic!("expected a malformed input error"),
        }
    }

    #[test]
    fn rejects_unparsable_numbers() {
        let file = file_with("1\tseven\t1261440000\tICDE 2010\n");
        assert!(MetaData::from_path(file.path()).is_err());
    }
}
