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
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use scoped_pool::Pool;

use crate::aspect::AspectModel;
use crate::error::{RecError, Result};
use crate::metadata::MetaData;
use crate::neighborhood::{EntropyTanimotoSimilarity, IdfTanimotoSimilarity, TanimotoSimilarity,
    UserNeighborhoodModel};
use crate::pagerank::PageRankModel;
use crate::popularity::PopularityModel;
use crate::series::{SeriesDeadlineModel, SeriesDeadlinePopularityModel, SeriesOverlapModel};
use crate::store::RatingStore;
use crate::{Estimator, EstimatorBuilder};

pub const DEFAULT_NUM_FACTORS: usize = 20;
pub const DEFAULT_NUM_NEIGHBORS: usize = 10;
pub const DEFAULT_METADATA_PATH: &str = "item.txt";

const DEFAULT_DATA_DIRECTORY: &str = "ml-100k";
const DEFAULT_NUM_FOLDS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    Popularity,
    RandomWalk,
    Aspect,
    Series,
    SeriesDeadline,
    SeriesDeadlinePopularity,
    SeriesDeadlineRelativePopularity,
    SeriesOverlap,
    UserNeighborhood,
    IdfUserNeighborhood,
    EntropyUserNeighborhood,
}

impl ModelKind {

    /// Short name used on the command line and in prediction file names.
    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Popularity => "Popularity",
            ModelKind::RandomWalk => "RWR",
            ModelKind::Aspect => "LFM",
            ModelKind::Series => "SM",
            ModelKind::SeriesDeadline => "SDM",
            ModelKind::SeriesDeadlinePopularity => "SDPM",
            ModelKind::SeriesDeadlineRelativePopularity => "SDRPM",
            ModelKind::SeriesOverlap => "Name",
            ModelKind::UserNeighborhood => "UserCF",
            ModelKind::IdfUserNeighborhood => "UserCFIDF2",
            ModelKind::EntropyUserNeighborhood => "UserCFLFM",
        }
    }

    pub fn needs_metadata(self) -> bool {
        match self {
            ModelKind::Series
            | ModelKind::SeriesDeadline
            | ModelKind::SeriesDeadlinePopularity
            | ModelKind::SeriesDeadlineRelativePopularity
            | ModelKind::SeriesOverlap => true,
            _ => false,
        }
    }
}

impl FromStr for ModelKind {
    type Err = RecError;

    fn from_str(label: &str) -> Result<Self> {
        match label {
            "Popularity" => Ok(ModelKind::Popularity),
            "RWR" => Ok(ModelKind::RandomWalk),
            "LFM" => Ok(ModelKind::Aspect),
            "SM" => Ok(ModelKind::Series),
            "SDM" => Ok(ModelKind::SeriesDeadline),
            "SDPM" => Ok(ModelKind::SeriesDeadlinePopularity),
            "SDRPM" => Ok(ModelKind::SeriesDeadlineRelativePopularity),
            "Name" => Ok(ModelKind::SeriesOverlap),
            "UserCF" => Ok(ModelKind::UserNeighborhood),
            "UserCFIDF2" => Ok(ModelKind::IdfUserNeighborhood),
            "UserCFLFM" => Ok(ModelKind::EntropyUserNeighborhood),
            _ => Err(RecError::InvalidParameter(format!(
                "unknown model type '{}', expected one of Popularity, RWR, LFM, SM, SDM, SDPM, \
                 SDRPM, Name, UserCF, UserCFIDF2, UserCFLFM", label))),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which model to build for every fold, and with which parameters.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    kind: ModelKind,
    num_factors: usize,
    num_neighbors: usize,
    seed: Option<u64>,
    metadata: Option<Arc<MetaData>>,
}

impl ModelConfig {

    pub fn new(kind: ModelKind) -> Self {
        ModelConfig {
            kind,
            num_factors: DEFAULT_NUM_FACTORS,
            num_neighbors: DEFAULT_NUM_NEIGHBORS,
            seed: None,
            metadata: None,
        }
    }

    pub fn factors(mut self, num_factors: usize) -> Self {
        self.num_factors = num_factors;
        self
    }

    pub fn neighbors(mut self, num_neighbors: usize) -> Self {
        self.num_neighbors = num_neighbors;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn metadata(mut self, metadata: Arc<MetaData>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    fn required_metadata(&self) -> Result<Arc<MetaData>> {
        self.metadata.clone().ok_or_else(|| RecError::InvalidParameter(format!(
            "model type {} requires item metadata", self.kind)))
    }
}

impl EstimatorBuilder for ModelConfig {

    fn build<'a>(&self, store: &'a RatingStore, pool: &Pool) -> Result<Box<dyn Estimator + 'a>> {
        let estimator: Box<dyn Estimator + 'a> = match self.kind {
            ModelKind::Popularity => Box::new(PopularityModel::build(store)),
            ModelKind::RandomWalk => Box::new(PageRankModel::build(store)?),
            ModelKind::Aspect =>
                Box::new(AspectModel::train(store, self.num_factors, self.seed, pool)?),
            ModelKind::Series => Box::new(SeriesDeadlineModel::train(
                store, self.required_metadata()?, self.num_factors, self.seed, false, pool)?),
            ModelKind::SeriesDeadline => Box::new(SeriesDeadlineModel::train(
                store, self.required_metadata()?, self.num_factors, self.seed, true, pool)?),
            ModelKind::SeriesDeadlinePopularity => Box::new(SeriesDeadlinePopularityModel::train(
                store, self.required_metadata()?, self.num_factors, self.seed, false, pool)?),
            ModelKind::SeriesDeadlineRelativePopularity =>
                Box::new(SeriesDeadlinePopularityModel::train(
                    store, self.required_metadata()?, self.num_factors, self.seed, true, pool)?),
            ModelKind::SeriesOverlap =>
                Box::new(SeriesOverlapModel::new(store, self.required_metadata()?)),
            ModelKind::UserNeighborhood => Box::new(UserNeighborhoodModel::new(
                store, TanimotoSimilarity::new(store), self.num_neighbors)?),
            ModelKind::IdfUserNeighborhood => Box::new(UserNeighborhoodModel::new(
                store, IdfTanimotoSimilarity::new(store), self.num_neighbors)?),
            ModelKind::EntropyUserNeighborhood => {
                let aspect_model = AspectModel::train(store, self.num_factors, self.seed, pool)?;
                let similarity = EntropyTanimotoSimilarity::new(store, &aspect_model);
                Box::new(UserNeighborhoodModel::new(store, similarity, self.num_neighbors)?)
            },
        };

        Ok(estimator)
    }
}

/// Pairs up alternating training and test files. Without any files, the five MovieLens 100k
/// folds `ml-100k/u1.base`, `ml-100k/u1.test`, ... are used.
pub fn fold_paths(files: &[String]) -> Result<Vec<(PathBuf, PathBuf)>> {
    if files.is_empty() {
        warn!("No input files given, using the default folds in {}", DEFAULT_DATA_DIRECTORY);

        let directory = Path::new(DEFAULT_DATA_DIRECTORY);
        let folds = (1..=DEFAULT_NUM_FOLDS)
            .map(|fold| (directory.join(format!("u{}.base", fold)),
                         directory.join(format!("u{}.test", fold))))
            .collect();

        return Ok(folds);
    }

    if files.len() % 2 != 0 {
        return Err(RecError::InvalidParameter(format!(
            "expected alternating training and test files, got {} files", files.len())));
    }

    let folds = files.chunks(2)
        .map(|pair| (PathBuf::from(&pair[0]), PathBuf::from(&pair[1])))
        .collect();

    Ok(folds)
}

/// `<directory>/<test file name>.<model label>`
pub fn prediction_path(directory: &Path, test_path: &Path, kind: ModelKind) -> PathBuf {
    let file_name = test_path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("predictions"));

    directory.join(format!("{}.{}", file_name, kind.label()))
}


#[cfg(test)]
mod tests {

    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use scoped_pool::Pool;

    use super::{fold_paths, prediction_path, ModelConfig, ModelKind};
    use crate::metadata::MetaData;
    use crate::store::RatingStore;
    use crate::types::Preference;
    use crate::{Estimator, EstimatorBuilder};

    const LABELS: &[&str] = &["Popularity", "RWR", "LFM", "SM", "SDM", "SDPM", "SDRPM", "Name",
        "UserCF", "UserCFIDF2", "UserCFLFM"];

    #[test]
    fn parses_model_labels() {
        for label in LABELS.iter() {
            let kind: ModelKind = label.parse().unwrap();
            assert_eq!(kind.label(), *label);
            assert_eq!(kind.to_string(), *label);
        }

        assert!("ALS".parse::<ModelKind>().is_err());
        assert!(ModelKind::SeriesDeadline.needs_metadata());
        assert!(ModelKind::SeriesOverlap.needs_metadata());
        assert!(!ModelKind::RandomWalk.needs_metadata());
        assert!(!ModelKind::IdfUserNeighborhood.needs_metadata());
    }

    #[test]
    fn pairs_alternating_files() {
        let files = vec![String::from("a.base"), String::from("a.test"),
                         String::from("b.base"), String::from("b.test")];

        let folds = fold_paths(&files).unwrap();
        assert_eq!(folds, vec![
            (PathBuf::from("a.base"), PathBuf::from("a.test")),
            (PathBuf::from("b.base"), PathBuf::from("b.test")),
        ]);

        assert!(fold_paths(&files[..3]).is_err());
    }

    #[test]
    fn defaults_to_movielens_folds() {
        let folds = fold_paths(&[]).unwrap();

        assert_eq!(folds.len(), 5);
        assert_eq!(folds[0].0, Path::new("ml-100k").join("u1.base"));
        assert_eq!(folds[4].1, Path::new("ml-100k").join("u5.test"));
    }

    #[test]
    fn prediction_files_are_named_after_test_file_and_model() {
        let path = prediction_path(Path::new("predict"), Path::new("data/u3.test"), ModelKind::Aspect);
        assert_eq!(path, Path::new("predict").join("u3.test.LFM"));
    }

    #[test]
    fn builds_every_model_kind() {
        let store = RatingStore::from_preferences(vec![
            Preference::new(1, 1, 5.0),
            Preference::new(1, 2, 3.0),
            Preference::new(2, 2, 4.0),
            Preference::new(2, 3, 1.0),
            Preference::new(3, 1, 2.0),
            Preference::new(3, 3, 5.0),
        ]);

        let mut metadata = MetaData::new();
        metadata.insert(1, 10, 1_261_440_000, "A 2010");
        metadata.insert(2, 10, 1_292_976_000, "A 2011");
        metadata.insert(3, 20, 1_262_304_000, "B 2010");
        let metadata = Arc::new(metadata);

        let pool = Pool::new(2);

        for label in LABELS.iter() {
            let kind: ModelKind = label.parse().unwrap();
            let config = ModelConfig::new(kind).factors(2).seed(Some(1)).metadata(metadata.clone());

            let estimator = config.build(&store, &pool).unwrap();
            let score = estimator.estimate(1, 3).unwrap();
            assert!(score >= 0.0 && score.is_finite());
        }

        let without_metadata = ModelConfig::new(ModelKind::Series);
        assert!(without_metadata.build(&store, &pool).is_err());

        let without_neighbors = ModelConfig::new(ModelKind::UserNeighborhood).neighbors(0);
        assert!(without_neighbors.build(&store, &pool).is_err());
    }
}
