//! # cfprec
//!
//! Scores how much a user will like an item (typically a call for papers) and
//! measures the quality of those scores offline. The scoring models are an EM-trained aspect
//! model, a personalized random walk over the item co-occurrence graph, and a temporal kernel
//! density model that re-weights scores by how likely a user is to act around a deadline, next to
//! user-based neighborhood baselines. The evaluator runs N-fold cross validation and computes ranking statistics per user in parallel.
//!
//! ```rust,no_run
//! # extern crate cfprec;
//! # extern crate scoped_pool;
//! use cfprec::config::{ModelConfig, ModelKind};
//! use cfprec::evaluation::Evaluator;
//!
//! let pool = scoped_pool::Pool::new(cfprec::utils::default_pool_size());
//!
//! let folds = vec![(
//!     cfprec::io::read_ratings("ml-100k/u1.base").unwrap(),
//!     cfprec::io::read_ratings("ml-100k/u1.test").unwrap(),
//! )];
//!
//! let model = ModelConfig::new(ModelKind::Aspect).factors(20).seed(Some(42));
//! let statistics = Evaluator::new(&pool).evaluate(&model, &folds, 10).unwrap();
//!
//! println!("nDCG@10 = {}", statistics.ndcg);
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

use scoped_pool::Pool;

pub mod aspect;
pub mod cache;
pub mod config;
pub mod deadline;
pub mod error;
pub mod evaluation;
pub mod io;
pub mod metadata;
pub mod neighborhood;
pub mod pagerank;
pub mod popularity;
pub mod recommend;
pub mod series;
pub mod stats;
pub mod store;
pub mod types;
pub mod utils;


use error::Result;
use store::RatingStore;
use types::{ItemId, UserId};

/// Uniform scoring contract of all models. An `UnknownUser` or `UnknownItem` error means the
/// model has no opinion on the pair; every other error is a real failure.
pub trait Estimator: Sync {
    fn estimate(&self, user: UserId, item: ItemId) -> Result<f64>;
}

/// Builds a fresh model from the training data of a fold.
pub trait EstimatorBuilder: Sync {
    fn build<'a>(&self, store: &'a RatingStore, pool: &Pool) -> Result<Box<dyn Estimator + 'a>>;
}
