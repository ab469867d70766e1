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

#[macro_use]
extern crate log;

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use env_logger::Env;
use getopts::Options;
use scoped_pool::Pool;

use cfprec::config::{self, ModelConfig, ModelKind};
use cfprec::error::Result;
use cfprec::evaluation::Evaluator;
use cfprec::io;
use cfprec::metadata::MetaData;
use cfprec::store::RatingStore;
use cfprec::utils;

struct Arguments {
    kind: ModelKind,
    at: usize,
    num_factors: usize,
    num_neighbors: usize,
    metadata_path: String,
    seed: Option<u64>,
    predictions_directory: Option<PathBuf>,
    json: bool,
    num_cpus: usize,
    files: Vec<String>,
}

fn main() {

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("t", "type", "Model type (required), one of Popularity, RWR, LFM, SM, SDM, \
        SDPM, SDRPM, Name, UserCF, UserCFIDF2, UserCFLFM.", "TYPE");
    opts.optopt("n", "num-evaluated", "Number of recommendations to evaluate per user \
        (required).", "NUMBER");
    opts.optopt("f", "factor", "Number of latent factors (optional, defaults to 20).", "NUMBER");
    opts.optopt("b", "neighbor", "Number of nearest users for UserCF, UserCFIDF2 and UserCFLFM \
        (optional, defaults to 10).", "NUMBER");
    opts.optopt("m", "metadata", "Tab separated item metadata file with item id, series id, \
        deadline and name per line, required by SM, SDM, SDPM, SDRPM and Name (optional, defaults to \
        item.txt).", "PATH");
    opts.optopt("s", "seed", "Seed for the random initialization (optional).", "NUMBER");
    opts.optopt("p", "predictions", "Write predictions for every test file into this directory \
        instead of evaluating (optional).", "DIR");
    opts.optflag("j", "json", "Print the statistics as a JSON object");
    opts.optopt("c", "cpus", "Number of worker threads (optional, defaults to the number of \
        CPUs minus one).", "NUMBER");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, opts, None);
    }

    let kind: ModelKind = match matches.opt_str("t").map(|label| label.parse()) {
        Some(Ok(kind)) => kind,
        Some(Err(failure)) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
        None => return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify a model type via --type."),
        ),
    };

    let at: usize = match matches.opt_get("n") {
        Ok(Some(at)) => at,
        Ok(None) => return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify the number of recommendations via --num-evaluated."),
        ),
        Err(failure) => {
            let hint = format!("Problem with option 'n': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let num_factors: usize = match matches.opt_get_default("f", config::DEFAULT_NUM_FACTORS) {
        Ok(num_factors) => num_factors,
        Err(failure) => {
            let hint = format!("Problem with option 'f': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let num_neighbors: usize = match matches.opt_get_default("b", config::DEFAULT_NUM_NEIGHBORS) {
        Ok(num_neighbors) => num_neighbors,
        Err(failure) => {
            let hint = format!("Problem with option 'b': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let seed: Option<u64> = match matches.opt_get("s") {
        Ok(seed) => seed,
        Err(failure) => {
            let hint = format!("Problem with option 's': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let num_cpus: usize = match matches.opt_get_default("c", utils::default_pool_size()) {
        Ok(num_cpus) if num_cpus > 0 => num_cpus,
        Ok(_) => return print_usage_and_exit(
            &program,
            opts,
            Some("The number of worker threads must be positive."),
        ),
        Err(failure) => {
            let hint = format!("Problem with option 'c': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let arguments = Arguments {
        kind,
        at,
        num_factors,
        num_neighbors,
        metadata_path: matches.opt_str("m")
            .unwrap_or_else(|| String::from(config::DEFAULT_METADATA_PATH)),
        seed,
        predictions_directory: matches.opt_str("p").map(PathBuf::from),
        json: matches.opt_present("j"),
        num_cpus,
        files: matches.free.clone(),
    };

    if let Err(failure) = run(&arguments) {
        error!("{}", failure);
        eprintln!("\n{}\n", failure);
        std::process::exit(1);
    }
}

fn print_usage_and_exit(
    program: &str,
    opts: Options,
    hint: Option<&str>
) {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options] [TRAINING TEST]...", program);
    eprint!("{}", opts.usage(&brief));

    std::process::exit(if hint.is_some() { 2 } else { 0 });
}

fn run(arguments: &Arguments) -> Result<()> {

    let fold_paths = config::fold_paths(&arguments.files)?;

    let mut model = ModelConfig::new(arguments.kind)
        .factors(arguments.num_factors)
        .neighbors(arguments.num_neighbors)
        .seed(arguments.seed);

    if arguments.kind.needs_metadata() {
        let metadata = MetaData::from_path(&arguments.metadata_path)?;
        model = model.metadata(Arc::new(metadata));
    }

    let folds = fold_paths.iter()
        .map(|(training_path, test_path)| read_fold(training_path, test_path))
        .collect::<Result<Vec<_>>>()?;

    info!("Running {} on {} folds with {} threads", arguments.kind, folds.len(),
        arguments.num_cpus);

    let pool = Pool::new(arguments.num_cpus);
    let evaluator = Evaluator::new(&pool);

    let outcome = match arguments.predictions_directory {
        Some(ref directory) => {
            let output_paths: Vec<PathBuf> = fold_paths.iter()
                .map(|(_, test_path)| config::prediction_path(directory, test_path, arguments.kind))
                .collect();

            evaluator.predict(&model, &folds, &output_paths)
        },
        None => evaluator.evaluate(&model, &folds, arguments.at).and_then(|statistics| {
            let mut out = io::output_for(None)?;

            if arguments.json {
                io::write_report_json(&mut out, &statistics)?;
            } else {
                io::write_report(&mut out, &statistics)?;
            }

            Ok(())
        }),
    };

    pool.shutdown();

    outcome
}

fn read_fold(training_path: &Path, test_path: &Path) -> Result<(RatingStore, RatingStore)> {
    Ok((io::read_ratings(training_path)?, io::read_ratings(test_path)?))
}
