//! # CLI Execution
//!
//! Dispatch from parsed arguments to the orchestrator, kept out of
//! `main.rs` so the entry point stays slim.

use anyhow::Result;
use harrow::checkpoint::WorkStatus;
use harrow::search::{self, SearchData, SearchPaths};
use harrow::{selftest, Mode};
use tracing::error;

use super::{Cli, Commands, RangeArgs};

/// Size the global rayon pool before any parallel work runs.
pub fn configure_rayon(threads: Option<usize>) {
    if let Some(n) = threads {
        if n > 0 {
            if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
                error!(error = %e, "could not configure rayon thread pool");
            }
        }
    }
}

fn paths_for(cli: &Cli) -> SearchPaths {
    SearchPaths {
        results: cli.results.clone(),
        state_dir: cli.state_dir.clone(),
    }
}

fn run_sieve(cli: &Cli, mode: Mode, args: &RangeArgs) -> Result<()> {
    let mut st = WorkStatus::new(mode, args.pmin, args.pmax, args.nmin, args.nmax);
    let mut sd = SearchData::new(&st);
    search::run(&mut st, &mut sd, &paths_for(cli), None)
}

pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Factorial(args) => run_sieve(cli, Mode::Factorial, args),
        Commands::Primorial(args) => run_sieve(cli, Mode::Primorial, args),
        Commands::Compositorial(args) => run_sieve(cli, Mode::Compositorial, args),
        Commands::Selftest => selftest::run(&paths_for(cli)),
    }
}
