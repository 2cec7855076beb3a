//! # Main — CLI Entry Point
//!
//! One subcommand per sieve mode plus the self-test regression. Shared
//! concerns handled here: structured logging (human-readable on stderr, or
//! JSON when `LOG_FORMAT=json`), the rayon pool size, and the results /
//! checkpoint locations.

mod cli;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "harrow",
    about = "Sieve for prime factors of factorial, primorial and compositorial prime candidates"
)]
struct Cli {
    /// Append-only results log
    #[arg(long, default_value = "factors.txt")]
    results: PathBuf,

    /// Directory holding the stateA.ckp / stateB.ckp checkpoint pair
    #[arg(long, default_value = ".")]
    state_dir: PathBuf,

    /// Number of rayon worker threads (defaults to all logical cores)
    #[arg(long)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

/// The search window, shared by all three modes.
#[derive(Args)]
struct RangeArgs {
    /// Start of the prime window p (inclusive, >= 3; for factorial and
    /// primorial also >= nmin, since p <= n never divides)
    #[arg(long, value_parser = clap::value_parser!(u64).range(3..))]
    pmin: u64,

    /// End of the prime window P (exclusive, <= 2^64 - 1)
    #[arg(long)]
    pmax: u64,

    /// Start of the exponent window n (inclusive, >= 101)
    #[arg(long, value_parser = clap::value_parser!(u32).range(101..=0x7FFF_FFFE))]
    nmin: u32,

    /// End of the exponent window N (exclusive, < 2^31)
    #[arg(long, value_parser = clap::value_parser!(u32).range(102..=0x7FFF_FFFF))]
    nmax: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Sieve factors of factorial candidates n! +/- 1
    Factorial(RangeArgs),
    /// Sieve factors of primorial candidates n# +/- 1
    Primorial(RangeArgs),
    /// Sieve factors of compositorial candidates n!/# +/- 1
    Compositorial(RangeArgs),
    /// Run the fixed 12-case regression and report pass/fail per case
    Selftest,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // structured logging: LOG_FORMAT=json for machine ingestion,
    // human-readable stderr otherwise
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_target(false).init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    cli::configure_rayon(cli.threads);
    cli::run(&cli)
}
