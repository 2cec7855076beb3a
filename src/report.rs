//! # Report — From Drained Factors to the Results Log
//!
//! At every drain boundary the emitted factors pass through four gates, in
//! order:
//!
//! 1. **Sort** ascending by p, ties by ascending |n| — the results log is
//!    ordered even though the evaluator's ring is not.
//! 2. **Slow verification** (parallel): every factor is recomputed by the
//!    independent CPU chain. A single disagreement means the fast pipeline
//!    is broken and the run dies — there is nothing to retry.
//! 3. **Primality filter**: the generator emits strong 2-PRPs, so a
//!    composite p can carry a perfectly true divisibility here; it is
//!    discarded with a diagnostic rather than logged. Consecutive entries
//!    for the same p reuse the verdict without retesting.
//! 4. **Append + fold**: survivors are written one line each and
//!    n + c folds into the running work checksum.
//!
//! End-of-run finalization re-counts the log lines against factor_count
//! and appends the checksum line (`%016X`), preceded by `no factors` when
//! nothing was found.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::checkpoint::WorkStatus;
use crate::evaluator::Factor;
use crate::primality::is_prime;
use crate::verify::verify_factor;

/// Sort, verify, filter and log one drained batch, updating factor_count
/// and the checksum in `st`.
pub fn process_factors(
    st: &mut WorkStatus,
    mut factors: Vec<Factor>,
    verify_terms: &[u32],
    results_path: &Path,
) -> Result<()> {
    if factors.is_empty() {
        return Ok(());
    }
    info!(count = factors.len(), "processing factors on CPU");

    factors.sort_unstable_by_key(|f| (f.p, f.n()));

    let mode = st.mode;
    if let Some(f) = factors
        .par_iter()
        .find_any(|f| !verify_factor(f.p, f.n(), f.c(), mode, verify_terms))
    {
        bail!(
            "CPU factor verification failed! {} is not a factor of {}{}{:+}",
            f.p,
            f.n(),
            mode.symbol(),
            f.c()
        );
    }
    info!(count = factors.len(), "verified factors");

    append_verified(st, &factors, results_path)
}

/// The primality gate and the log append. Factors must already be sorted
/// and slow-verified.
fn append_verified(st: &mut WorkStatus, factors: &[Factor], results_path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(results_path)
        .with_context(|| format!("cannot open {}", results_path.display()))?;
    let mut out = BufWriter::new(file);

    let mut last_good_p = 0u64;
    for f in factors {
        if f.p == last_good_p || is_prime(f.p) {
            last_good_p = f.p;
            st.factor_count += 1;
            writeln!(out, "{} | {}{}{:+}", f.p, f.n(), st.mode.symbol(), f.c())
                .with_context(|| format!("cannot write to {}", results_path.display()))?;
            // n + c joins the running work checksum
            st.checksum = st
                .checksum
                .wrapping_add(u64::from(f.n()))
                .wrapping_add(f.c() as u64);
        } else {
            warn!(p = f.p, "discarded 2-PRP factor");
        }
    }
    out.flush()
        .with_context(|| format!("cannot write to {}", results_path.display()))?;
    Ok(())
}

/// End-of-run: validate the log against factor_count and append the final
/// checksum line.
pub fn finalize_results(st: &WorkStatus, results_path: &Path) -> Result<()> {
    if st.factor_count > 0 {
        let file = std::fs::File::open(results_path)
            .with_context(|| format!("cannot open {}", results_path.display()))?;
        let lines = BufReader::new(file).lines().count() as u64;
        if lines < st.factor_count {
            bail!(
                "missing factors in {}: {} lines for {} factors",
                results_path.display(),
                lines,
                st.factor_count
            );
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(results_path)
        .with_context(|| format!("cannot open {}", results_path.display()))?;
    let mut out = BufWriter::new(file);
    if st.factor_count == 0 {
        writeln!(out, "no factors")?;
    }
    writeln!(out, "{:016X}", st.checksum)?;
    out.flush()?;
    Ok(())
}
