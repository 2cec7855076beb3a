//! # Search — The Orchestrator
//!
//! Drives the whole sieve: validates the job, resumes from the freshest
//! checkpoint, builds and verifies the product tables, then walks p-windows
//! across [p_min, p_max). Each window is generated, loaded into the batch
//! evaluator, pushed through chunked setup and iterate spans, and folded by
//! the check stage. Factors accumulate in the evaluator's ring across
//! windows and are drained — sorted, slow-verified, primality-filtered,
//! logged — at checkpoint boundaries and at end-of-run.
//!
//! Chunk sizes are profiled once at first use: the first setup span and the
//! first iterate span are timed and rescaled toward ~10–20 ms per call, and
//! the generator probe sizes the p-window. Tuning affects throughput and
//! cancellation latency only; every result is independent of the chunking.
//!
//! Fatal conditions (ring overflow, sizing overflow, table verification,
//! factor verification) abort with a diagnostic. Checkpoint write failures
//! are logged and skipped; the run continues.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::checkpoint::{self, WorkStatus};
use crate::evaluator::{Evaluator, ThreadPoolEval};
use crate::primegen;
use crate::products::{self, ProductTable};
use crate::progress::Progress;
use crate::report;
use crate::verify;
use crate::Mode;

/// Runtime tuning parameters. Never persisted; rebuilt for every process.
pub struct SearchData {
    /// p-window width per batch; 0 means "probe the generator at start".
    pub range: u64,
    /// Candidate-count estimate the windows are validated against.
    pub psize: u32,
    /// Product-table entries per setup call.
    pub s_step: u32,
    /// Iterate terms per iterate call.
    pub n_step: u32,
    /// Check-stage reduction groups implied by `psize`.
    pub num_groups: u32,
    /// Factor-ring capacity: sized up at low p where hits are dense.
    pub num_results: u32,
    /// Which state file the next checkpoint targets.
    pub write_state_a_next: bool,
    /// Minimum spacing between periodic checkpoints.
    pub ckpt_interval: Duration,
    /// Self-test mode: no checkpoint I/O, results truncated per case.
    pub test: bool,
}

impl SearchData {
    pub fn new(st: &WorkStatus) -> Self {
        let threads = rayon::current_num_threads().max(1) as u32;
        SearchData {
            range: 0,
            psize: 0,
            s_step: 4 * threads,
            n_step: 64 * threads,
            num_groups: 0,
            // low p ranges hit constantly; the ring must absorb a full
            // checkpoint interval of emissions
            num_results: if st.p_min < u64::from(u32::MAX) {
                30_000_000
            } else {
                1_000_000
            },
            write_state_a_next: true,
            ckpt_interval: Duration::from_secs(60),
            test: false,
        }
    }
}

/// Filesystem locations for one run.
pub struct SearchPaths {
    /// Append-only results log (`factors.txt`).
    pub results: PathBuf,
    /// Directory holding `stateA.ckp` / `stateB.ckp`.
    pub state_dir: PathBuf,
}

/// Argument invariants, enforced before any work regardless of how the
/// status was constructed.
pub fn validate(st: &WorkStatus) -> Result<()> {
    if st.p_min < 3 {
        bail!("p_min must be at least 3");
    }
    if st.p_min >= st.p_max {
        bail!("p_min < p_max is required");
    }
    if st.n_min < 101 {
        bail!("n_min must be at least 101");
    }
    if st.n_min >= st.n_max {
        bail!("n_min < n_max is required");
    }
    if st.n_max > (1 << 31) - 1 {
        bail!("n_max must be below 2^31");
    }
    if matches!(st.mode, Mode::Factorial | Mode::Primorial) && st.p_min < u64::from(st.n_min) {
        bail!(
            "for {} mode p_min must be >= n_min: there are no factors with p <= n",
            st.mode
        );
    }
    Ok(())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Rescale a profiled chunk size toward `target_ms`.
fn rescale(step: u32, elapsed_ms: f64, target_ms: f64) -> u32 {
    let factor = target_ms / elapsed_ms.max(0.01);
    ((f64::from(step) * factor) as u32).clamp(1, 1 << 22)
}

/// Size the p-window (probing the generator once when no width is preset),
/// the candidate estimate and the reduction-group count.
fn profile_range(st: &WorkStatus, sd: &mut SearchData) {
    if sd.range == 0 {
        let threads = rayon::current_num_threads().max(1) as u64;
        let probe_width = (threads * 30_000).min(st.p_max - st.p).max(1_000);
        let probe_start = st.p.max(114);

        let t0 = Instant::now();
        let probe =
            primegen::segment_candidates(probe_start, probe_start.saturating_add(probe_width));
        let ms = t0.elapsed().as_secs_f64() * 1e3;
        drop(probe);

        // target ~64 ms of generation per window
        let scaled = (probe_width as f64 * (64.0 / ms.max(0.01))) as u64;
        sd.range = scaled.clamp(30_000, 4_294_900_000);
    }

    sd.psize = primegen::estimate_candidates(st.p, st.p.saturating_add(sd.range))
        .max(64)
        .min(u32::MAX as usize) as u32;
    sd.num_groups = sd.psize / 256 + 1;
}

/// Drain the evaluator, surface its fatal flags, fold its counters into the
/// status, and push the factors through the reporting pipeline.
fn drain_and_report(
    st: &mut WorkStatus,
    sd: &SearchData,
    ev: &mut ThreadPoolEval<'_>,
    verify_terms: &[u32],
    paths: &SearchPaths,
    progress: &Progress,
) -> Result<()> {
    let drain = ev.drain();
    if drain.max_segment > sd.psize {
        bail!(
            "candidate window of {} exceeded the sizing estimate of {}",
            drain.max_segment,
            sd.psize
        );
    }
    if drain.overflowed {
        bail!(
            "factor buffer overflow: more than {} factors in one drain interval",
            sd.num_results
        );
    }
    st.prime_count += drain.prime_count;
    st.checksum = st.checksum.wrapping_add(drain.checksum);
    progress.primes.fetch_add(drain.prime_count, Ordering::Relaxed);

    report::process_factors(st, drain.factors, verify_terms, &paths.results)?;
    progress.factors.store(st.factor_count, Ordering::Relaxed);
    Ok(())
}

/// Execute one job to completion (or until `stop_flag` is raised).
///
/// Resumable: progress persists through the dual checkpoint files unless
/// `sd.test` is set.
pub fn run(
    st: &mut WorkStatus,
    sd: &mut SearchData,
    paths: &SearchPaths,
    stop_flag: Option<&AtomicBool>,
) -> Result<()> {
    validate(st)?;
    st.p = st.p_min;

    info!(
        mode = %st.mode,
        p_min = st.p_min,
        p_max = st.p_max,
        n_min = st.n_min,
        n_max = st.n_max,
        "starting sieve"
    );

    if sd.test {
        std::fs::File::create(&paths.results)?;
    } else if let Some((resumed, write_a)) = checkpoint::read_state(&paths.state_dir, st) {
        *st = resumed;
        sd.write_state_a_next = write_a;
        if st.p == st.p_max {
            info!("work unit already complete");
            return Ok(());
        }
    } else {
        // fresh run: empty results log, stamp the run start
        std::fs::File::create(&paths.results)?;
        st.last_trickle = now_secs();
    }

    profile_range(st, sd);

    let table = ProductTable::build(st.mode, st.n_min, st.n_max);
    products::verify_tables(st.mode, st.n_min, st.n_max, &table)?;
    info!(
        entries = table.entries.len(),
        iter_terms = table.iter_terms.len(),
        "verified product tables"
    );

    let verify_terms = verify::verify_terms(st.mode, st.n_max);

    let progress = Progress::new(st.p_min, st.p_max);
    progress.set_cursor(st.p);
    let reporter = (!sd.test).then(|| progress.start_reporter());

    let result = run_windows(st, sd, paths, stop_flag, &table, &verify_terms, &progress);

    progress.stop();
    if let Some(handle) = reporter {
        let _ = handle.join();
    }
    result
}

fn run_windows(
    st: &mut WorkStatus,
    sd: &mut SearchData,
    paths: &SearchPaths,
    stop_flag: Option<&AtomicBool>,
    table: &ProductTable,
    verify_terms: &[u32],
    progress: &Progress,
) -> Result<()> {
    let mut ev = ThreadPoolEval::new(st.mode, table, sd.num_results);
    let mut setup_profiled = false;
    let mut iterate_profiled = false;
    let mut last_log = Instant::now();
    let mut last_ckpt = Instant::now();

    while st.p < st.p_max {
        let stop = st.p.saturating_add(sd.range).min(st.p_max);

        // assemble the window: injected small primes below 114, wheel
        // candidates from there
        let mut window = Vec::new();
        if st.p < 114 {
            window = primegen::small_primes_in(st.p, stop.min(114));
        }
        let wheel_from = st.p.max(114);
        if stop > wheel_from {
            let mut wheeled = primegen::segment_candidates(wheel_from, stop);
            if window.is_empty() {
                window = wheeled;
            } else {
                window.append(&mut wheeled);
            }
        }

        ev.load(&window);

        // setup: fold the product table into every residue
        let entries = table.entries.len();
        let mut s = 0usize;
        while s < entries {
            let e = (s + sd.s_step as usize).min(entries);
            if !setup_profiled {
                setup_profiled = true;
                let t0 = Instant::now();
                ev.setup(s, e);
                sd.s_step = rescale(sd.s_step, t0.elapsed().as_secs_f64() * 1e3, 20.0);
            } else {
                ev.setup(s, e);
            }
            s = e;
        }

        // iterate: walk n across [n_min, n_max)
        let (mut n, n_limit) = match st.mode {
            Mode::Primorial => (0u32, table.iter_terms.len() as u32),
            _ => (st.n_min, st.n_max),
        };
        while n < n_limit {
            let e = (n + sd.n_step).min(n_limit);
            let pos = if st.mode == Mode::Compositorial {
                table.iter_terms.partition_point(|&t| t < n)
            } else {
                0
            };
            if !iterate_profiled {
                iterate_profiled = true;
                let t0 = Instant::now();
                ev.iterate(n, e, pos);
                sd.n_step = rescale(sd.n_step, t0.elapsed().as_secs_f64() * 1e3, 10.0);
                info!(
                    threads = rayon::current_num_threads(),
                    range = sd.range,
                    psize = sd.psize,
                    s_step = sd.s_step,
                    n_step = sd.n_step,
                    "chunk sizes tuned"
                );
            } else {
                ev.iterate(n, e, pos);
            }
            n = e;
        }

        match st.mode {
            Mode::Primorial => ev.check(n_limit),
            _ => ev.check(st.n_max - 1),
        }

        st.p = stop;
        progress.set_cursor(st.p);

        let stopping = stop_flag.is_some_and(|f| f.load(Ordering::Relaxed));

        if last_log.elapsed() >= Duration::from_secs(2) {
            last_log = Instant::now();
            info!(
                progress = format_args!("{:.1}%", progress.fraction_done() * 100.0),
                p = st.p,
                "sieve progress"
            );
        }

        // drain boundary: periodic checkpoint, or cooperative stop
        if (last_ckpt.elapsed() >= sd.ckpt_interval || stopping) && st.p < st.p_max {
            last_ckpt = Instant::now();
            drain_and_report(st, sd, &mut ev, verify_terms, paths, progress)?;
            if !sd.test {
                sd.write_state_a_next =
                    checkpoint::write_state(&paths.state_dir, st, sd.write_state_a_next);
                info!(p = st.p, "checkpoint");
            }
            if stopping {
                info!(p = st.p, "stop requested, checkpoint written");
                return Ok(());
            }
        }
    }

    // end of run: full drain, final checkpoint, results trailer
    st.p = st.p_max;
    progress.set_cursor(st.p);
    drain_and_report(st, sd, &mut ev, verify_terms, paths, progress)?;
    if !sd.test {
        sd.write_state_a_next = checkpoint::write_state(&paths.state_dir, st, sd.write_state_a_next);
    }
    report::finalize_results(st, &paths.results)?;

    info!(
        factors = st.factor_count,
        primes = st.prime_count,
        checksum = format_args!("{:016X}", st.checksum),
        "sieve complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    //! Validation-rule coverage plus micro-runs of the full orchestrator
    //! against tiny ranges; the heavyweight end-to-end paths (resume,
    //! interruption, results schema) live in `tests/end_to_end.rs`.

    use super::*;

    fn status(mode: Mode) -> WorkStatus {
        WorkStatus::new(mode, 101, 2000, 101, 200)
    }

    // ── Validation ─────────────────────────────────────────────────────

    #[test]
    fn accepts_valid_arguments() {
        validate(&status(Mode::Factorial)).unwrap();
        validate(&status(Mode::Primorial)).unwrap();
        validate(&status(Mode::Compositorial)).unwrap();
    }

    #[test]
    fn rejects_inverted_ranges() {
        let mut st = status(Mode::Factorial);
        st.p_max = st.p_min;
        assert!(validate(&st).is_err());

        let mut st = status(Mode::Factorial);
        st.n_max = st.n_min;
        assert!(validate(&st).is_err());
    }

    #[test]
    fn rejects_out_of_bounds() {
        let mut st = status(Mode::Factorial);
        st.p_min = 2;
        assert!(validate(&st).is_err());

        let mut st = status(Mode::Factorial);
        st.n_min = 100;
        assert!(validate(&st).is_err());

        let mut st = status(Mode::Factorial);
        st.n_max = 1 << 31;
        assert!(validate(&st).is_err());
    }

    /// p_min ≥ n_min binds factorial and primorial but not compositorial.
    #[test]
    fn small_p_only_allowed_for_compositorial() {
        let mut st = WorkStatus::new(Mode::Factorial, 101, 2000, 500, 600);
        assert!(validate(&st).is_err());
        st.mode = Mode::Primorial;
        assert!(validate(&st).is_err());
        st.mode = Mode::Compositorial;
        validate(&st).unwrap();
    }

    // ── Tuning Helpers ─────────────────────────────────────────────────

    #[test]
    fn rescale_targets_ratio() {
        assert_eq!(rescale(100, 10.0, 20.0), 200);
        assert_eq!(rescale(100, 40.0, 20.0), 50);
        // never collapses to zero, never explodes past the cap
        assert_eq!(rescale(1, 10_000.0, 10.0), 1);
        assert!(rescale(1 << 22, 0.0001, 50.0) <= 1 << 22);
    }

    #[test]
    fn num_results_scales_with_p_min() {
        let low = SearchData::new(&WorkStatus::new(Mode::Factorial, 101, 2000, 101, 200));
        assert_eq!(low.num_results, 30_000_000);
        let high = SearchData::new(&WorkStatus::new(
            Mode::Factorial,
            1 << 40,
            (1 << 40) + 1000,
            101,
            200,
        ));
        assert_eq!(high.num_results, 1_000_000);
    }
}
