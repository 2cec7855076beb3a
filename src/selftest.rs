//! # Selftest — The Fixed 12-Case End-to-End Regression
//!
//! Twelve literal (mode, p-range, n-range) → (factor_count, prime_count,
//! checksum) fixtures covering all three modes, small and large p, and
//! small and large n. The expected values are reproducible bit-exactly on
//! any conforming build; a single mismatched counter or checksum bit means
//! a correctness defect somewhere in the pipeline.
//!
//! Self-test runs never touch checkpoint state and truncate the results
//! log per case.

use anyhow::{bail, Result};
use std::time::Instant;
use tracing::{error, info};

use crate::checkpoint::WorkStatus;
use crate::search::{self, SearchData, SearchPaths};
use crate::Mode;

pub struct Case {
    pub mode: Mode,
    pub p_min: u64,
    pub p_max: u64,
    pub n_min: u32,
    pub n_max: u32,
    pub factor_count: u64,
    pub prime_count: u64,
    pub checksum: u64,
}

pub const CASES: [Case; 12] = [
    Case {
        mode: Mode::Factorial,
        p_min: 100_000_000,
        p_max: 101_000_000,
        n_min: 1_000_000,
        n_max: 2_000_000,
        factor_count: 1071,
        prime_count: 54211,
        checksum: 0x000004F844B5103C,
    },
    Case {
        mode: Mode::Factorial,
        p_min: 1_000_000_000_000,
        p_max: 1_000_010_000_000,
        n_min: 10_000,
        n_max: 2_000_000,
        factor_count: 3,
        prime_count: 361_727,
        checksum: 0x0505A1C238896511,
    },
    Case {
        mode: Mode::Factorial,
        p_min: 101,
        p_max: 100_000,
        n_min: 101,
        n_max: 1_000_000,
        factor_count: 42_821,
        prime_count: 9571,
        checksum: 0x0000000065DDB8A0,
    },
    Case {
        mode: Mode::Factorial,
        p_min: 1_000_000_000_000,
        p_max: 1_000_001_000_000,
        n_min: 100_000_000,
        n_max: 110_000_000,
        factor_count: 3,
        prime_count: 36_249,
        checksum: 0x00804FE7D7AA6C09,
    },
    Case {
        mode: Mode::Primorial,
        p_min: 100_000_000,
        p_max: 101_000_000,
        n_min: 101,
        n_max: 25_000_000,
        factor_count: 1703,
        prime_count: 54_211,
        checksum: 0x0000027EFF497990,
    },
    Case {
        mode: Mode::Primorial,
        p_min: 101,
        p_max: 2_000_000,
        n_min: 101,
        n_max: 2_000_000,
        factor_count: 24_503,
        prime_count: 148_954,
        checksum: 0x000000027BF5B8E0,
    },
    Case {
        mode: Mode::Primorial,
        p_min: 100_000_000_000,
        p_max: 100_005_000_000,
        n_min: 9_000_000,
        n_max: 110_000_000,
        factor_count: 32,
        prime_count: 197_222,
        checksum: 0x0022FE7C09210B4B,
    },
    Case {
        mode: Mode::Primorial,
        p_min: 1_730_720_716_000_000,
        p_max: 1_730_720_720_000_000,
        n_min: 600_000,
        n_max: 30_000_000,
        factor_count: 1,
        prime_count: 114_208,
        checksum: 0x5CDCB47F7E9532C2,
    },
    Case {
        mode: Mode::Compositorial,
        p_min: 200_000_000,
        p_max: 200_010_000,
        n_min: 101,
        n_max: 26_000_000,
        factor_count: 127,
        prime_count: 529,
        checksum: 0x0000001848D8AFBB,
    },
    Case {
        mode: Mode::Compositorial,
        p_min: 101,
        p_max: 100_000,
        n_min: 101,
        n_max: 1_000_000,
        factor_count: 34_271,
        prime_count: 9571,
        checksum: 0x000000006FF88EAE,
    },
    Case {
        mode: Mode::Compositorial,
        p_min: 200_000_000_000,
        p_max: 200_005_000_000,
        n_min: 15_000_000,
        n_max: 20_000_000,
        factor_count: 13,
        prime_count: 192_386,
        checksum: 0x0088B59C23CD3E2B,
    },
    Case {
        mode: Mode::Compositorial,
        p_min: 1_000_000_000_000,
        p_max: 1_000_001_000_000,
        n_min: 700_000,
        n_max: 25_000_000,
        factor_count: 2,
        prime_count: 36_249,
        checksum: 0x0080997AF3BF42FE,
    },
];

/// Run all twelve cases, logging a verdict for each. Errors if any case
/// fails or dies.
pub fn run(paths: &SearchPaths) -> Result<()> {
    info!("beginning self test of {} ranges", CASES.len());
    let started = Instant::now();
    let mut good = 0usize;

    for (i, case) in CASES.iter().enumerate() {
        let num = i + 1;
        info!(
            case = num,
            mode = %case.mode,
            p_min = case.p_min,
            p_max = case.p_max,
            n_min = case.n_min,
            n_max = case.n_max,
            "self test case"
        );
        let mut st = WorkStatus::new(case.mode, case.p_min, case.p_max, case.n_min, case.n_max);
        let mut sd = SearchData::new(&st);
        sd.test = true;
        search::run(&mut st, &mut sd, paths, None)?;

        if st.factor_count == case.factor_count
            && st.prime_count == case.prime_count
            && st.checksum == case.checksum
        {
            info!(case = num, "test case passed");
            good += 1;
        } else {
            error!(
                case = num,
                factors = st.factor_count,
                expected_factors = case.factor_count,
                primes = st.prime_count,
                expected_primes = case.prime_count,
                checksum = format_args!("{:016X}", st.checksum),
                expected_checksum = format_args!("{:016X}", case.checksum),
                "test case failed"
            );
        }
    }

    info!(
        elapsed_secs = started.elapsed().as_secs(),
        passed = good,
        total = CASES.len(),
        "self test finished"
    );
    if good != CASES.len() {
        bail!("self test FAILED: {}/{} cases passed", good, CASES.len());
    }
    info!("all test cases completed successfully");
    Ok(())
}
