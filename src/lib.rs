//! # PGAS Benchmark Suite Library
//!
//! Methodology and tooling for comparing implementations of the same
//! symmetric two-process PGAS primitives (barrier, atomics, one-sided
//! get/put) against a baseline implementation.
//!
//! ## Architecture Overview
//!
//! The library is organized into two halves that only meet at a text
//! boundary, the benchmark output line format:
//!
//! - `driver`: Times one primitive across the peers of a symmetric world
//!   and prints the results from rank 0
//! - `extract`: Reads latency and bandwidth numbers back out of that text
//! - `launcher`: Runs a driver command line under the configured launcher
//! - `aggregate`: Repeats measurements and reduces them to a median
//! - `harness`: Configuration and the comparison across implementations
//! - `report`: Baseline-normalized CSV files and the JSON summary
//!
//! Any driver, in any language, that prints the same line format can be
//! compared. The `pgas-bench` binary is one such driver, backed by an
//! in-process world of threads; `pgas-compare` runs the comparison.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use pgas_bench::{ComparisonHarness, HarnessConfig, ProcessLauncher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = HarnessConfig::default();
//!     let launcher = ProcessLauncher::new(config.launcher.clone());
//!     let report = ComparisonHarness::new(config, launcher).run().await?;
//!
//!     for row in &report.latency {
//!         println!("{}: {:?}", row.primitive, row.normalized);
//!     }
//!     Ok(())
//! }
//! ```

/// Trial repetition and median reduction
pub mod aggregate;

/// Command-line arguments for both binaries
pub mod cli;

/// Primitive benchmark driver and the symmetric context it runs on
pub mod driver;

pub mod error;

/// Result extraction from benchmark output text
pub mod extract;

/// Harness configuration and cross-implementation comparison
pub mod harness;

/// Running driver commands under a parallel launcher
pub mod launcher;

pub mod logging;

/// Primitive catalog and message-size sets
pub mod primitive;

/// CSV and JSON reports
pub mod report;

pub use aggregate::{median, median_points, TrialAggregator};
pub use driver::{run_driver, LocalWorld, Measurement, SymmetricContext};
pub use error::{HarnessError, HarnessResult};
pub use extract::{extract_bandwidth_points, extract_latency, BandwidthPoint};
pub use harness::{ArgStyle, ComparisonHarness, HarnessConfig, Implementation};
pub use launcher::{Launcher, ProcessLauncher, ScriptedLauncher};
pub use primitive::{Category, MsgSizeSpec, Primitive};
pub use report::{ComparisonReport, ComparisonRow, ReportWriter};

/// The current version of the PGAS benchmark suite
///
/// Echoed by the driver's information block and recorded in `summary.json`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Iterations for latency-only primitives in a harness run
    pub const LATENCY_NTIMES: usize = 1000;

    /// Iterations for bandwidth primitives in a harness run
    pub const BANDWIDTH_NTIMES: usize = 100;

    /// Largest message size handed to drivers in a harness run
    ///
    /// One byte past 1 MiB; legacy drivers receive the largest power of
    /// two not above it.
    pub const BANDWIDTH_MSG_SIZE_MAX: usize = 1_048_577;

    /// Trials per implementation and primitive
    pub const MEDIAN_N: usize = 7;

    /// Report directory, removed and recreated on every run
    pub const REPORT_DIR: &str = "/tmp/results";

    /// Parallel launcher prefix: two processes, one per hardware thread
    pub const LAUNCHER: &[&str] = &["mpiexec.hydra", "-n", "2", "-bind-to", "hwthread"];

    /// Driver iterations when `--ntimes` is not given
    pub const DRIVER_NTIMES: usize = 1000;

    /// Driver sweep maximum when no size option is given
    pub const DRIVER_MSG_SIZE_MAX: usize = 1 << 20;

    /// Peers in the driver's local world
    pub const PEERS: usize = 2;
}
