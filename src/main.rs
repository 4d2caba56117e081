//! # PGAS Comparison Harness - Main Entry Point
//!
//! Runs every configured implementation's benchmark driver under the
//! parallel launcher and writes baseline-normalized comparison reports.
//!
//! ## Flow
//!
//! 1. **Initialize logging**: colored console output, optional log file
//! 2. **Build the configuration**: built-in defaults, an optional JSON
//!    file, then command-line overrides, validated before anything runs
//! 3. **Recreate the report directory**
//! 4. **Measure**: `median_n` trials per implementation and primitive,
//!    latency-only primitives first, then bandwidth sweeps
//! 5. **Write reports**: `latency.csv`, one `bw_<primitive>.csv` per
//!    bandwidth primitive, and `summary.json`
//!
//! ## Error Handling
//!
//! The first failed launch or unparseable output aborts the run with a
//! non-zero exit status. No comparison file is written for a failed run.

use anyhow::Result;
use clap::Parser;
use pgas_bench::{
    cli::CompareArgs, logging, ComparisonHarness, HarnessConfig, ProcessLauncher,
};
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CompareArgs::parse();
    let _log_guard = logging::init(Level::INFO, args.verbose, args.log_file.as_deref())?;

    info!("Starting PGAS comparison harness v{}", pgas_bench::VERSION);

    let config = HarnessConfig::from_args(&args)?;
    let launcher = ProcessLauncher::new(config.launcher.clone());
    let harness = ComparisonHarness::new(config, launcher);

    match harness.run().await {
        Ok(report) => {
            info!(
                "Compared {} latency primitive(s) and {} bandwidth primitive(s)",
                report.latency.len(),
                report.bandwidth.len()
            );
            Ok(())
        }
        Err(e) => {
            error!("Comparison failed: {}", e);
            Err(e.into())
        }
    }
}
