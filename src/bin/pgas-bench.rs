//! # PGAS Primitive Benchmark Driver
//!
//! Times one primitive on an in-process symmetric world and prints the
//! results on stdout in the line format the comparison harness extracts.
//! Logs go to stderr.
//!
//! When started by a parallel launcher, every copy except rank 0 exits
//! immediately: the local world already runs all of its peers inside the
//! rank-0 process.

use anyhow::{Context, Result};
use clap::Parser;
use pgas_bench::cli::{BenchType, DriverArgs};
use pgas_bench::driver::{local::launcher_rank, run_driver, LocalWorld};
use pgas_bench::logging;
use pgas_bench::primitive::MsgSizeSpec;
use std::io::{self, Write};
use tracing::{debug, info, warn, Level};

fn main() -> Result<()> {
    let args = DriverArgs::parse();
    let _log_guard = logging::init(Level::WARN, args.verbose, None)?;

    if let Some(rank) = launcher_rank().filter(|&rank| rank != 0) {
        debug!("Launcher rank {} has nothing to do; rank 0 runs every peer", rank);
        return Ok(());
    }

    if args.benchtype == Some(BenchType::Bandwidth) && !args.routine.uses_msg_size() {
        warn!("{} has no bandwidth mode; reporting latency", args.routine);
    }
    if args.ntimes == 0 {
        anyhow::bail!("--ntimes must be at least 1");
    }

    let sizes = if args.routine.uses_msg_size() {
        MsgSizeSpec::from_options(
            args.msg_size_max,
            args.msg_sizes.clone(),
            args.min,
            args.max,
        )?
        .unwrap_or_default()
        .sizes()?
    } else {
        Vec::new()
    };
    let heap_size = sizes.iter().copied().max().unwrap_or(1);

    info!(
        "Running {} with {} peers, {} iterations",
        args.routine, args.peers, args.ntimes
    );

    let world = LocalWorld::new(args.peers, heap_size)?;
    let outputs = world.run(|mut pe| {
        let mut out = Vec::new();
        run_driver(&mut pe, args.routine, args.ntimes, &sizes, &mut out).map(|_| out)
    });

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    for output in outputs {
        let output = output.context("Failed to format benchmark output")?;
        stdout
            .write_all(&output)
            .context("Failed to write benchmark output")?;
    }
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}
