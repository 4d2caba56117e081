//! # Primitive Benchmark Driver
//!
//! Times one primitive on every peer of a symmetric world and prints the
//! result from rank 0 in the line format [`crate::extract`] reads back.
//!
//! ## Timing protocol
//!
//! Every measurement, and every message size of a sweep, follows the same
//! five steps:
//!
//! 1. `barrier_all` so all peers start together, then start the clock
//! 2. exactly `ntimes` operations with no synchronization in between
//! 3. `quiet`, so outstanding non-blocking operations are locally complete
//! 4. `barrier_all` again, so the clock stops only once the slowest peer is done
//! 5. elapsed time / `ntimes` is the per-operation average
//!
//! Skipping step 3 would stop the clock while data is still in flight and
//! understate latency; skipping step 4 would make each peer report a
//! different number.

pub mod local;

use crate::primitive::{Category, Primitive};
use std::hint::black_box;
use std::io::{self, Write};
use std::time::{Duration, Instant};

pub use local::{LocalPe, LocalWorld};

/// Mebibyte, the bandwidth unit
pub const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Operations a symmetric communication library offers to one peer
///
/// Remote operations name their target peer by rank. `quiet` must not
/// return until every non-blocking operation this peer issued is complete.
pub trait SymmetricContext {
    fn my_pe(&self) -> usize;
    fn n_pes(&self) -> usize;

    /// Human-readable backend name for the information block
    fn backend_name(&self) -> String;

    fn barrier_all(&self);
    fn quiet(&mut self);

    fn atomic_fetch(&self, pe: usize) -> i64;
    fn atomic_add(&self, value: i64, pe: usize);
    fn atomic_compare_swap(&self, cond: i64, value: i64, pe: usize) -> i64;
    fn atomic_inc(&self, pe: usize);
    fn atomic_swap(&self, value: i64, pe: usize) -> i64;
    fn atomic_set(&self, value: i64, pe: usize);

    /// Blocking copy of `dest.len()` bytes from `pe`'s symmetric buffer.
    fn get(&self, dest: &mut [u8], pe: usize);
    /// Blocking copy of `src` into `pe`'s symmetric buffer.
    fn put(&self, src: &[u8], pe: usize);
    /// Start fetching `len` bytes from `pe`; completes at `quiet`.
    fn get_nbi(&mut self, len: usize, pe: usize);
    /// Start writing `src` to `pe`; completes at `quiet`.
    fn put_nbi(&mut self, src: &[u8], pe: usize);
}

/// Elapsed time of one timed loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub elapsed: Duration,
    pub ntimes: usize,
}

impl Timing {
    pub fn total_us(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1_000_000.0
    }

    pub fn avg_us(&self) -> f64 {
        self.total_us() / self.ntimes as f64
    }
}

/// Timed loop for one message size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeTiming {
    pub size: usize,
    pub timing: Timing,
}

impl SizeTiming {
    pub fn latency_us(&self) -> f64 {
        self.timing.avg_us()
    }

    /// Bandwidth in MiB/s, or `None` when the clock did not advance.
    pub fn bandwidth_mibps(&self) -> Option<f64> {
        let secs = self.timing.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        let bytes = (self.size * self.timing.ntimes) as f64;
        Some(bytes / secs / BYTES_PER_MIB)
    }
}

/// What one driver run measured
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Latency(Timing),
    Sweep(Vec<SizeTiming>),
}

/// Run `op` under the five-step protocol and return the elapsed time.
pub fn timed<C, F>(ctx: &mut C, ntimes: usize, mut op: F) -> Timing
where
    C: SymmetricContext + ?Sized,
    F: FnMut(&mut C),
{
    ctx.barrier_all();
    let start = Instant::now();

    for _ in 0..ntimes {
        op(ctx);
    }

    ctx.quiet();
    ctx.barrier_all();
    Timing {
        elapsed: start.elapsed(),
        ntimes,
    }
}

/// Peer the data-movement primitives talk to.
fn partner(ctx: &impl SymmetricContext) -> usize {
    (ctx.my_pe() + 1) % ctx.n_pes()
}

/// Atomics all target rank 0, so every peer contends on one word.
const ATOMIC_TARGET: usize = 0;

/// Time `primitive` on this peer. Every peer must call this collectively.
pub fn measure<C: SymmetricContext>(
    ctx: &mut C,
    primitive: Primitive,
    ntimes: usize,
    sizes: &[usize],
) -> Measurement {
    let rank = ctx.my_pe() as i64;

    match primitive {
        Primitive::Barrier => Measurement::Latency(timed(ctx, ntimes, |c| c.barrier_all())),
        Primitive::AtomicFetch => Measurement::Latency(timed(ctx, ntimes, |c| {
            black_box(c.atomic_fetch(ATOMIC_TARGET));
        })),
        Primitive::AtomicAdd => Measurement::Latency(timed(ctx, ntimes, |c| {
            c.atomic_add(1, ATOMIC_TARGET)
        })),
        // Each peer tries to swap its rank in while the word is still 0.
        Primitive::AtomicCmpSwp => Measurement::Latency(timed(ctx, ntimes, |c| {
            black_box(c.atomic_compare_swap(0, rank, ATOMIC_TARGET));
        })),
        Primitive::AtomicInc => Measurement::Latency(timed(ctx, ntimes, |c| {
            c.atomic_inc(ATOMIC_TARGET)
        })),
        Primitive::AtomicSwap => Measurement::Latency(timed(ctx, ntimes, |c| {
            black_box(c.atomic_swap(rank, ATOMIC_TARGET));
        })),
        Primitive::AtomicSet => Measurement::Latency(timed(ctx, ntimes, |c| {
            c.atomic_set(rank, ATOMIC_TARGET)
        })),
        Primitive::Get | Primitive::Put | Primitive::GetNbi | Primitive::PutNbi => {
            Measurement::Sweep(sweep(ctx, primitive, ntimes, sizes))
        }
    }
}

fn sweep<C: SymmetricContext>(
    ctx: &mut C,
    primitive: Primitive,
    ntimes: usize,
    sizes: &[usize],
) -> Vec<SizeTiming> {
    let max = sizes.iter().copied().max().unwrap_or(0);
    let target = partner(&*ctx);
    let src = vec![1u8; max];
    let mut dest = vec![0u8; max];

    ctx.barrier_all();
    sizes
        .iter()
        .map(|&size| {
            let timing = match primitive {
                Primitive::Get => timed(ctx, ntimes, |c| {
                    c.get(&mut dest[..size], target);
                    black_box(&dest);
                }),
                Primitive::Put => timed(ctx, ntimes, |c| c.put(&src[..size], target)),
                Primitive::GetNbi => timed(ctx, ntimes, |c| c.get_nbi(size, target)),
                _ => timed(ctx, ntimes, |c| c.put_nbi(&src[..size], target)),
            };
            SizeTiming { size, timing }
        })
        .collect()
}

/// Parameters echoed in the information block
#[derive(Debug, Clone)]
pub struct RunInfo<'a> {
    pub backend: String,
    pub n_pes: usize,
    pub primitive: Primitive,
    pub ntimes: usize,
    pub sizes: &'a [usize],
}

const RULE: &str = "==============================================";

/// Print the "Test Information" block.
///
/// Nothing in it may look like a latency figure (no number with two or more
/// fractional digits), since the extractor takes the first one it sees.
pub fn write_information(out: &mut dyn Write, info: &RunInfo<'_>) -> io::Result<()> {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "===          Test Information              ===")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "  Backend:                {}", info.backend)?;
    writeln!(out, "  Driver Version:         {}", crate::VERSION)?;
    writeln!(out, "  Number of PEs:          {}", info.n_pes)?;
    writeln!(out, "  Benchmark:              {}", info.primitive)?;
    if info.primitive.uses_msg_size() {
        if let (Some(min), Some(max)) = (info.sizes.iter().min(), info.sizes.iter().max()) {
            writeln!(out, "  Min Msg Size (bytes):   {}", min)?;
            writeln!(out, "  Max Msg Size (bytes):   {}", max)?;
        }
    }
    writeln!(out, "  Ntimes:                 {}", info.ntimes)
}

/// Print the "Benchmark Results" block for rank 0.
pub fn write_results(
    out: &mut dyn Write,
    primitive: Primitive,
    measurement: &Measurement,
) -> io::Result<()> {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "===          Benchmark Results             ===")?;
    writeln!(out, "{}", RULE)?;

    match measurement {
        Measurement::Latency(timing) => writeln!(
            out,
            "Avg Time per {} (us): {:.8} ({:.2} total us)",
            primitive.operation_label(),
            timing.avg_us(),
            timing.total_us()
        ),
        Measurement::Sweep(points) => {
            writeln!(out, "size (b)\t\tlatency (us)\t\t\tbandwidth (MiB/s)")?;
            for point in points {
                // Without a bandwidth figure the line still carries the
                // size and latency, so every size yields a data point.
                match point.bandwidth_mibps() {
                    Some(bandwidth) => writeln!(
                        out,
                        "{}\t\t\t{:>10.4}\t\t\t{:>15.2}",
                        point.size,
                        point.latency_us(),
                        bandwidth
                    )?,
                    None => writeln!(out, "{}\t\t\t{:>10.4}", point.size, point.latency_us())?,
                }
            }
            Ok(())
        }
    }
}

/// Run one primitive on this peer and, on rank 0, print the report.
///
/// Collective: every peer of the world must call it with the same arguments.
pub fn run_driver<C: SymmetricContext>(
    ctx: &mut C,
    primitive: Primitive,
    ntimes: usize,
    sizes: &[usize],
    out: &mut dyn Write,
) -> io::Result<Measurement> {
    let is_root = ctx.my_pe() == 0;
    if is_root {
        write_information(
            out,
            &RunInfo {
                backend: ctx.backend_name(),
                n_pes: ctx.n_pes(),
                primitive,
                ntimes,
                sizes,
            },
        )?;
    }

    let measurement = measure(ctx, primitive, ntimes, sizes);
    debug_assert_eq!(
        matches!(measurement, Measurement::Sweep(_)),
        primitive.category() == Category::BandwidthSweep
    );

    if is_root {
        write_results(out, primitive, &measurement)?;
        out.flush()?;
    }
    ctx.barrier_all();
    Ok(measurement)
}
