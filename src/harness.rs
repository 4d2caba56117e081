//! # Comparison Harness
//!
//! Drives every configured implementation through every configured
//! primitive, reduces each pair to a median, and normalizes the results
//! against the baseline (the first implementation).
//!
//! ## Execution model
//!
//! The harness is strictly sequential. It launches one multi-process job at
//! a time and waits for it to exit before starting the next, so no two
//! implementations or primitives ever compete for the network or the cores.
//!
//! ## Failure policy
//!
//! All or nothing. Configuration is validated before the first launch; after
//! that, the first failed launch or unparsable output aborts the whole run.
//! Report files are written only once every measurement is in, so an aborted
//! run leaves an empty report directory rather than a partial one.

use crate::aggregate::TrialAggregator;
use crate::cli::CompareArgs;
use crate::error::{HarnessError, HarnessResult};
use crate::extract::BandwidthPoint;
use crate::launcher::Launcher;
use crate::primitive::{powers_of_two, Category, Primitive};
use crate::report::{
    BandwidthTable, ComparisonReport, ComparisonRow, ReportWriter, RunMetadata, RunSummary,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// How an implementation expects its arguments
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgStyle {
    /// `--bench <name> --ntimes N [--msg-size-max M]`
    #[default]
    Standard,
    /// `--bench shmem_<name> --benchtype latency --ntimes N [--min 1 --max M]`
    Legacy,
}

/// One independently invocable implementation under test
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Column label in reports, e.g. `C`, `RS`, `Py`
    pub label: String,
    /// Program and any fixed leading arguments
    pub command: Vec<String>,
    #[serde(default)]
    pub style: ArgStyle,
}

impl Implementation {
    pub fn new(label: &str, command: &[&str], style: ArgStyle) -> Self {
        Self {
            label: label.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            style,
        }
    }

    fn bench_args(&self, primitive: Primitive, ntimes: usize) -> Vec<String> {
        let mut argv = self.command.clone();
        match self.style {
            ArgStyle::Standard => {
                argv.extend([
                    "--bench".to_string(),
                    primitive.cli_name().to_string(),
                    "--ntimes".to_string(),
                    ntimes.to_string(),
                ]);
            }
            ArgStyle::Legacy => {
                argv.extend([
                    "--bench".to_string(),
                    primitive.routine_name().to_string(),
                    "--benchtype".to_string(),
                    "latency".to_string(),
                    "--ntimes".to_string(),
                    ntimes.to_string(),
                ]);
            }
        }
        argv
    }

    /// Command line for a latency-only primitive.
    pub fn latency_args(&self, primitive: Primitive, ntimes: usize) -> Vec<String> {
        self.bench_args(primitive, ntimes)
    }

    /// Command line for a bandwidth sweep over powers of two up to
    /// `msg_size_max`.
    ///
    /// Legacy drivers take an inclusive `--max`, so they are given the largest
    /// power of two not above `msg_size_max`; both styles then enumerate the
    /// same sizes.
    pub fn bandwidth_args(
        &self,
        primitive: Primitive,
        ntimes: usize,
        msg_size_max: usize,
    ) -> Vec<String> {
        let mut argv = self.bench_args(primitive, ntimes);
        match self.style {
            ArgStyle::Standard => {
                argv.extend(["--msg-size-max".to_string(), msg_size_max.to_string()]);
            }
            ArgStyle::Legacy => {
                let max = powers_of_two(msg_size_max).last().copied().unwrap_or(1);
                argv.extend([
                    "--min".to_string(),
                    "1".to_string(),
                    "--max".to_string(),
                    max.to_string(),
                ]);
            }
        }
        argv
    }
}

/// Parameters for the latency-only primitives
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySettings {
    pub ntimes: usize,
    pub primitives: Vec<Primitive>,
}

impl Default for LatencySettings {
    fn default() -> Self {
        Self {
            ntimes: crate::defaults::LATENCY_NTIMES,
            primitives: vec![
                Primitive::Barrier,
                Primitive::AtomicFetch,
                Primitive::AtomicAdd,
                Primitive::AtomicCmpSwp,
                Primitive::AtomicInc,
            ],
        }
    }
}

/// Parameters for the bandwidth-sweep primitives
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthSettings {
    pub ntimes: usize,
    /// Sizes run over the powers of two up to and including this value
    pub msg_size_max: usize,
    pub primitives: Vec<Primitive>,
}

impl Default for BandwidthSettings {
    fn default() -> Self {
        Self {
            ntimes: crate::defaults::BANDWIDTH_NTIMES,
            msg_size_max: crate::defaults::BANDWIDTH_MSG_SIZE_MAX,
            primitives: vec![Primitive::Get, Primitive::Put],
        }
    }
}

/// Complete harness configuration
///
/// Built once and passed to [`ComparisonHarness::new`]. The first entry of
/// `implementations` is the baseline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Recreated from scratch at the start of every run
    pub report_dir: PathBuf,
    /// Trials per (primitive, implementation); must be odd
    pub median_n: usize,
    pub latency: LatencySettings,
    pub bandwidth: BandwidthSettings,
    /// Parallel-job launcher prepended to every driver command
    pub launcher: Vec<String>,
    pub implementations: Vec<Implementation>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from(crate::defaults::REPORT_DIR),
            median_n: crate::defaults::MEDIAN_N,
            latency: LatencySettings::default(),
            bandwidth: BandwidthSettings::default(),
            launcher: crate::defaults::LAUNCHER
                .iter()
                .map(|s| s.to_string())
                .collect(),
            implementations: vec![
                Implementation::new("C", &["shmembench"], ArgStyle::Legacy),
                Implementation::new("RS", &["pgas-bench"], ArgStyle::Standard),
                Implementation::new("Py", &["python", "./py/main.py"], ArgStyle::Standard),
            ],
        }
    }
}

impl HarnessConfig {
    /// Load a JSON configuration; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> HarnessResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Build the configuration from command-line overrides.
    ///
    /// Without any flag this is exactly [`HarnessConfig::default`].
    pub fn from_args(args: &CompareArgs) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_json_file(path)
                .with_context(|| format!("Failed to load harness config from {:?}", path))?,
            None => Self::default(),
        };

        if let Some(ref dir) = args.report_dir {
            config.report_dir = dir.clone();
        }
        if let Some(n) = args.median_n {
            config.median_n = n;
        }
        if let Some(n) = args.ntimes {
            config.latency.ntimes = n;
        }
        if let Some(n) = args.bw_ntimes {
            config.bandwidth.ntimes = n;
        }
        if let Some(max) = args.msg_size_max {
            config.bandwidth.msg_size_max = max;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject anything that would fail part-way through a run.
    pub fn validate(&self) -> HarnessResult<()> {
        let invalid = |msg: String| Err(HarnessError::InvalidConfig(msg));

        if self.median_n == 0 || self.median_n % 2 == 0 {
            return invalid(format!("median_n must be odd, got {}", self.median_n));
        }
        if self.implementations.is_empty() {
            return invalid("at least one implementation is required".to_string());
        }
        let mut seen = HashSet::new();
        for imp in &self.implementations {
            if imp.command.is_empty() || imp.command.iter().all(|s| s.trim().is_empty()) {
                return invalid(format!("implementation '{}' has no command", imp.label));
            }
            if !seen.insert(imp.label.as_str()) {
                return invalid(format!("duplicate implementation label '{}'", imp.label));
            }
        }
        if self.latency.ntimes == 0 || self.bandwidth.ntimes == 0 {
            return invalid("ntimes must be at least 1".to_string());
        }
        if self.bandwidth.msg_size_max == 0 {
            return invalid("msg_size_max must be at least 1".to_string());
        }
        if let Some(p) = self
            .latency
            .primitives
            .iter()
            .find(|p| p.category() != Category::LatencyOnly)
        {
            return invalid(format!("'{}' is not a latency-only primitive", p));
        }
        if let Some(p) = self
            .bandwidth
            .primitives
            .iter()
            .find(|p| p.category() != Category::BandwidthSweep)
        {
            return invalid(format!("'{}' is not a bandwidth primitive", p));
        }
        Ok(())
    }

    pub fn labels(&self) -> Vec<String> {
        self.implementations
            .iter()
            .map(|imp| imp.label.clone())
            .collect()
    }
}

/// Single source of truth for the run banner.
struct HarnessConfigDisplay<'a>(&'a HarnessConfig);

impl<'a> fmt::Display for HarnessConfigDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0;
        let names = |ps: &[Primitive]| {
            ps.iter()
                .map(|p| p.cli_name())
                .collect::<Vec<_>>()
                .join(", ")
        };

        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Comparing {} implementation(s)", config.implementations.len())?;
        for (i, imp) in config.implementations.iter().enumerate() {
            let role = if i == 0 { " (baseline)" } else { "" };
            writeln!(f, "  {:<6}{} {}", imp.label, role, imp.command.join(" "))?;
        }
        writeln!(f, "  Launcher:           {}", config.launcher.join(" "))?;
        writeln!(f, "  Trials (median of): {}", config.median_n)?;
        writeln!(
            f,
            "  Latency:            ntimes={} [{}]",
            config.latency.ntimes,
            names(&config.latency.primitives)
        )?;
        writeln!(
            f,
            "  Bandwidth:          ntimes={} max={} bytes [{}]",
            config.bandwidth.ntimes,
            config.bandwidth.msg_size_max,
            names(&config.bandwidth.primitives)
        )?;
        writeln!(f, "  Report directory:   {:?}", config.report_dir)?;
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Runs the comparison across all implementations
pub struct ComparisonHarness<L: Launcher> {
    config: HarnessConfig,
    launcher: L,
}

impl<L: Launcher> ComparisonHarness<L> {
    pub fn new(config: HarnessConfig, launcher: L) -> Self {
        Self { config, launcher }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    fn aggregator(&self) -> TrialAggregator<'_> {
        TrialAggregator::new(&self.launcher, self.config.median_n)
    }

    /// Measure every configured primitive without touching the filesystem.
    pub async fn measure(&self) -> HarnessResult<ComparisonReport> {
        self.config.validate()?;
        info!("{}", HarnessConfigDisplay(&self.config));

        let mut report = ComparisonReport::default();
        for &primitive in &self.config.latency.primitives {
            report.latency.push(self.compare_latency(primitive).await?);
        }
        for &primitive in &self.config.bandwidth.primitives {
            report.bandwidth.push(self.compare_bandwidth(primitive).await?);
        }
        Ok(report)
    }

    /// Recreate the report directory, measure everything, then write it out.
    pub async fn run(&self) -> HarnessResult<ComparisonReport> {
        self.config.validate()?;
        let writer = ReportWriter::prepare(&self.config.report_dir, self.config.labels())?;

        let report = self.measure().await?;

        writer.write_report(&report)?;
        writer.write_summary(&RunSummary {
            metadata: RunMetadata::new(),
            config: self.config.clone(),
            report: report.clone(),
        })?;
        info!("Comparison written to {:?}", writer.dir());
        Ok(report)
    }

    /// Median latency of every implementation for one primitive.
    pub async fn compare_latency(&self, primitive: Primitive) -> HarnessResult<ComparisonRow> {
        info!("Comparing latency of {}", primitive.routine_name());
        let aggregator = self.aggregator();
        let mut raw = Vec::with_capacity(self.config.implementations.len());

        for imp in &self.config.implementations {
            let argv = imp.latency_args(primitive, self.config.latency.ntimes);
            let latency = aggregator.latency(&argv).await?;
            info!("  {:<6} {:.4} us", imp.label, latency);
            raw.push(latency);
        }

        Ok(ComparisonRow::new(primitive, None, raw))
    }

    /// Per-size median sweeps of every implementation for one primitive.
    ///
    /// Sweeps are aligned by position; sizes are taken from the baseline.
    pub async fn compare_bandwidth(&self, primitive: Primitive) -> HarnessResult<BandwidthTable> {
        info!("Comparing bandwidth of {}", primitive.routine_name());
        let aggregator = self.aggregator();
        let settings = &self.config.bandwidth;
        let mut sweeps: Vec<Vec<BandwidthPoint>> = Vec::new();

        for imp in &self.config.implementations {
            let argv = imp.bandwidth_args(primitive, settings.ntimes, settings.msg_size_max);
            let points = aggregator.bandwidth(&argv).await?;
            info!("  {:<6} {} message sizes", imp.label, points.len());

            if let Some(baseline) = sweeps.first() {
                if baseline.len() != points.len() {
                    return Err(HarnessError::SizeMismatch {
                        context: format!("{} sweep of {}", primitive, imp.label),
                        expected: baseline.len(),
                        actual: points.len(),
                    });
                }
            }
            sweeps.push(points);
        }

        let rows = match sweeps.first() {
            Some(baseline) => baseline
                .iter()
                .enumerate()
                .map(|(idx, point)| {
                    let raw = sweeps.iter().map(|s| s[idx].latency_us).collect();
                    ComparisonRow::new(primitive, Some(point.size), raw)
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(BandwidthTable { primitive, rows })
    }
}
