//! # Comparison Reports
//!
//! Comparison rows and the files they are written to. One CSV holds every
//! latency-only primitive; each bandwidth primitive gets its own CSV with
//! one row per message size. A `summary.json` next to them carries the same
//! rows plus run metadata.
//!
//! Numbers are written with a fixed ten fractional digits so repeated runs
//! over identical measurements produce byte-identical CSV files.

use crate::error::{HarnessError, HarnessResult};
use crate::harness::HarnessConfig;
use crate::primitive::Primitive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// File holding every latency-only primitive
pub const LATENCY_FILE: &str = "latency.csv";

/// Machine-readable copy of the whole run
pub const SUMMARY_FILE: &str = "summary.json";

/// One compared measurement across all implementations.
///
/// `raw` and `normalized` are indexed by implementation, baseline first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub primitive: Primitive,
    pub msg_size: Option<usize>,
    pub raw: Vec<f64>,
    pub normalized: Vec<f64>,
}

impl ComparisonRow {
    /// Normalize against `raw[0]`; the baseline's own ratio is exactly 1.0.
    pub fn new(primitive: Primitive, msg_size: Option<usize>, raw: Vec<f64>) -> Self {
        let normalized = match raw.split_first() {
            Some((&baseline, others)) => std::iter::once(1.0)
                .chain(others.iter().map(|&value| value / baseline))
                .collect(),
            None => Vec::new(),
        };
        Self {
            primitive,
            msg_size,
            raw,
            normalized,
        }
    }

    pub fn baseline_raw(&self) -> Option<f64> {
        self.raw.first().copied()
    }
}

/// Rows of one bandwidth primitive, one per message size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthTable {
    pub primitive: Primitive,
    pub rows: Vec<ComparisonRow>,
}

/// Everything a harness run measured
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub latency: Vec<ComparisonRow>,
    pub bandwidth: Vec<BandwidthTable>,
}

/// Host information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
}

impl HostInfo {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
        }
    }
}

/// Run metadata written alongside the rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub host: HostInfo,
}

impl RunMetadata {
    pub fn new() -> Self {
        Self {
            version: crate::VERSION.to_string(),
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            host: HostInfo::current(),
        }
    }
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub metadata: RunMetadata,
    pub config: HarnessConfig,
    pub report: ComparisonReport,
}

/// `%.10f`
pub fn format_fixed(value: f64) -> String {
    format!("{:.10}", value)
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_line(fields: &[String]) -> String {
    let mut line = fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

/// Writes comparison files into a freshly recreated directory
pub struct ReportWriter {
    dir: PathBuf,
    labels: Vec<String>,
}

impl ReportWriter {
    /// Remove `dir` if present and create it empty.
    ///
    /// `labels` name the implementations, baseline first.
    pub fn prepare(dir: &Path, labels: Vec<String>) -> HarnessResult<Self> {
        if dir.exists() {
            debug!("Removing previous report directory {:?}", dir);
            fs::remove_dir_all(dir).map_err(|e| HarnessError::io(dir, e))?;
        }
        fs::create_dir_all(dir).map_err(|e| HarnessError::io(dir, e))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            labels,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<first>, <base> (baseline), <other> (normalized)..., <impl> (raw, us)...`
    fn header(&self, first: &str) -> Vec<String> {
        let mut header = vec![first.to_string()];
        if let Some((baseline, others)) = self.labels.split_first() {
            header.push(format!("{} (baseline)", baseline));
            header.extend(others.iter().map(|l| format!("{} (normalized)", l)));
        }
        header.extend(self.labels.iter().map(|l| format!("{} (raw, us)", l)));
        header
    }

    fn check_width(&self, row: &ComparisonRow) -> HarnessResult<()> {
        if row.raw.len() != self.labels.len() {
            return Err(HarnessError::SizeMismatch {
                context: format!("report row for {}", row.primitive),
                expected: self.labels.len(),
                actual: row.raw.len(),
            });
        }
        Ok(())
    }

    fn write_file(&self, name: &str, lines: Vec<String>) -> HarnessResult<PathBuf> {
        let path = self.dir.join(name);
        let mut file = fs::File::create(&path).map_err(|e| HarnessError::io(&path, e))?;
        for line in lines {
            file.write_all(line.as_bytes())
                .map_err(|e| HarnessError::io(&path, e))?;
        }
        file.flush().map_err(|e| HarnessError::io(&path, e))?;
        info!("Wrote {:?}", path);
        Ok(path)
    }

    /// One row per latency-only primitive.
    ///
    /// The baseline column is the literal `1.0`; everything computed uses
    /// fixed formatting.
    pub fn write_latency(&self, rows: &[ComparisonRow]) -> HarnessResult<PathBuf> {
        let mut lines = vec![csv_line(&self.header("Routine"))];
        for row in rows {
            self.check_width(row)?;
            let mut fields = vec![row.primitive.cli_name().to_string(), "1.0".to_string()];
            fields.extend(row.normalized.iter().skip(1).map(|&v| format_fixed(v)));
            fields.extend(row.raw.iter().map(|&v| format_fixed(v)));
            lines.push(csv_line(&fields));
        }
        self.write_file(LATENCY_FILE, lines)
    }

    /// One row per message size of a bandwidth primitive.
    pub fn write_bandwidth(&self, table: &BandwidthTable) -> HarnessResult<PathBuf> {
        let mut lines = vec![csv_line(&self.header("Msg Size (b)"))];
        for row in &table.rows {
            self.check_width(row)?;
            let size = row.msg_size.map(|s| s.to_string()).unwrap_or_default();
            let mut fields = vec![size];
            fields.extend(row.normalized.iter().map(|&v| format_fixed(v)));
            fields.extend(row.raw.iter().map(|&v| format_fixed(v)));
            lines.push(csv_line(&fields));
        }
        self.write_file(&Self::bandwidth_file_name(table.primitive), lines)
    }

    pub fn bandwidth_file_name(primitive: Primitive) -> String {
        format!("bw_{}.csv", primitive.cli_name())
    }

    pub fn write_summary(&self, summary: &RunSummary) -> HarnessResult<PathBuf> {
        let json = serde_json::to_string_pretty(summary)?;
        self.write_file(SUMMARY_FILE, vec![json, "\n".to_string()])
    }

    /// Write every CSV in the report.
    pub fn write_report(&self, report: &ComparisonReport) -> HarnessResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        if !report.latency.is_empty() {
            written.push(self.write_latency(&report.latency)?);
        }
        for table in &report.bandwidth {
            written.push(self.write_bandwidth(table)?);
        }
        Ok(written)
    }
}
