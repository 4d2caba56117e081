//! # Output Extractor
//!
//! Turns the free-form text a driver prints into numbers. Drivers are opaque
//! programs, so this module is the whole contract between them and the
//! harness: it never looks at anything but the captured standard output and
//! it tolerates arbitrary log text around the data it wants.
//!
//! ## Units
//!
//! Latencies are returned in **microseconds**. A driver that reports in
//! seconds marks its output with the literal `(s)`; that value is scaled up
//! by 1,000,000. Output without the marker is taken as microseconds already.

use crate::error::{HarnessError, HarnessResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Microseconds per second
pub const US_PER_S: f64 = 1_000_000.0;

/// Marker a driver prints when its latency figure is in seconds
pub const SECONDS_MARKER: &str = "(s)";

/// One line of a bandwidth sweep
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandwidthPoint {
    pub size: usize,
    pub latency_us: f64,
    pub bandwidth_mibps: f64,
}

impl BandwidthPoint {
    pub fn new(size: usize, latency_us: f64, bandwidth_mibps: f64) -> Self {
        Self {
            size,
            latency_us,
            bandwidth_mibps,
        }
    }
}

fn latency_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\d{2,}").expect("latency pattern is valid"))
}

fn bandwidth_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+)[ \t\r]+(\d+\.\d+)(?:[ \t\r]+(\d+\.\d+))?")
            .expect("bandwidth pattern is valid")
    })
}

/// Extract the per-operation latency, in microseconds.
///
/// The first decimal number with at least two fractional digits wins.
pub fn extract_latency(text: &str) -> HarnessResult<f64> {
    let found = latency_regex()
        .find(text)
        .ok_or_else(|| HarnessError::parse("didn't find any times in latency output", text))?;
    let value: f64 = found
        .as_str()
        .parse()
        .map_err(|_| HarnessError::parse("latency value is not a number", text))?;

    if text.contains(SECONDS_MARKER) {
        Ok(value * US_PER_S)
    } else {
        Ok(value)
    }
}

/// Extract every `<size> <latency> [<bandwidth>]` line in order of appearance.
///
/// A missing bandwidth column reads as 0. Results are not re-sorted.
pub fn extract_bandwidth_points(text: &str) -> Vec<BandwidthPoint> {
    text.lines()
        .filter_map(|line| bandwidth_regex().captures(line))
        .filter_map(|caps| {
            let size = caps.get(1)?.as_str().parse().ok()?;
            let latency_us = caps.get(2)?.as_str().parse().ok()?;
            let bandwidth_mibps = match caps.get(3) {
                Some(bw) => bw.as_str().parse().ok()?,
                None => 0.0,
            };
            Some(BandwidthPoint::new(size, latency_us, bandwidth_mibps))
        })
        .collect()
}

/// Like [`extract_bandwidth_points`], but an empty sweep is a parse failure.
pub fn require_bandwidth_points(text: &str) -> HarnessResult<Vec<BandwidthPoint>> {
    let points = extract_bandwidth_points(text);
    if points.is_empty() {
        return Err(HarnessError::parse(
            "didn't find any data points in bandwidth output",
            text,
        ));
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_in_microseconds_is_unchanged() {
        assert_eq!(extract_latency("avg: 12.345678").unwrap(), 12.345678);
    }

    #[test]
    fn test_latency_in_seconds_is_scaled() {
        let us = extract_latency("avg: 12.345678 (s)").unwrap();
        assert!((us - 12_345_678.0).abs() < 1e-6);

        let us = extract_latency("Avg Time per Barrier (s): 0.00000123 (0.00123000 total)").unwrap();
        assert!((us - 1.23).abs() < 1e-9);
    }

    #[test]
    fn test_latency_takes_first_match_and_skips_short_decimals() {
        let out = "OpenSHMEM Version: 1.5\nAvg Time per Add (us): 0.81250000 (812.50 total us)\n";
        assert_eq!(extract_latency(out).unwrap(), 0.8125);
    }

    #[test]
    fn test_latency_without_numbers_fails() {
        let err = extract_latency("segfault in PE 1\n").unwrap_err();
        assert!(err.to_string().contains("didn't find any times"));
    }

    #[test]
    fn test_bandwidth_points_preserve_order() {
        let points = extract_bandwidth_points("1 0.50 2000.00\n2 0.60 3333.33\n");
        assert_eq!(
            points,
            vec![
                BandwidthPoint::new(1, 0.50, 2000.00),
                BandwidthPoint::new(2, 0.60, 3333.33),
            ]
        );
    }

    #[test]
    fn test_bandwidth_points_tolerate_surrounding_text() {
        let out = "\
==============================================
===          Benchmark Results             ===
==============================================
  Min Msg Size (bytes):   1
  Max Msg Size (bytes):   4
size (b)\t\tlatency (us)\t\t\tbandwidth (MiB/s)
4\t\t\t      0.75\t\t\t        5.09
1\t\t\t      0.50
2\r\t\t0.60\r\t\t\t\t3.18
";
        let points = extract_bandwidth_points(out);
        assert_eq!(
            points,
            vec![
                BandwidthPoint::new(4, 0.75, 5.09),
                BandwidthPoint::new(1, 0.50, 0.0),
                BandwidthPoint::new(2, 0.60, 3.18),
            ]
        );
    }

    #[test]
    fn test_bandwidth_inf_lines_are_skipped() {
        let out = "1\t\t\t       inf\t\t\t            inf\n2 0.10 19.07\n";
        assert_eq!(
            extract_bandwidth_points(out),
            vec![BandwidthPoint::new(2, 0.10, 19.07)]
        );
    }

    #[test]
    fn test_require_bandwidth_points_rejects_empty_sweep() {
        assert!(require_bandwidth_points("nothing here").is_err());
        assert_eq!(require_bandwidth_points("8 1.00 7.63").unwrap().len(), 1);
    }
}
