//! # Trial Aggregation
//!
//! A single driver run is noisy, so every (primitive, implementation) pair
//! is run `median_n` times and reduced to the median. `median_n` is odd, so
//! the median is always a value that was actually observed.
//!
//! Bandwidth sweeps are reduced per message size: the median latency for
//! size *k* is taken over the *k*-th point of every trial, never across
//! sizes. Latency and bandwidth columns are reduced independently.

use crate::error::{HarnessError, HarnessResult};
use crate::extract::{extract_latency, require_bandwidth_points, BandwidthPoint};
use crate::launcher::Launcher;
use tracing::debug;

/// Middle element of the ascending sort; index `len / 2`.
pub fn median(values: &[f64]) -> HarnessResult<f64> {
    if values.is_empty() {
        return Err(HarnessError::InvalidConfig(
            "cannot take the median of zero trials".to_string(),
        ));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Ok(sorted[sorted.len() / 2])
}

/// Element-wise median of several sweeps of the same implementation.
///
/// Every trial must report the same number of points; sizes come from the
/// first trial.
pub fn median_points(trials: &[Vec<BandwidthPoint>]) -> HarnessResult<Vec<BandwidthPoint>> {
    let first = trials.first().ok_or_else(|| {
        HarnessError::InvalidConfig("cannot take the median of zero trials".to_string())
    })?;

    for (i, trial) in trials.iter().enumerate().skip(1) {
        if trial.len() != first.len() {
            return Err(HarnessError::SizeMismatch {
                context: format!("bandwidth trial {}", i + 1),
                expected: first.len(),
                actual: trial.len(),
            });
        }
    }

    first
        .iter()
        .enumerate()
        .map(|(idx, point)| {
            let latencies: Vec<f64> = trials.iter().map(|t| t[idx].latency_us).collect();
            let bandwidths: Vec<f64> = trials.iter().map(|t| t[idx].bandwidth_mibps).collect();
            Ok(BandwidthPoint::new(
                point.size,
                median(&latencies)?,
                median(&bandwidths)?,
            ))
        })
        .collect()
}

/// Runs one driver command `median_n` times and reduces the results
pub struct TrialAggregator<'a> {
    launcher: &'a dyn Launcher,
    median_n: usize,
}

impl<'a> TrialAggregator<'a> {
    pub fn new(launcher: &'a dyn Launcher, median_n: usize) -> Self {
        Self { launcher, median_n }
    }

    pub fn median_n(&self) -> usize {
        self.median_n
    }

    /// Median per-operation latency (us) of a latency-only primitive.
    pub async fn latency(&self, argv: &[String]) -> HarnessResult<f64> {
        let mut samples = Vec::with_capacity(self.median_n);
        for trial in 0..self.median_n {
            let output = self.launcher.run(argv).await?;
            let value = extract_latency(&output)?;
            debug!("trial {}/{}: {:.4} us", trial + 1, self.median_n, value);
            samples.push(value);
        }
        median(&samples)
    }

    /// Per-size median sweep of a bandwidth primitive.
    pub async fn bandwidth(&self, argv: &[String]) -> HarnessResult<Vec<BandwidthPoint>> {
        let mut trials = Vec::with_capacity(self.median_n);
        for trial in 0..self.median_n {
            let output = self.launcher.run(argv).await?;
            let points = require_bandwidth_points(&output)?;
            debug!(
                "trial {}/{}: {} data points",
                trial + 1,
                self.median_n,
                points.len()
            );
            trials.push(points);
        }
        median_points(&trials)
    }
}
