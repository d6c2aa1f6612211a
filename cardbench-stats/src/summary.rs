//! Error Summaries
//!
//! The four figures printed per estimator after a run (max, p99, p95,
//! median), plus mean and count for reports. Computed over all recorded
//! errors: the tail is the signal.

use crate::percentiles::compute_percentiles;
use serde::Serialize;

/// Summary of one estimator's error history
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorSummary {
    /// Number of recorded errors
    pub count: usize,
    /// Largest error
    pub max: f64,
    /// 99th percentile
    pub p99: f64,
    /// 95th percentile
    pub p95: f64,
    /// Median
    pub median: f64,
    /// Arithmetic mean
    pub mean: f64,
}

/// Summarize an error history; `None` when nothing has been recorded.
pub fn summarize_errors(errors: &[f64]) -> Option<ErrorSummary> {
    if errors.is_empty() {
        return None;
    }
    let max = errors.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = errors.iter().sum::<f64>() / errors.len() as f64;
    let p = compute_percentiles(errors);
    Some(ErrorSummary {
        count: errors.len(),
        max,
        p99: p.p99,
        p95: p.p95,
        median: p.p50,
        mean,
    })
}

/// Mean of the values that are present, `None` if none are.
pub fn mean_of_present(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { None } else { Some(sum / n as f64) }
}
