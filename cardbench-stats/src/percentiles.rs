//! Percentile Computation
//!
//! Same convention as numpy's default `quantile`: linear interpolation
//! between the two nearest ranks.

/// Percentiles reported for estimator errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentiles {
    /// 50th percentile (median)
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

/// Compute a single percentile from samples
///
/// Uses linear interpolation between nearest ranks.
///
/// # Examples
///
/// ```
/// # use cardbench_stats::compute_percentile;
/// let errors = vec![1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(compute_percentile(&errors, 50.0), 3.0);
/// assert_eq!(compute_percentile(&errors, 100.0), 5.0);
/// ```
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    if samples.len() == 1 {
        return samples[0];
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let p = (percentile / 100.0).clamp(0.0, 1.0);

    let rank = p * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = (lower_idx + 1).min(n - 1);
    let fraction = rank - lower_idx as f64;

    sorted[lower_idx] + fraction * (sorted[upper_idx] - sorted[lower_idx])
}

/// Compute the reported percentiles
pub fn compute_percentiles(samples: &[f64]) -> Percentiles {
    Percentiles {
        p50: compute_percentile(samples, 50.0),
        p95: compute_percentile(samples, 95.0),
        p99: compute_percentile(samples, 99.0),
    }
}
