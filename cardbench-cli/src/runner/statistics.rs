//! Error Statistics
//!
//! Per-estimator error summaries, computed in parallel with Rayon. Each
//! estimator's history is summarized independently.

use cardbench_core::Estimator;
use cardbench_stats::{ErrorSummary, summarize_errors};
use rayon::prelude::*;
use tracing::info;

/// Summarize every estimator's error history (parallelized with Rayon).
///
/// Returns `(name, summary)` pairs in estimator order; the summary is `None`
/// for an estimator that has recorded nothing yet.
pub fn compute_error_summaries(
    estimators: &[Box<dyn Estimator>],
) -> Vec<(String, Option<ErrorSummary>)> {
    let histories: Vec<(&str, &[f64])> = estimators
        .iter()
        .map(|e| (e.name(), e.stats().errors.as_slice()))
        .collect();
    histories
        .par_iter()
        .map(|(name, errors)| (name.to_string(), summarize_errors(errors)))
        .collect()
}

/// Log max / 99th / 95th / median error per estimator.
///
/// Returns the largest error seen by any estimator so far, which never
/// decreases over a run.
pub fn report_estimators(estimators: &[Box<dyn Estimator>]) -> Option<f64> {
    let mut max_err: Option<f64> = None;
    for (name, summary) in compute_error_summaries(estimators) {
        let Some(s) = summary else {
            info!("{}: no queries recorded", name);
            continue;
        };
        info!(
            "{} max {:.3} 99th {:.3} 95th {:.3} median {:.3}",
            name, s.max, s.p99, s.p95, s.median
        );
        max_err = Some(max_err.map_or(s.max, |m| m.max(s.max)));
    }
    max_err
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardbench_core::{EstimatorError, EstimatorStats, Query};

    struct Recorded {
        name: &'static str,
        stats: EstimatorStats,
    }

    impl Estimator for Recorded {
        fn name(&self) -> &str {
            self.name
        }
        fn query(&mut self, _query: &Query) -> Result<f64, EstimatorError> {
            Ok(0.0)
        }
        fn stats(&self) -> &EstimatorStats {
            &self.stats
        }
        fn stats_mut(&mut self) -> &mut EstimatorStats {
            &mut self.stats
        }
    }

    fn recorded(name: &'static str, errors: &[f64]) -> Box<dyn Estimator> {
        let mut stats = EstimatorStats::default();
        for &e in errors {
            stats.add_error(e, 1.0, 1.0, 0.0);
        }
        Box::new(Recorded { name, stats })
    }

    #[test]
    fn test_summaries_keep_estimator_order() {
        let ests = vec![
            recorded("b", &[1.0, 3.0]),
            recorded("a", &[]),
            recorded("c", &[2.0]),
        ];
        let summaries = compute_error_summaries(&ests);
        let names: Vec<&str> = summaries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(summaries[1].1.is_none());
        assert_eq!(summaries[0].1.unwrap().max, 3.0);
    }

    #[test]
    fn test_report_returns_global_max() {
        let mut ests = vec![recorded("x", &[1.5, 2.0]), recorded("y", &[4.0])];
        assert_eq!(report_estimators(&ests), Some(4.0));

        ests[0].add_error(1.0, 1.0, 1.0, 0.0);
        assert_eq!(report_estimators(&ests), Some(4.0));
        ests[1].add_error(9.0, 9.0, 1.0, 0.0);
        assert_eq!(report_estimators(&ests), Some(9.0));

        assert_eq!(report_estimators(&[]), None);
    }
}
