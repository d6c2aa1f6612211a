//! Point-Query Execution
//!
//! One query is fully resolved (oracle, every estimator, error recording)
//! before the next begins.
//!
//! ```text
//! Query
//!   │
//!   ▼
//! ┌────────┐   true card == 0 ──► skipped
//! │ oracle │   (or cached card)
//! └───┬────┘
//!     ▼
//! ┌────────────┐
//! │ estimators │  estimate + wall time
//! └───┬────────┘
//!     ▼
//! error_metric ──► EstimatorStats (+ optional JSON record)
//! ```

use super::statistics::report_estimators;
use cardbench_core::{
    Estimator, EstimatorError, EstimatorStats, Oracle, Query, QueryGenError, QueryGenerator,
    Table, error_metric,
};
use cardbench_report::{PointEstimate, PointRecord, RecordMeta, ResultRecord, ResultRecorder};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while running point queries
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Estimator(#[from] EstimatorError),

    #[error(transparent)]
    Report(#[from] cardbench_report::ReportError),

    #[error(
        "Worker statistics do not match local estimators: expected {expected:?}, got {got:?}"
    )]
    EstimatorMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },
}

/// Writes one [`PointRecord`] per evaluated query
#[derive(Debug)]
pub struct PointRecording {
    /// Destination
    pub recorder: ResultRecorder,
    /// Dataset identifier stamped on every record
    pub dataset: String,
    /// Model identifier stamped on every record
    pub model: String,
}

/// Pre-generate `num` point queries from a fixed seed.
pub fn generate_queries(
    table: &Table,
    generator: &QueryGenerator,
    num: usize,
    seed: u64,
) -> Result<Vec<Query>, QueryGenError> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num)
        .map(|_| generator.generate_query(table, &mut rng))
        .collect()
}

/// Owns an oracle and a set of estimators, and accumulates their error history.
pub struct EstimatorRunner {
    oracle: Oracle,
    estimators: Vec<Box<dyn Estimator>>,
    recording: Option<PointRecording>,
    progress: bool,
    log_every: usize,
}

impl EstimatorRunner {
    /// Create a runner; the estimator list order is the report order
    pub fn new(oracle: Oracle, estimators: Vec<Box<dyn Estimator>>) -> Self {
        Self {
            oracle,
            estimators,
            recording: None,
            progress: false,
            log_every: 0,
        }
    }

    /// Write a JSON record for every evaluated query
    pub fn with_recording(mut self, recording: PointRecording) -> Self {
        self.recording = Some(recording);
        self
    }

    /// Show a progress bar in [`run_n`](Self::run_n)
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Log throughput every `log_every` queries (0 disables it)
    pub fn with_log_every(mut self, log_every: usize) -> Self {
        self.log_every = log_every;
        self
    }

    /// The oracle
    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    /// The table the oracle scans
    pub fn table(&self) -> &Table {
        self.oracle.table()
    }

    /// Estimators, in report order
    pub fn estimators(&self) -> &[Box<dyn Estimator>] {
        &self.estimators
    }

    /// Estimator names, in report order
    pub fn estimator_names(&self) -> Vec<String> {
        self.estimators.iter().map(|e| e.name().to_string()).collect()
    }

    /// Copy of every estimator's history, in report order
    pub fn stats_snapshot(&self) -> Vec<(String, EstimatorStats)> {
        self.estimators
            .iter()
            .map(|e| (e.name().to_string(), e.stats().clone()))
            .collect()
    }

    /// Evaluate one query against every estimator.
    ///
    /// `oracle_card` replaces the table scan when given. Queries whose true
    /// cardinality is zero are skipped without recording anything.
    pub fn query(&mut self, query: &Query, oracle_card: Option<u64>) -> Result<(), RunError> {
        let (true_card, real_ms) = match oracle_card {
            Some(card) => (card, 0.0),
            None => {
                let card = self.oracle.cardinality(query);
                let ms = self.oracle.query_dur_ms().last().copied().unwrap_or_default();
                (card, ms)
            }
        };
        if true_card == 0 {
            debug!("Skipping {}: true cardinality is 0", query.describe(self.table()));
            return Ok(());
        }
        let true_card = true_card as f64;

        let mut estimates = Vec::with_capacity(self.estimators.len());
        for estimator in &mut self.estimators {
            let start = Instant::now();
            let est_card = estimator.query(query)?;
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
            let err = error_metric(est_card, true_card);
            estimator.add_error(err, est_card, true_card, duration_ms);
            debug!(
                "{}: est {:.1}, true {:.0}, err {:.3} ({:.2}ms)",
                estimator.name(),
                est_card,
                true_card,
                err,
                duration_ms
            );
            estimates.push(PointEstimate {
                estimator: estimator.name().to_string(),
                est_card,
                err,
                query_dur_ms: duration_ms,
            });
        }

        if let Some(recording) = &mut self.recording {
            let order = self
                .estimators
                .iter()
                .find_map(|e| e.order())
                .map(|o| o.as_slice().to_vec());
            let record = ResultRecord::Point(PointRecord {
                meta: RecordMeta::now(recording.dataset.as_str(), recording.model.as_str()),
                query: query.describe(self.oracle.table()),
                true_card,
                estimates,
                query_dur_ms_real: real_ms,
                order,
                groupby: false,
            });
            recording.recorder.record(&record)?;
        }
        Ok(())
    }

    /// Run `queries` in order, reporting errors at the end.
    ///
    /// `oracle_cards[i]`, when present, is used as query `i`'s true cardinality.
    /// Returns the largest error seen so far.
    pub fn run_n(
        &mut self,
        queries: &[Query],
        oracle_cards: Option<&[u64]>,
    ) -> Result<Option<f64>, RunError> {
        let pb = if self.progress {
            let pb = ProgressBar::new(queries.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let start = Instant::now();
        for (i, query) in queries.iter().enumerate() {
            let card = oracle_cards.and_then(|cards| cards.get(i).copied());
            self.query(query, card)?;
            pb.inc(1);

            if self.log_every > 0 && (i + 1) % self.log_every == 0 {
                let elapsed = start.elapsed().as_secs_f64();
                info!(
                    "{} queries done, {:.1} queries/sec",
                    i + 1,
                    (i + 1) as f64 / elapsed.max(f64::EPSILON)
                );
                report_estimators(&self.estimators);
            }
        }
        pb.finish_with_message("Complete");

        Ok(report_estimators(&self.estimators))
    }

    /// Append histories produced by another runner with the same estimators.
    pub fn merge_stats(&mut self, stats: Vec<(String, EstimatorStats)>) -> Result<(), RunError> {
        let got: Vec<String> = stats.iter().map(|(name, _)| name.clone()).collect();
        let expected = self.estimator_names();
        if got != expected {
            return Err(RunError::EstimatorMismatch { expected, got });
        }
        for (estimator, (_, other)) in self.estimators.iter_mut().zip(stats) {
            estimator.merge_stats(other);
        }
        Ok(())
    }
}

impl std::fmt::Debug for EstimatorRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstimatorRunner")
            .field("table", &self.oracle.table().name())
            .field("estimators", &self.estimator_names())
            .finish()
    }
}
