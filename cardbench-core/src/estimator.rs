//! Estimator Interface
//!
//! Every approximate answerer implements [`Estimator`]. The harness times each
//! call and appends the outcome to the estimator's [`EstimatorStats`]; the
//! estimator itself only produces numbers.

use crate::aggregate::{AggregateEstimate, AggregateKind};
use crate::ordering::VariableOrder;
use crate::query::{AggregateQuery, Query};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by an estimator while answering a query
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("{estimator} does not support {what}")]
    Unsupported { estimator: String, what: String },

    #[error("{estimator} failed: {message}")]
    Failed { estimator: String, message: String },
}

/// Per-query history of one estimator, in evaluation order.
///
/// The four vectors are always the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimatorStats {
    /// Error metric per query
    pub errors: Vec<f64>,
    /// Estimated cardinality per query
    pub est_cards: Vec<f64>,
    /// True cardinality per query
    pub true_cards: Vec<f64>,
    /// Wall time of the estimator call per query, in milliseconds
    pub query_dur_ms: Vec<f64>,
}

impl EstimatorStats {
    /// Append one query outcome
    pub fn add_error(&mut self, error: f64, est_card: f64, true_card: f64, duration_ms: f64) {
        self.errors.push(error);
        self.est_cards.push(est_card);
        self.true_cards.push(true_card);
        self.query_dur_ms.push(duration_ms);
    }

    /// Concatenate another history after this one, field by field
    pub fn merge(&mut self, other: EstimatorStats) {
        self.errors.extend(other.errors);
        self.est_cards.extend(other.est_cards);
        self.true_cards.extend(other.true_cards);
        self.query_dur_ms.extend(other.query_dur_ms);
    }

    /// Number of recorded queries
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Largest recorded error
    pub fn max_error(&self) -> Option<f64> {
        self.errors.iter().copied().reduce(f64::max)
    }
}

/// An approximate cardinality (and optionally aggregate) answerer
pub trait Estimator {
    /// Display name, unique within one benchmark run
    fn name(&self) -> &str;

    /// Estimated number of rows satisfying `query`
    fn query(&mut self, query: &Query) -> Result<f64, EstimatorError>;

    /// Accumulated history
    fn stats(&self) -> &EstimatorStats;

    /// Mutable history, for recording and merging
    fn stats_mut(&mut self) -> &mut EstimatorStats;

    /// Record one query outcome
    fn add_error(&mut self, error: f64, est_card: f64, true_card: f64, duration_ms: f64) {
        self.stats_mut()
            .add_error(error, est_card, true_card, duration_ms);
    }

    /// Append a history produced elsewhere (e.g. by a worker)
    fn merge_stats(&mut self, other: EstimatorStats) {
        self.stats_mut().merge(other);
    }

    /// Explicit variable order the estimator was built with, if any
    fn order(&self) -> Option<&VariableOrder> {
        None
    }

    /// Estimate an average or count for an aggregate query
    fn estimate_aggregate(
        &mut self,
        query: &AggregateQuery,
        kind: AggregateKind,
    ) -> Result<AggregateEstimate, EstimatorError> {
        let _ = (query, kind);
        Err(EstimatorError::Unsupported {
            estimator: self.name().to_string(),
            what: "aggregate queries".to_string(),
        })
    }
}
