//! Estimator Runner
//!
//! Runs queries against the oracle and every estimator and accumulates
//! per-estimator error statistics.
//!
//! ## Pipeline Overview
//!
//! ```text
//! CardbenchConfig
//!       │
//!       ▼
//! ┌─────────────┐
//! │ estimators  │  Table, oracle and estimator set per participant
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │  execution  │  Point queries: oracle, estimate, error metric
//! │  aggregate  │  Aggregate queries: (avg, count, sum) vs. oracle
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ statistics  │  Error summaries (parallel)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable output
//! └─────────────┘
//! ```

mod aggregate;
mod estimators;
mod execution;
mod formatting;
mod statistics;

pub use aggregate::{AggregateOutcome, run_single_aggregate_query};
pub use estimators::{EstimatorFactory, TableSource};
pub use execution::{EstimatorRunner, PointRecording, RunError, generate_queries};
pub use formatting::{format_aggregate_answers, format_error_summaries};
pub use statistics::{compute_error_summaries, report_estimators};
