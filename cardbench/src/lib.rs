#![warn(missing_docs)]
//! # Cardbench
//!
//! Benchmark harness for learned cardinality and aggregate estimators.
//!
//! Cardbench compares approximate answers against exact ones over a single table:
//! - **Query Generation**: Seeded random point queries anchored on a real tuple,
//!   and random aggregate / group-by queries
//! - **Exact Oracle**: Full-scan cardinalities and aggregates, timed per query
//! - **Variable Orderings**: Aggregate column last, group-by columns just before it,
//!   converted to each model family's convention
//! - **Progressive Sampling**: Model-backed estimates, seeded per query
//! - **Parallel Runs**: Worker threads with private models, merged deterministically
//! - **Result Records**: One JSON file per query, an error CSV and percentile summaries
//!
//! ## Quick Start
//!
//! ```ignore
//! use cardbench::prelude::*;
//! use std::sync::Arc;
//!
//! let table = Arc::new(DatasetSpec::resolve("dmv-tiny", "datasets".as_ref(), None)?.load()?);
//! let mut runner = EstimatorRunner::new(
//!     Oracle::new(table.clone()),
//!     vec![Box::new(SamplingEstimator::new(table.clone(), 0.01, 1234))],
//! );
//! let queries = generate_queries(&table, &QueryGenerator::default(), 100, 1234)?;
//! runner.run_n(&queries, None)?;
//! print!("{}", format_error_summaries(&compute_error_summaries(runner.estimators())));
//! ```

// Re-export core types
pub use cardbench_core::{
    AggregateAnswer, AggregateEstimate, AggregateKind, AggregateQuery, AggregateTriple, Column,
    ColumnType, DMV_COLUMNS, DatasetError, DatasetSpec, Estimator, EstimatorError, EstimatorStats,
    Filter, Operator, Oracle, OrderingError, PositionAssignment, Predicate, Query, QueryGenConfig,
    QueryGenError, QueryGenerator, RelativeError, Table, TableError, Value, VariableOrder,
    error_metric, generate_order, generate_order_by_index, invert_order, relative_error,
};

// Re-export models
pub use cardbench_model::{
    Architecture, BackingModel, CheckpointLoader, CheckpointMeta, DensityNetwork, JsonCheckpointLoader,
    MarginalNetwork, ModelError, ModelFamily, ModelSpec, ProgressiveConfig, ProgressiveSampling,
    SamplingEstimator, discover_checkpoints,
};

// Re-export stats
pub use cardbench_stats::{ErrorSummary, compute_percentile, compute_percentiles, summarize_errors};

// Re-export reporting
pub use cardbench_report::{
    AggregateRun, PointEstimate, PointRecord, RecordMeta, ResultRecord, ResultRecorder,
    write_error_csv,
};

// Re-export the runner and coordinator
pub use cardbench_cli::{
    CardbenchConfig, Coordinator, CoordinatorError, EstimatorFactory, EstimatorRunner,
    PointRecording, RunError, TableSource, WorkerFactory, compute_error_summaries,
    format_aggregate_answers, format_error_summaries, generate_queries, run_single_aggregate_query,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AggregateQuery, DatasetSpec, Estimator, EstimatorRunner, Oracle, Query, QueryGenerator,
        SamplingEstimator, Table, compute_error_summaries, format_error_summaries,
        generate_queries,
    };
}

/// Run the Cardbench CLI.
///
/// ```ignore
/// fn main() {
///     cardbench::run().unwrap();
/// }
/// ```
pub use cardbench_cli::run;
