#![warn(missing_docs)]
//! Cardbench Core - Tables, Queries and Ground Truth
//!
//! This crate holds everything the benchmark needs before a model is involved:
//! - `Table` / `Column` with sorted dictionary-encoded domains, and a CSV loader
//! - Point and aggregate queries, plus the random `QueryGenerator`
//! - Variable orderings for autoregressive estimators
//! - The exact `Oracle` and the symmetric `error_metric`
//! - The `Estimator` trait and its per-query `EstimatorStats`

mod aggregate;
mod dataset;
mod estimator;
mod metric;
mod oracle;
mod ordering;
mod query;
mod querygen;
mod table;
mod value;

pub use aggregate::{AggregateAnswer, AggregateEstimate, AggregateKind, AggregateTriple, GroupKey};
pub use dataset::{DMV_COLUMNS, DatasetError, DatasetSpec, load_csv_table};
pub use estimator::{Estimator, EstimatorError, EstimatorStats};
pub use metric::{RelativeError, UNDEFINED_RELATIVE_ERROR, error_metric, relative_error};
pub use oracle::Oracle;
pub use ordering::{
    OrderingError, PositionAssignment, VariableOrder, generate_order, generate_order_by_index,
    invert_order,
};
pub use query::{AggregateQuery, CodeMasks, Filter, Operator, Predicate, Query};
pub use querygen::{QueryGenConfig, QueryGenError, QueryGenerator};
pub use table::{Column, ColumnType, Table, TableError};
pub use value::Value;
