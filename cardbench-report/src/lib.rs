#![warn(missing_docs)]
//! Cardbench Report - Result Emission
//!
//! Generates the run's outputs:
//! - One JSON record per query (point, aggregate or group-by)
//! - An error CSV with every estimator's per-query history

mod csv;
mod json;
mod record;
mod recorder;

pub use crate::csv::write_error_csv;
pub use json::generate_json_record;
pub use record::{
    AggregateRecord, AggregateRun, GroupByRecord, GroupRow, PointEstimate, PointRecord,
    RecordMeta, ReportError, ResultRecord,
};
pub use recorder::ResultRecorder;
