#![warn(missing_docs)]
//! Cardbench Statistics
//!
//! Percentiles and per-estimator error summaries. Percentiles interpolate
//! linearly between ranks and are computed over every recorded error,
//! outliers included.

mod percentiles;
mod summary;

pub use percentiles::{Percentiles, compute_percentile, compute_percentiles};
pub use summary::{ErrorSummary, mean_of_present, summarize_errors};
