#![warn(missing_docs)]
//! Cardbench Models - Model-Backed Estimators
//!
//! This crate turns trained checkpoints into estimators:
//! - Checkpoint name parsing and glob discovery
//! - The two autoregressive model families and their ordering conventions
//! - `ProgressiveSampling`, the model-backed estimator
//! - `SamplingEstimator`, a uniform-sample baseline

mod checkpoint;
mod model;
mod progressive;
mod sampling;

pub use checkpoint::{CheckpointError, CheckpointMeta, discover_checkpoints};
pub use model::{
    Architecture, BackingModel, CheckpointLoader, DensityNetwork, EncodedBatch, FixedOrdering,
    JsonCheckpointLoader, MarginalNetwork, ModelError, ModelFamily, ModelSpec, OrderConvention,
    model_size_mb,
};
pub use progressive::{DEFAULT_PSAMPLE, ProgressiveConfig, ProgressiveSampling};
pub use sampling::SamplingEstimator;
