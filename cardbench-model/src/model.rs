//! Model Families
//!
//! Two autoregressive families back the progressive-sampling estimator:
//! a factorized masked autoencoder and an attention model. Their weights and
//! forward passes live behind [`DensityNetwork`]; this module only decides how
//! a network is configured, which ordering encoding it receives, and checks
//! that the loaded network agrees with the table.
//!
//! The ordering encoding is a property of the family ([`OrderConvention`]).
//! Callers always hand over a [`VariableOrder`]; the conversion to what the
//! family consumes happens in [`ModelFamily::fixed_ordering`].

use crate::checkpoint::CheckpointMeta;
use cardbench_core::{OrderingError, PositionAssignment, Table, VariableOrder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while building or loading a model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error("Model input bins {got:?} do not match table domains {expected:?}")]
    BinMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Checkpoint {path} holds a {found:?} model but a {expected:?} model was configured")]
    FamilyMismatch {
        path: PathBuf,
        expected: ModelFamily,
        found: ModelFamily,
    },

    #[error("Failed to read checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse checkpoint {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed checkpoint {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// Which encoding of a variable order a family consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderConvention {
    /// Natural column -> position ("who depends on whom")
    PositionAssignment,
    /// Position -> natural column (sequence order)
    VariableOrder,
}

/// Autoregressive model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Masked autoencoder
    Factorized,
    /// Transformer
    Attention,
}

/// Ordering handed to a network at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixedOrdering {
    /// For [`OrderConvention::PositionAssignment`] families
    Positions(PositionAssignment),
    /// For [`OrderConvention::VariableOrder`] families
    Sequence(VariableOrder),
}

impl FixedOrdering {
    /// Recover the visiting order regardless of encoding
    pub fn visit_order(&self) -> VariableOrder {
        match self {
            FixedOrdering::Positions(p) => p.invert(),
            FixedOrdering::Sequence(o) => o.clone(),
        }
    }

    /// Number of variables covered
    pub fn len(&self) -> usize {
        match self {
            FixedOrdering::Positions(p) => p.len(),
            FixedOrdering::Sequence(o) => o.len(),
        }
    }

    /// Whether the ordering covers no variable
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelFamily {
    /// Attention when a head count is configured, factorized otherwise
    pub fn from_heads(heads: usize) -> Self {
        if heads > 0 {
            ModelFamily::Attention
        } else {
            ModelFamily::Factorized
        }
    }

    /// Ordering encoding this family consumes
    pub fn convention(self) -> OrderConvention {
        match self {
            ModelFamily::Factorized => OrderConvention::PositionAssignment,
            ModelFamily::Attention => OrderConvention::VariableOrder,
        }
    }

    /// Convert `order` to what this family consumes
    pub fn fixed_ordering(self, order: &VariableOrder) -> FixedOrdering {
        match self.convention() {
            OrderConvention::PositionAssignment => FixedOrdering::Positions(order.invert()),
            OrderConvention::VariableOrder => FixedOrdering::Sequence(order.clone()),
        }
    }
}

/// Architecture hyperparameters, passed through to the network loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Architecture {
    /// Hidden width of every fully connected layer (factorized)
    pub fc_hiddens: usize,
    /// Number of fully connected layers (factorized)
    pub layers: usize,
    /// Residual connections (factorized)
    pub residual: bool,
    /// Direct input-to-output connections (factorized)
    pub direct_io: bool,
    /// Input encoding name
    pub input_encoding: String,
    /// Output encoding name
    pub output_encoding: String,
    /// Attention heads; zero selects the factorized family
    pub heads: usize,
    /// Transformer blocks
    pub blocks: usize,
    /// Transformer model width
    pub d_model: usize,
    /// Transformer feed-forward width
    pub d_ff: usize,
    /// Transformer activation
    pub activation: String,
    /// Whether the model was trained with column masking
    pub column_masking: bool,
}

impl Default for Architecture {
    fn default() -> Self {
        Self {
            fc_hiddens: 128,
            layers: 4,
            residual: false,
            direct_io: false,
            input_encoding: "binary".to_string(),
            output_encoding: "one_hot".to_string(),
            heads: 0,
            blocks: 2,
            d_model: 32,
            d_ff: 128,
            activation: "gelu".to_string(),
            column_masking: false,
        }
    }
}

/// A batch of partially assigned rows, indexed by natural column
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    /// `rows[r][c]` is the code assigned to column `c` in row `r`, if any
    pub rows: Vec<Vec<Option<u32>>>,
}

/// An autoregressive density network over dictionary codes
pub trait DensityNetwork {
    /// Number of input variables (table columns)
    fn input_count(&self) -> usize;

    /// Domain size of every input, in natural column order
    fn input_bins(&self) -> &[usize];

    /// Order in which the network factorizes the columns
    fn visit_order(&self) -> VariableOrder;

    /// Turn partially assigned rows into network input
    fn encode_input(&self, rows: &[Vec<Option<u32>>]) -> EncodedBatch;

    /// Conditional distribution of natural column `column` for every row in the
    /// batch, given the columns before it in [`visit_order`](Self::visit_order).
    fn forward_with_encoded_input(&self, encoded: &EncodedBatch, column: usize) -> Vec<Vec<f64>>;

    /// Trainable parameter count
    fn parameter_count(&self) -> usize;
}

/// Everything a loader needs to reconstruct one network
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Family to build
    pub family: ModelFamily,
    /// Architecture hyperparameters
    pub architecture: Architecture,
    /// Domain size per input column
    pub input_bins: Vec<usize>,
    /// Ordering in the family's convention; `None` means natural order
    pub fixed_ordering: Option<FixedOrdering>,
    /// Training seed, from the checkpoint name
    pub seed: u64,
}

/// Loads network weights for a checkpoint
pub trait CheckpointLoader: Send + Sync {
    /// Build the network described by `spec` and load `checkpoint` into it
    fn load(
        &self,
        checkpoint: &CheckpointMeta,
        spec: &ModelSpec,
    ) -> Result<Box<dyn DensityNetwork>, ModelError>;
}

/// A loaded network with the family and ordering it was built with
pub struct BackingModel {
    family: ModelFamily,
    network: Box<dyn DensityNetwork>,
    order: VariableOrder,
    fixed: bool,
}

impl std::fmt::Debug for BackingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingModel")
            .field("family", &self.family)
            .field("order", &self.order)
            .field("fixed", &self.fixed)
            .field("input_count", &self.network.input_count())
            .finish()
    }
}

impl BackingModel {
    /// Build and load the network for `checkpoint`.
    ///
    /// `order` of `None` means natural ordering. Fails with
    /// [`OrderingError::OrderingMismatch`] when the order does not cover every
    /// model input, and with [`ModelError::BinMismatch`] when the network was
    /// trained on different domains.
    pub fn load(
        loader: &dyn CheckpointLoader,
        checkpoint: &CheckpointMeta,
        table: &Table,
        architecture: &Architecture,
        order: Option<&VariableOrder>,
    ) -> Result<Self, ModelError> {
        let family = ModelFamily::from_heads(architecture.heads);
        let input_bins: Vec<usize> = table
            .columns()
            .iter()
            .map(|c| c.distribution_size())
            .collect();
        let spec = ModelSpec {
            family,
            architecture: architecture.clone(),
            input_bins: input_bins.clone(),
            fixed_ordering: order.map(|o| family.fixed_ordering(o)),
            seed: checkpoint.seed,
        };

        info!("Loading checkpoint {}", checkpoint.path.display());
        let network = loader.load(checkpoint, &spec)?;

        if let Some(order) = order {
            order.check_len(network.input_count())?;
        }
        if network.input_bins() != input_bins.as_slice() {
            return Err(ModelError::BinMismatch {
                expected: input_bins,
                got: network.input_bins().to_vec(),
            });
        }

        let params = network.parameter_count();
        info!(
            "{:?} model: {} parameters (~= {:.1}MB), bits gap {:.3}",
            family,
            params,
            model_size_mb(params),
            checkpoint.bits_gap()
        );

        let fixed = order.is_some();
        let order = network.visit_order();
        Ok(Self {
            family,
            network,
            order,
            fixed,
        })
    }

    /// Model family
    pub fn family(&self) -> ModelFamily {
        self.family
    }

    /// Order the network factorizes in
    pub fn order(&self) -> &VariableOrder {
        &self.order
    }

    /// The order, when one was given at load time rather than defaulted
    pub fn fixed_order(&self) -> Option<&VariableOrder> {
        self.fixed.then_some(&self.order)
    }

    /// Underlying network
    pub fn network(&self) -> &dyn DensityNetwork {
        self.network.as_ref()
    }
}

/// Size of `params` 32-bit parameters in megabytes
pub fn model_size_mb(params: usize) -> f64 {
    params as f64 * 4.0 / 1024.0 / 1024.0
}

/// On-disk form of the reference network
#[derive(Debug, Deserialize)]
struct MarginalCheckpoint {
    family: Option<ModelFamily>,
    input_bins: Vec<usize>,
    marginals: Vec<Vec<f64>>,
}

/// Reference network that factorizes the table into independent marginals.
///
/// Every conditional equals the column's marginal distribution, so
/// progressive sampling over it produces the attribute-independence estimate.
#[derive(Debug, Clone)]
pub struct MarginalNetwork {
    input_bins: Vec<usize>,
    marginals: Vec<Vec<f64>>,
    order: VariableOrder,
}

impl MarginalNetwork {
    /// Build from normalised marginals, visiting columns in `ordering`.
    pub fn new(marginals: Vec<Vec<f64>>, ordering: Option<&FixedOrdering>) -> Self {
        let input_bins = marginals.iter().map(Vec::len).collect();
        let order = match ordering {
            Some(o) => o.visit_order(),
            None => VariableOrder::natural(marginals.len()),
        };
        Self {
            input_bins,
            marginals,
            order,
        }
    }

    /// Empirical marginals of `table`
    pub fn fit(table: &Table, ordering: Option<&FixedOrdering>) -> Self {
        let marginals = table
            .columns()
            .iter()
            .map(|column| {
                let mut counts = vec![0.0; column.distribution_size()];
                for &code in column.codes() {
                    counts[code as usize] += 1.0;
                }
                let total = column.len().max(1) as f64;
                counts.iter().map(|c| c / total).collect()
            })
            .collect();
        Self::new(marginals, ordering)
    }
}

impl DensityNetwork for MarginalNetwork {
    fn input_count(&self) -> usize {
        self.marginals.len()
    }

    fn input_bins(&self) -> &[usize] {
        &self.input_bins
    }

    fn visit_order(&self) -> VariableOrder {
        self.order.clone()
    }

    fn encode_input(&self, rows: &[Vec<Option<u32>>]) -> EncodedBatch {
        EncodedBatch {
            rows: rows.to_vec(),
        }
    }

    fn forward_with_encoded_input(&self, encoded: &EncodedBatch, column: usize) -> Vec<Vec<f64>> {
        vec![self.marginals[column].clone(); encoded.rows.len()]
    }

    fn parameter_count(&self) -> usize {
        self.input_bins.iter().sum()
    }
}

/// Loads [`MarginalNetwork`] checkpoints stored as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCheckpointLoader;

impl CheckpointLoader for JsonCheckpointLoader {
    fn load(
        &self,
        checkpoint: &CheckpointMeta,
        spec: &ModelSpec,
    ) -> Result<Box<dyn DensityNetwork>, ModelError> {
        let path = &checkpoint.path;
        let text = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.clone(),
            source,
        })?;
        let ckpt: MarginalCheckpoint =
            serde_json::from_str(&text).map_err(|source| ModelError::Json {
                path: path.clone(),
                source,
            })?;

        if let Some(found) = ckpt.family {
            if found != spec.family {
                return Err(ModelError::FamilyMismatch {
                    path: path.clone(),
                    expected: spec.family,
                    found,
                });
            }
        }
        if ckpt.marginals.len() != ckpt.input_bins.len()
            || ckpt
                .marginals
                .iter()
                .zip(&ckpt.input_bins)
                .any(|(m, &bins)| m.len() != bins)
        {
            return Err(ModelError::Malformed {
                path: path.clone(),
                message: "marginal lengths disagree with input_bins".to_string(),
            });
        }
        debug!(
            "Loaded {} marginals from {} ({:?})",
            ckpt.marginals.len(),
            path.display(),
            spec.architecture
        );

        Ok(Box::new(MarginalNetwork::new(
            ckpt.marginals,
            spec.fixed_ordering.as_ref(),
        )))
    }
}
