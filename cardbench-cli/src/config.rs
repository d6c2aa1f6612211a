//! Configuration loading from cardbench.toml
//!
//! Cardbench configuration can be specified in a `cardbench.toml` file in the project root.
//! The configuration is automatically discovered by walking up from the current directory.

use cardbench_core::QueryGenConfig;
use cardbench_model::{Architecture, DEFAULT_PSAMPLE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up by [`CardbenchConfig::discover`]
pub const CONFIG_FILE: &str = "cardbench.toml";

/// Cardbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CardbenchConfig {
    /// Dataset selection
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// Checkpoints and model hyperparameters
    #[serde(default)]
    pub model: ModelConfig,
    /// Baseline estimator toggles
    #[serde(default)]
    pub estimators: EstimatorsConfig,
    /// Benchmark loop settings
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Output locations
    #[serde(default)]
    pub output: OutputConfig,
}

/// Dataset selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name: "dmv", "dmv-tiny", or a CSV file under `datasets_dir`
    #[serde(default = "default_dataset")]
    pub name: String,
    /// Directory holding dataset CSVs and oracle caches
    #[serde(default = "default_datasets_dir")]
    pub datasets_dir: PathBuf,
    /// Columns to load; required for unregistered datasets
    #[serde(default)]
    pub columns: Vec<String>,
    /// Columns never chosen as aggregate targets
    #[serde(default)]
    pub key_columns: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: default_dataset(),
            datasets_dir: default_datasets_dir(),
            columns: Vec::new(),
            key_columns: Vec::new(),
        }
    }
}

fn default_dataset() -> String {
    "dmv-tiny".to_string()
}
fn default_datasets_dir() -> PathBuf {
    PathBuf::from("datasets")
}

/// Checkpoints and model hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory searched for checkpoints
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    /// Checkpoint glob, relative to `models_dir`
    #[serde(default = "default_glob")]
    pub glob: String,
    /// Skip checkpoints whose path contains this substring
    #[serde(default)]
    pub blacklist: Option<String>,
    /// Progressive samples per query
    #[serde(default = "default_psample")]
    pub psample: usize,
    /// Skip unfiltered columns while sampling (models trained with column masking)
    #[serde(default)]
    pub column_masking: bool,
    /// Explicit variable order; empty means natural order
    #[serde(default)]
    pub order: Vec<usize>,
    /// Network hyperparameters
    #[serde(default)]
    pub architecture: Architecture,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            glob: default_glob(),
            blacklist: None,
            psample: default_psample(),
            column_masking: false,
            order: Vec::new(),
            architecture: Architecture::default(),
        }
    }
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_glob() -> String {
    "*.pt".to_string()
}
fn default_psample() -> usize {
    DEFAULT_PSAMPLE
}

/// Baseline estimator toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorsConfig {
    /// Add the uniform-sampling baseline
    #[serde(default)]
    pub run_sampling: bool,
    /// Fraction of rows kept by the sampling baseline
    #[serde(default = "default_sample_ratio")]
    pub sample_ratio: f64,
}

impl Default for EstimatorsConfig {
    fn default() -> Self {
        Self {
            run_sampling: false,
            sample_ratio: default_sample_ratio(),
        }
    }
}

fn default_sample_ratio() -> f64 {
    0.01
}

/// Benchmark loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of generated queries
    #[serde(default = "default_num_queries")]
    pub num_queries: usize,
    /// Seed of query generation and of every sampler
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Log throughput every N queries
    #[serde(default = "default_log_every")]
    pub log_every: usize,
    /// Worker threads; 1 runs in-process
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Longest wait for any single worker reply (e.g., "60s", "10m")
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout: String,
    /// Fewest filters per generated point query
    #[serde(default = "default_min_filters")]
    pub min_filters: usize,
    /// Exclusive upper bound on filters per generated point query
    #[serde(default = "default_max_filters")]
    pub max_filters: usize,
    /// Trailing columns never filtered by point queries
    #[serde(default = "default_reserved_suffix")]
    pub reserved_suffix: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            num_queries: default_num_queries(),
            seed: default_seed(),
            log_every: default_log_every(),
            parallelism: default_parallelism(),
            worker_timeout: default_worker_timeout(),
            min_filters: default_min_filters(),
            max_filters: default_max_filters(),
            reserved_suffix: default_reserved_suffix(),
        }
    }
}

fn default_num_queries() -> usize {
    20
}
fn default_seed() -> u64 {
    1234
}
fn default_log_every() -> usize {
    100
}
fn default_parallelism() -> usize {
    1
}
fn default_worker_timeout() -> String {
    "10m".to_string()
}
fn default_min_filters() -> usize {
    5
}
fn default_max_filters() -> usize {
    10
}
fn default_reserved_suffix() -> usize {
    2
}

impl RunnerConfig {
    /// Query generator settings
    pub fn query_gen(&self) -> QueryGenConfig {
        QueryGenConfig {
            min_filters: self.min_filters,
            max_filters: self.max_filters,
            reserved_suffix: self.reserved_suffix,
            ..QueryGenConfig::default()
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for per-query JSON records
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Error CSV written after a point run
    #[serde(default)]
    pub err_csv: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            err_csv: None,
        }
    }
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

impl CardbenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Worker timeout as a [`Duration`]
    pub fn worker_timeout(&self) -> anyhow::Result<Duration> {
        Self::parse_duration(&self.runner.worker_timeout).map(Duration::from_nanos)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# Cardbench Configuration

[dataset]
# "dmv", "dmv-tiny", or a CSV file name under datasets_dir
name = "dmv-tiny"
datasets_dir = "datasets"
# Columns to load (required for datasets other than dmv / dmv-tiny)
# columns = ["a", "b", "c"]
# Columns never used as aggregate targets (must exist in the dataset)
key_columns = []

[model]
models_dir = "models"
# Checkpoint glob; file names must match *model<bits>-data<bits>*seed<n>*.pt
glob = "*.pt"
# Skip checkpoints containing this substring (uncomment to enable)
# blacklist = "old"
# Progressive samples per query
psample = 2000
# Skip unfiltered columns while sampling
column_masking = false
# Explicit variable order (uncomment to enable)
# order = [0, 2, 1]

[model.architecture]
fc_hiddens = 128
layers = 4
residual = false
direct_io = false
input_encoding = "binary"
output_encoding = "one_hot"
# Attention heads; 0 selects the factorized family
heads = 0
blocks = 2
d_model = 32
d_ff = 128
activation = "gelu"

[estimators]
# Uniform-sampling baseline
run_sampling = false
sample_ratio = 0.01

[runner]
num_queries = 20
seed = 1234
# Throughput log interval
log_every = 100
# Worker threads (1 = in-process)
parallelism = 1
# Longest wait for a single worker reply
worker_timeout = "10m"
min_filters = 5
max_filters = 10
reserved_suffix = 2

[output]
results_dir = "results"
# Per-query error CSV (uncomment to enable)
# err_csv = "results/errors.csv"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow::anyhow!("Duration must be a non-negative number: {}", s));
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        let nanos = value * multiplier as f64;
        if nanos >= u64::MAX as f64 {
            return Err(anyhow::anyhow!("Duration too large: {}", s));
        }
        Ok(nanos as u64)
    }
}
