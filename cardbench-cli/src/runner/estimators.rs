//! Estimator Construction
//!
//! Builds the table, the oracle and the estimator set from configuration.
//! Every call builds fresh state, so each worker of a parallel run owns a
//! private copy of the table and of every loaded model.

use super::execution::EstimatorRunner;
use crate::config::{CardbenchConfig, EstimatorsConfig, ModelConfig};
use anyhow::Context;
use cardbench_core::{DatasetSpec, Estimator, Oracle, Table, VariableOrder};
use cardbench_model::{
    BackingModel, CheckpointLoader, CheckpointMeta, ModelError, ProgressiveConfig,
    ProgressiveSampling, SamplingEstimator, discover_checkpoints,
};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Where a factory gets its table from
#[derive(Debug, Clone)]
pub enum TableSource {
    /// Read the CSV on every build
    Csv(DatasetSpec),
    /// Deep-copy an already loaded table on every build
    Loaded(Table),
}

impl TableSource {
    /// Produce a private copy of the table
    pub fn load(&self) -> anyhow::Result<Table> {
        match self {
            TableSource::Csv(spec) => spec
                .load()
                .with_context(|| format!("Failed to load dataset {}", spec.path.display())),
            TableSource::Loaded(table) => Ok(table.clone()),
        }
    }
}

/// Builds everything one benchmark participant needs
#[derive(Clone)]
pub struct EstimatorFactory {
    table: TableSource,
    checkpoints: Vec<CheckpointMeta>,
    loader: Arc<dyn CheckpointLoader>,
    model: ModelConfig,
    estimators: EstimatorsConfig,
    seed: u64,
}

impl fmt::Debug for EstimatorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EstimatorFactory")
            .field("table", &self.table)
            .field("checkpoints", &self.checkpoints)
            .field("model", &self.model)
            .field("estimators", &self.estimators)
            .field("seed", &self.seed)
            .finish()
    }
}

impl EstimatorFactory {
    /// Create a factory over explicit inputs
    pub fn new(
        table: TableSource,
        checkpoints: Vec<CheckpointMeta>,
        loader: Arc<dyn CheckpointLoader>,
        config: &CardbenchConfig,
    ) -> Self {
        Self {
            table,
            checkpoints,
            loader,
            model: config.model.clone(),
            estimators: config.estimators.clone(),
            seed: config.runner.seed,
        }
    }

    /// Resolve the dataset and discover checkpoints as configured.
    pub fn from_config(
        config: &CardbenchConfig,
        loader: Arc<dyn CheckpointLoader>,
    ) -> anyhow::Result<Self> {
        let columns = (!config.dataset.columns.is_empty()).then_some(config.dataset.columns.as_slice());
        let spec = DatasetSpec::resolve(&config.dataset.name, &config.dataset.datasets_dir, columns)?;
        let checkpoints = discover_checkpoints(
            &config.model.models_dir,
            &config.model.glob,
            config.model.blacklist.as_deref(),
        )?;
        Ok(Self::new(TableSource::Csv(spec), checkpoints, loader, config))
    }

    /// Checkpoints every build loads
    pub fn checkpoints(&self) -> &[CheckpointMeta] {
        &self.checkpoints
    }

    /// Load a private copy of the table
    pub fn load_table(&self) -> anyhow::Result<Arc<Table>> {
        let table = self.table.load()?;
        info!(
            "Loaded table {} ({} rows, {} columns)",
            table.name(),
            table.cardinality(),
            table.columns().len()
        );
        Ok(Arc::new(table))
    }

    /// The configured explicit order, if any
    pub fn configured_order(&self) -> anyhow::Result<Option<VariableOrder>> {
        if self.model.order.is_empty() {
            return Ok(None);
        }
        Ok(Some(VariableOrder::new(self.model.order.clone())?))
    }

    /// Load one checkpoint as a progressive-sampling estimator.
    ///
    /// `order` of `None` loads the model in natural order.
    pub fn progressive(
        &self,
        table: &Arc<Table>,
        checkpoint: &CheckpointMeta,
        order: Option<&VariableOrder>,
    ) -> Result<ProgressiveSampling, ModelError> {
        let model = BackingModel::load(
            self.loader.as_ref(),
            checkpoint,
            table,
            &self.model.architecture,
            order,
        )?;
        let config = ProgressiveConfig {
            psample: self.model.psample,
            shortcircuit: self.model.column_masking,
            seed: self.seed,
        };
        Ok(ProgressiveSampling::new(model, table.clone(), config).named_for(checkpoint))
    }

    /// One estimator per checkpoint, plus the sampling baseline if enabled
    pub fn build_estimators(
        &self,
        table: &Arc<Table>,
        order: Option<&VariableOrder>,
    ) -> anyhow::Result<Vec<Box<dyn Estimator>>> {
        let mut estimators: Vec<Box<dyn Estimator>> = Vec::new();
        for checkpoint in &self.checkpoints {
            let estimator = self
                .progressive(table, checkpoint, order)
                .with_context(|| format!("Failed to load {}", checkpoint.path.display()))?;
            estimators.push(Box::new(estimator));
        }
        if self.estimators.run_sampling {
            estimators.push(Box::new(SamplingEstimator::new(
                table.clone(),
                self.estimators.sample_ratio,
                self.seed,
            )));
        }
        Ok(estimators)
    }

    /// Fresh table, oracle and estimators
    pub fn build_runner(&self) -> anyhow::Result<EstimatorRunner> {
        let table = self.load_table()?;
        let order = self.configured_order()?;
        let estimators = self.build_estimators(&table, order.as_ref())?;
        Ok(EstimatorRunner::new(Oracle::new(table), estimators))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardbench_core::{Column, Value};
    use cardbench_model::{DensityNetwork, MarginalNetwork, ModelSpec};

    struct FitLoader {
        table: Table,
    }

    impl CheckpointLoader for FitLoader {
        fn load(
            &self,
            _checkpoint: &CheckpointMeta,
            spec: &ModelSpec,
        ) -> Result<Box<dyn DensityNetwork>, ModelError> {
            Ok(Box::new(MarginalNetwork::fit(
                &self.table,
                spec.fixed_ordering.as_ref(),
            )))
        }
    }

    fn table() -> Table {
        Table::new(
            "t",
            vec![
                Column::new("a", (0..20).map(|i| Value::Int(i % 4)).collect()),
                Column::new("b", (0..20).map(|i| Value::Int(i % 5)).collect()),
            ],
        )
        .unwrap()
    }

    fn factory(config: &CardbenchConfig) -> EstimatorFactory {
        let checkpoints = vec![
            CheckpointMeta::parse("m-model12.3-data10.1-seed42.pt").unwrap(),
            CheckpointMeta::parse("m-model11.0-data10.0-seed7.pt").unwrap(),
        ];
        EstimatorFactory::new(
            TableSource::Loaded(table()),
            checkpoints,
            Arc::new(FitLoader { table: table() }),
            config,
        )
    }

    #[test]
    fn test_builds_one_estimator_per_checkpoint() {
        let mut config = CardbenchConfig::default();
        config.model.psample = 50;
        config.estimators.run_sampling = true;
        config.estimators.sample_ratio = 0.5;
        let runner = factory(&config).build_runner().unwrap();
        assert_eq!(
            runner.estimator_names(),
            vec!["psample_50_42_2.200", "psample_50_7_1.000", "sample_0.5"]
        );
        assert_eq!(runner.table().cardinality(), 20);
    }

    #[test]
    fn test_configured_order_is_validated() {
        let mut config = CardbenchConfig::default();
        config.model.order = vec![1, 0];
        let f = factory(&config);
        assert_eq!(f.configured_order().unwrap().unwrap().as_slice(), &[1, 0]);
        assert!(f.build_runner().is_ok());

        config.model.order = vec![0, 0];
        assert!(factory(&config).configured_order().is_err());

        config.model.order = vec![2, 0, 1];
        assert!(factory(&config).build_runner().is_err());
    }

    #[test]
    fn test_builds_are_independent_copies() {
        let f = factory(&CardbenchConfig::default());
        let a = f.load_table().unwrap();
        let b = f.load_table().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
