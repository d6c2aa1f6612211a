#![warn(missing_docs)]
//! Cardbench CLI
//!
//! Command-line interface for benchmarking cardinality and aggregate
//! estimators against exact answers.
//!
//! - `point` (default): random point-cardinality queries, error summary per estimator
//! - `aggregate`: random aggregate / group-by queries, one JSON record each
//! - `query`: a single aggregate query given on the command line
//! - `init`: write a default `cardbench.toml`

mod clauses;
mod config;
mod coordinator;
mod oracle_cache;
mod runner;

pub use clauses::{ClauseError, parse_group_by, parse_where, split_clause};
pub use config::*;
pub use coordinator::{Coordinator, CoordinatorError, WorkerFactory};
pub use oracle_cache::{
    OracleCacheError, OracleCacheSpec, load_oracle_cards, oracle_cache_spec, read_oracle_cards,
};
pub use runner::{
    AggregateOutcome, EstimatorFactory, EstimatorRunner, PointRecording, RunError, TableSource,
    compute_error_summaries, format_aggregate_answers, format_error_summaries, generate_queries,
    report_estimators, run_single_aggregate_query,
};

use anyhow::Context;
use cardbench_core::{
    AggregateQuery, Estimator, Oracle, QueryGenerator, Table, VariableOrder,
    generate_order_by_index,
};
use cardbench_model::{CheckpointMeta, JsonCheckpointLoader, SamplingEstimator};
use cardbench_report::{RecordMeta, ResultRecord, ResultRecorder, write_error_csv};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Cardbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "cardbench")]
#[command(author, version, about = "Cardbench - cardinality estimator benchmark")]
pub struct Cli {
    /// Optional subcommand (Point, Aggregate, Query, Init); defaults to Point
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (default: discover cardbench.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Dataset: dmv, dmv-tiny, or a CSV file under the datasets directory
    #[arg(long)]
    pub dataset: Option<String>,

    /// Directory holding datasets and oracle caches
    #[arg(long)]
    pub datasets_dir: Option<PathBuf>,

    /// Columns to load (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Number of generated queries
    #[arg(long, short = 'n')]
    pub num_queries: Option<usize>,

    /// Seed of query generation and sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory searched for checkpoints
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Checkpoint glob, relative to the models directory
    #[arg(long)]
    pub glob: Option<String>,

    /// Skip checkpoints whose path contains this substring
    #[arg(long)]
    pub blacklist: Option<String>,

    /// Progressive samples per query
    #[arg(long)]
    pub psample: Option<usize>,

    /// Skip unfiltered columns while sampling
    #[arg(long)]
    pub column_masking: bool,

    /// Explicit variable order, e.g. 0,2,1
    #[arg(long, value_delimiter = ',')]
    pub order: Vec<usize>,

    /// Hidden width of fully connected layers
    #[arg(long)]
    pub fc_hiddens: Option<usize>,

    /// Number of fully connected layers
    #[arg(long)]
    pub layers: Option<usize>,

    /// Attention heads; 0 selects the factorized family
    #[arg(long)]
    pub heads: Option<usize>,

    /// Transformer blocks
    #[arg(long)]
    pub blocks: Option<usize>,

    /// Transformer model width
    #[arg(long)]
    pub d_model: Option<usize>,

    /// Transformer feed-forward width
    #[arg(long)]
    pub d_ff: Option<usize>,

    /// Add the uniform-sampling baseline
    #[arg(long)]
    pub run_sampling: bool,

    /// Fraction of rows kept by the sampling baseline
    #[arg(long)]
    pub sample_ratio: Option<f64>,

    /// Worker threads (1 = in-process)
    #[arg(long, short = 'j')]
    pub parallelism: Option<usize>,

    /// Directory for JSON result records
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Write every estimator's per-query errors to this CSV
    #[arg(long)]
    pub err_csv: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Random point-cardinality benchmark (default)
    Point,
    /// Random aggregate / group-by benchmark
    Aggregate,
    /// Run one aggregate query given on the command line
    Query {
        /// Aggregate column
        #[arg(long)]
        agg_col: String,
        /// Filter such as "Model Year>=2000"; repeat for more
        #[arg(long = "where")]
        where_clauses: Vec<String>,
        /// Group-by columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        group_by: Vec<String>,
    },
    /// Write a default cardbench.toml to the current directory
    Init,
}

/// Run the Cardbench CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if something goes wrong.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the Cardbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("cardbench=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("cardbench=info")
            .init();
    }

    if let Some(Commands::Init) = cli.command {
        return write_default_config();
    }

    let config = match &cli.config {
        Some(path) => CardbenchConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => CardbenchConfig::discover().unwrap_or_default(),
    };
    let config = apply_overrides(&cli, config);

    match cli.command {
        Some(Commands::Point) | None => run_point_benchmark(&config),
        Some(Commands::Aggregate) => run_aggregate_benchmark(&config),
        Some(Commands::Query {
            ref agg_col,
            ref where_clauses,
            ref group_by,
        }) => run_specified_query(&config, agg_col, where_clauses, group_by),
        Some(Commands::Init) => Ok(()),
    }
}

/// Layer CLI flags over file values: a flag wins when given.
pub fn apply_overrides(cli: &Cli, mut config: CardbenchConfig) -> CardbenchConfig {
    if let Some(name) = &cli.dataset {
        config.dataset.name = name.clone();
    }
    if let Some(dir) = &cli.datasets_dir {
        config.dataset.datasets_dir = dir.clone();
    }
    if !cli.columns.is_empty() {
        config.dataset.columns = cli.columns.clone();
    }
    if let Some(n) = cli.num_queries {
        config.runner.num_queries = n;
    }
    if let Some(seed) = cli.seed {
        config.runner.seed = seed;
    }
    if let Some(p) = cli.parallelism {
        config.runner.parallelism = p.max(1);
    }

    let model = &mut config.model;
    if let Some(dir) = &cli.models_dir {
        model.models_dir = dir.clone();
    }
    if let Some(glob) = &cli.glob {
        model.glob = glob.clone();
    }
    if cli.blacklist.is_some() {
        model.blacklist = cli.blacklist.clone();
    }
    if let Some(psample) = cli.psample {
        model.psample = psample;
    }
    model.column_masking |= cli.column_masking;
    if !cli.order.is_empty() {
        model.order = cli.order.clone();
    }

    let arch = &mut model.architecture;
    arch.column_masking = model.column_masking;
    if let Some(v) = cli.fc_hiddens {
        arch.fc_hiddens = v;
    }
    if let Some(v) = cli.layers {
        arch.layers = v;
    }
    if let Some(v) = cli.heads {
        arch.heads = v;
    }
    if let Some(v) = cli.blocks {
        arch.blocks = v;
    }
    if let Some(v) = cli.d_model {
        arch.d_model = v;
    }
    if let Some(v) = cli.d_ff {
        arch.d_ff = v;
    }

    config.estimators.run_sampling |= cli.run_sampling;
    if let Some(ratio) = cli.sample_ratio {
        config.estimators.sample_ratio = ratio;
    }
    if let Some(dir) = &cli.results_dir {
        config.output.results_dir = dir.clone();
    }
    if cli.err_csv.is_some() {
        config.output.err_csv = cli.err_csv.clone();
    }
    config
}

fn write_default_config() -> anyhow::Result<()> {
    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    std::fs::write(&path, CardbenchConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn ensure_estimators(factory: &EstimatorFactory, config: &CardbenchConfig) -> anyhow::Result<()> {
    if factory.checkpoints().is_empty() && !config.estimators.run_sampling {
        anyhow::bail!(
            "No checkpoint matches {} and the sampling baseline is off",
            config.model.models_dir.join(&config.model.glob).display()
        );
    }
    Ok(())
}

/// Random point-cardinality benchmark
fn run_point_benchmark(config: &CardbenchConfig) -> anyhow::Result<()> {
    let factory = EstimatorFactory::from_config(config, Arc::new(JsonCheckpointLoader))?;
    ensure_estimators(&factory, config)?;

    let mut driver = factory
        .build_runner()?
        .with_progress(config.runner.parallelism == 1)
        .with_log_every(config.runner.log_every);

    let generator = QueryGenerator::new(config.runner.query_gen());
    let queries = generate_queries(
        driver.table(),
        &generator,
        config.runner.num_queries,
        config.runner.seed,
    )?;
    info!("Generated {} queries (seed {})", queries.len(), config.runner.seed);

    let oracle_cards = match oracle_cache_spec(&config.dataset.name) {
        Some(cache) if cache.seed != config.runner.seed => {
            warn!("Oracle cache was built with seed {}; scanning instead", cache.seed);
            None
        }
        _ => load_oracle_cards(&config.dataset.name, &config.dataset.datasets_dir)?,
    };

    if config.runner.parallelism > 1 {
        let coordinator = Coordinator::new(config.runner.parallelism, config.worker_timeout()?);
        coordinator.run_n_parallel(
            &mut driver,
            Arc::new(factory),
            &queries,
            oracle_cards.as_deref(),
        )?;
        report_estimators(driver.estimators());
    } else {
        let recorder = ResultRecorder::new(&config.output.results_dir)?;
        let model = config.model.glob.clone();
        driver = driver.with_recording(PointRecording {
            recorder,
            dataset: config.dataset.name.clone(),
            model,
        });
        driver.run_n(&queries, oracle_cards.as_deref())?;
    }

    print!("{}", format_error_summaries(&compute_error_summaries(driver.estimators())));

    if let Some(path) = &config.output.err_csv {
        write_error_csv(
            path,
            driver.estimators().iter().map(|e| (e.name(), e.stats())),
        )?;
        info!("Wrote errors to {}", path.display());
    }
    Ok(())
}

/// Count / average estimator pairs to evaluate aggregate queries with
enum AggregatePair<'a> {
    Model(&'a CheckpointMeta),
    Sampling,
}

impl AggregatePair<'_> {
    fn label(&self, config: &CardbenchConfig) -> String {
        match self {
            AggregatePair::Model(ckpt) => ckpt.path.display().to_string(),
            AggregatePair::Sampling => format!("sample_{}", config.estimators.sample_ratio),
        }
    }

    fn build(
        &self,
        factory: &EstimatorFactory,
        config: &CardbenchConfig,
        table: &Arc<Table>,
        order: &VariableOrder,
    ) -> anyhow::Result<(Box<dyn Estimator>, Box<dyn Estimator>)> {
        match self {
            // Count in natural order; the average needs the aggregate column last.
            AggregatePair::Model(ckpt) => {
                let count: Box<dyn Estimator> = Box::new(factory.progressive(table, ckpt, None)?);
                let avg: Box<dyn Estimator> =
                    Box::new(factory.progressive(table, ckpt, Some(order))?);
                Ok((count, avg))
            }
            AggregatePair::Sampling => {
                let ratio = config.estimators.sample_ratio;
                let seed = config.runner.seed;
                let count: Box<dyn Estimator> =
                    Box::new(SamplingEstimator::new(table.clone(), ratio, seed));
                let avg: Box<dyn Estimator> =
                    Box::new(SamplingEstimator::new(table.clone(), ratio, seed));
                Ok((count, avg))
            }
        }
    }
}

fn aggregate_pairs<'a>(
    factory: &'a EstimatorFactory,
    config: &CardbenchConfig,
) -> Vec<AggregatePair<'a>> {
    let mut pairs: Vec<AggregatePair<'a>> =
        factory.checkpoints().iter().map(AggregatePair::Model).collect();
    if config.estimators.run_sampling {
        pairs.push(AggregatePair::Sampling);
    }
    pairs
}

/// Evaluate and record one aggregate query with every estimator pair.
///
/// Without an explicit `order` the aggregate column goes last, after any
/// group-by columns.
fn evaluate_aggregate(
    factory: &EstimatorFactory,
    config: &CardbenchConfig,
    oracle: &mut Oracle,
    recorder: &mut ResultRecorder,
    query: &AggregateQuery,
    order: Option<VariableOrder>,
) -> anyhow::Result<()> {
    let table = oracle.table().clone();
    let order = match order {
        Some(order) => order,
        None => generate_order_by_index(
            table.columns().len(),
            query.agg_column,
            query.group_by.as_deref(),
        )?,
    };
    let sql = query.to_sql(&table, &config.dataset.name);
    info!("{}", sql);

    for pair in aggregate_pairs(factory, config) {
        let (mut count, mut avg) = pair.build(factory, config, &table, &order)?;
        let outcome = run_single_aggregate_query(
            count.as_mut(),
            avg.as_mut(),
            oracle,
            query,
            Some(order.as_slice().to_vec()),
        )?;
        print!("{}", format_aggregate_answers(&outcome.estimated, &outcome.real));

        let record = ResultRecord::from_aggregate(
            RecordMeta::now(config.dataset.name.as_str(), pair.label(config)),
            sql.clone(),
            &outcome.estimated,
            &outcome.real,
            outcome.run,
        )?;
        recorder.record(&record)?;
    }
    Ok(())
}

/// Random aggregate benchmark: one record per query and estimator pair
fn run_aggregate_benchmark(config: &CardbenchConfig) -> anyhow::Result<()> {
    let factory = EstimatorFactory::from_config(config, Arc::new(JsonCheckpointLoader))?;
    ensure_estimators(&factory, config)?;
    let table = factory.load_table()?;
    let mut oracle = Oracle::new(table.clone());
    let mut recorder = ResultRecorder::new(&config.output.results_dir)?;

    let generator = QueryGenerator::new(config.runner.query_gen());
    let mut rng = StdRng::seed_from_u64(config.runner.seed);
    for i in 0..config.runner.num_queries {
        let query = generator.generate_aggregate_query(&table, &config.dataset.key_columns, &mut rng)?;
        info!("Aggregate query {}/{}", i + 1, config.runner.num_queries);
        evaluate_aggregate(&factory, config, &mut oracle, &mut recorder, &query, None)?;
    }
    info!(
        "Wrote {} records to {}",
        recorder.written(),
        recorder.dir().display()
    );
    Ok(())
}

/// Single aggregate query given on the command line
fn run_specified_query(
    config: &CardbenchConfig,
    agg_col: &str,
    where_clauses: &[String],
    group_by: &[String],
) -> anyhow::Result<()> {
    let factory = EstimatorFactory::from_config(config, Arc::new(JsonCheckpointLoader))?;
    ensure_estimators(&factory, config)?;
    let table = factory.load_table()?;

    let query = AggregateQuery {
        agg_column: table.column_index(agg_col)?,
        filters: parse_where(&table, where_clauses)?,
        group_by: parse_group_by(&table, group_by)?,
    };
    let order = factory.configured_order()?;
    if let Some(order) = &order {
        order.check_len(table.columns().len())?;
        if order.as_slice().last() != Some(&query.agg_column) {
            warn!("Explicit order does not end with the aggregate column");
        }
    }
    let mut oracle = Oracle::new(table);
    let mut recorder = ResultRecorder::new(&config.output.results_dir)?;
    evaluate_aggregate(&factory, config, &mut oracle, &mut recorder, &query, order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_query_subcommand() {
        let cli = Cli::try_parse_from([
            "cardbench",
            "--dataset",
            "tpcds",
            "--columns",
            "a,b,c",
            "--order",
            "2,0,1",
            "query",
            "--agg-col",
            "c",
            "--where",
            "a>=1",
            "--where",
            "a<=5",
            "--group-by",
            "b",
        ])
        .unwrap();
        assert_eq!(cli.columns, vec!["a", "b", "c"]);
        assert_eq!(cli.order, vec![2, 0, 1]);
        match cli.command {
            Some(Commands::Query {
                agg_col,
                where_clauses,
                group_by,
            }) => {
                assert_eq!(agg_col, "c");
                assert_eq!(where_clauses, vec!["a>=1", "a<=5"]);
                assert_eq!(group_by, vec!["b"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "cardbench",
            "-n",
            "7",
            "--psample",
            "500",
            "--heads",
            "4",
            "--column-masking",
            "--run-sampling",
            "-j",
            "0",
        ])
        .unwrap();
        let config = apply_overrides(&cli, CardbenchConfig::default());
        assert_eq!(config.runner.num_queries, 7);
        assert_eq!(config.runner.parallelism, 1);
        assert_eq!(config.model.psample, 500);
        assert_eq!(config.model.architecture.heads, 4);
        assert!(config.model.column_masking);
        assert!(config.model.architecture.column_masking);
        assert!(config.estimators.run_sampling);
        assert_eq!(config.runner.seed, 1234);
    }

    #[test]
    fn test_absent_flags_keep_file_values() {
        let cli = Cli::try_parse_from(["cardbench"]).unwrap();
        let mut file = CardbenchConfig::default();
        file.runner.num_queries = 99;
        file.model.order = vec![1, 0];
        let config = apply_overrides(&cli, file);
        assert_eq!(config.runner.num_queries, 99);
        assert_eq!(config.model.order, vec![1, 0]);
        assert!(cli.command.is_none());
    }
}
