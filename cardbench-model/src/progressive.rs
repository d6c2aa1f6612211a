//! Progressive Sampling
//!
//! Estimates the selectivity of a conjunction by drawing `psample` partial
//! tuples from the model, one column at a time in the model's order. At each
//! filtered column every sample's weight is multiplied by the probability
//! mass inside the filter and a code is drawn from the filtered conditional.
//! The mean final weight times the table cardinality is the estimate.
//!
//! The sampler is reseeded for every query from the query's fingerprint, so
//! a query's estimate does not depend on what ran before it.

use crate::checkpoint::CheckpointMeta;
use crate::model::BackingModel;
use cardbench_core::{
    AggregateEstimate, AggregateKind, AggregateQuery, CodeMasks, Estimator, EstimatorError,
    EstimatorStats, GroupKey, Query, Table, VariableOrder,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Default number of progressive samples per query
pub const DEFAULT_PSAMPLE: usize = 2000;

/// Progressive-sampling settings
#[derive(Debug, Clone)]
pub struct ProgressiveConfig {
    /// Samples drawn per query
    pub psample: usize,
    /// Skip unfiltered columns instead of sampling them
    pub shortcircuit: bool,
    /// Base seed of the per-query sampler
    pub seed: u64,
}

impl Default for ProgressiveConfig {
    fn default() -> Self {
        Self {
            psample: DEFAULT_PSAMPLE,
            shortcircuit: false,
            seed: 0,
        }
    }
}

/// Result of one progressive pass
struct Draws {
    /// Final weight per sample
    weights: Vec<f64>,
    /// Sampled code per sample and natural column
    rows: Vec<Vec<Option<u32>>>,
    /// Masked distribution of the last column, per sample
    last: Option<Vec<Vec<f64>>>,
}

/// Model-backed cardinality and aggregate estimator
pub struct ProgressiveSampling {
    name: String,
    model: BackingModel,
    table: Arc<Table>,
    config: ProgressiveConfig,
    stats: EstimatorStats,
}

impl ProgressiveSampling {
    /// Wrap a loaded model
    pub fn new(model: BackingModel, table: Arc<Table>, config: ProgressiveConfig) -> Self {
        Self {
            name: format!("psample_{}", config.psample),
            model,
            table,
            config,
            stats: EstimatorStats::default(),
        }
    }

    /// Name the estimator after its checkpoint:
    /// `psample_<psample>_<seed>_<bits_gap>`
    pub fn named_for(mut self, checkpoint: &CheckpointMeta) -> Self {
        self.name = format!(
            "psample_{}_{}_{:.3}",
            self.config.psample,
            checkpoint.seed,
            checkpoint.bits_gap()
        );
        self
    }

    /// Backing model
    pub fn model(&self) -> &BackingModel {
        &self.model
    }

    fn rng_for(&self, fingerprint: u64) -> StdRng {
        StdRng::seed_from_u64(self.config.seed.wrapping_add(fingerprint))
    }

    /// Walk the model order drawing codes.
    ///
    /// `keep` marks columns that must be sampled even when unfiltered.
    /// When `last` is set, that column is not sampled; its masked conditional
    /// is returned instead.
    fn draw(
        &self,
        masks: &CodeMasks,
        keep: &[bool],
        last: Option<usize>,
        rng: &mut StdRng,
    ) -> Draws {
        let network = self.model.network();
        let bins = network.input_bins();
        let order = self.model.order();
        let n = self.config.psample.max(1);

        let needed = |col: usize| masks[col].is_some() || keep[col] || Some(col) == last;
        let stop = (0..order.len())
            .rev()
            .find(|&p| needed(order.column_at(p)))
            .map_or(0, |p| p + 1);

        let mut rows = vec![vec![None; order.len()]; n];
        let mut weights = vec![1.0; n];
        let mut last_dists = None;

        for position in 0..stop {
            let col = order.column_at(position);
            if self.config.shortcircuit && !needed(col) {
                continue;
            }
            let range: Range<usize> = masks[col].clone().unwrap_or(0..bins[col]);
            let encoded = network.encode_input(&rows);
            let dists = network.forward_with_encoded_input(&encoded, col);

            if Some(col) == last {
                let masked = dists
                    .into_iter()
                    .zip(weights.iter_mut())
                    .map(|(dist, w)| {
                        let mut out = vec![0.0; dist.len()];
                        out[range.clone()].copy_from_slice(&dist[range.clone()]);
                        *w *= out.iter().sum::<f64>();
                        out
                    })
                    .collect();
                last_dists = Some(masked);
                continue;
            }

            for (s, dist) in dists.iter().enumerate() {
                if weights[s] == 0.0 {
                    continue;
                }
                let slice = &dist[range.clone()];
                let mass: f64 = slice.iter().sum();
                weights[s] *= mass;
                if mass > 0.0 {
                    rows[s][col] = Some((range.start + pick_code(slice, mass, rng)) as u32);
                }
            }
        }

        Draws {
            weights,
            rows,
            last: last_dists,
        }
    }

    fn card_from(&self, weights: &[f64]) -> f64 {
        let mean = weights.iter().sum::<f64>() / weights.len().max(1) as f64;
        mean * self.table.cardinality() as f64
    }

    fn group_key(&self, row: &[Option<u32>], group_by: &[usize]) -> Option<GroupKey> {
        group_by
            .iter()
            .map(|&c| row[c].map(|code| self.table.column(c).value(code).clone()))
            .collect()
    }

    fn estimate_count(&self, query: &AggregateQuery, rng: &mut StdRng) -> AggregateEstimate {
        let masks = query.code_masks(&self.table);
        let mut keep = vec![false; masks.len()];
        for &g in query.group_by.iter().flatten() {
            keep[g] = true;
        }
        let draws = self.draw(&masks, &keep, None, rng);

        match &query.group_by {
            None => AggregateEstimate::Scalar(Some(self.card_from(&draws.weights))),
            Some(group_by) => {
                let n = draws.weights.len() as f64;
                let scale = self.table.cardinality() as f64 / n;
                let mut groups: BTreeMap<GroupKey, f64> = BTreeMap::new();
                for (row, w) in draws.rows.iter().zip(&draws.weights) {
                    if *w == 0.0 {
                        continue;
                    }
                    if let Some(key) = self.group_key(row, group_by) {
                        *groups.entry(key).or_default() += w * scale;
                    }
                }
                AggregateEstimate::Grouped(groups.into_iter().map(|(k, v)| (k, Some(v))).collect())
            }
        }
    }

    fn estimate_avg(
        &self,
        query: &AggregateQuery,
        rng: &mut StdRng,
    ) -> Result<AggregateEstimate, EstimatorError> {
        let agg = query.agg_column;
        let order = self.model.order();
        if order.as_slice().last() != Some(&agg) {
            return Err(EstimatorError::Failed {
                estimator: self.name.clone(),
                message: format!(
                    "aggregate column {} must be last in the model order {:?}",
                    self.table.column(agg).name(),
                    order.as_slice()
                ),
            });
        }
        // Non-numeric columns have no average; groups are still reported.
        let values: Option<Vec<f64>> = self
            .table
            .column(agg)
            .all_distinct_values()
            .iter()
            .map(|v| v.as_f64())
            .collect();
        if values.is_none() {
            debug!(
                "Column {} is not numeric, averages are undefined",
                self.table.column(agg).name()
            );
        }

        let masks = query.code_masks(&self.table);
        let mut keep = vec![false; masks.len()];
        for &g in query.group_by.iter().flatten() {
            keep[g] = true;
        }
        let draws = self.draw(&masks, &keep, Some(agg), rng);
        let last = draws.last.unwrap_or_default();

        // Weighted sum of E[value | prefix, filter] and total weight, per group.
        let mut groups: BTreeMap<GroupKey, (f64, f64)> = BTreeMap::new();
        for (s, (row, w)) in draws.rows.iter().zip(&draws.weights).enumerate() {
            if *w == 0.0 {
                continue;
            }
            let expected = match &values {
                Some(values) => {
                    let dist = &last[s];
                    let mass: f64 = dist.iter().sum();
                    dist.iter().zip(values).map(|(p, v)| p * v).sum::<f64>() / mass
                }
                None => 0.0,
            };
            let key = match &query.group_by {
                Some(group_by) => match self.group_key(row, group_by) {
                    Some(key) => key,
                    None => continue,
                },
                None => Vec::new(),
            };
            let entry = groups.entry(key).or_insert((0.0, 0.0));
            entry.0 += w * expected;
            entry.1 += w;
        }

        let numeric = values.is_some();
        let avg = |(num, den): (f64, f64)| {
            if numeric && den > 0.0 {
                Some(num / den)
            } else {
                None
            }
        };
        Ok(match &query.group_by {
            None => AggregateEstimate::Scalar(groups.remove(&Vec::new()).and_then(avg)),
            Some(_) => AggregateEstimate::Grouped(
                groups.into_iter().map(|(k, acc)| (k, avg(acc))).collect(),
            ),
        })
    }
}

/// Index into `dist` drawn proportionally to its entries; `mass` is their sum.
fn pick_code(dist: &[f64], mass: f64, rng: &mut StdRng) -> usize {
    let target = rng.gen_range(0.0..mass);
    let mut acc = 0.0;
    for (i, p) in dist.iter().enumerate() {
        acc += p;
        if target < acc {
            return i;
        }
    }
    dist.iter().rposition(|p| *p > 0.0).unwrap_or(0)
}

impl Estimator for ProgressiveSampling {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&mut self, query: &Query) -> Result<f64, EstimatorError> {
        let mut rng = self.rng_for(query.fingerprint());
        let masks = query.code_masks(&self.table);
        let keep = vec![false; masks.len()];
        let draws = self.draw(&masks, &keep, None, &mut rng);
        Ok(self.card_from(&draws.weights))
    }

    fn stats(&self) -> &EstimatorStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut EstimatorStats {
        &mut self.stats
    }

    fn order(&self) -> Option<&VariableOrder> {
        self.model.fixed_order()
    }

    fn estimate_aggregate(
        &mut self,
        query: &AggregateQuery,
        kind: AggregateKind,
    ) -> Result<AggregateEstimate, EstimatorError> {
        let mut rng = self.rng_for(query.fingerprint());
        match kind {
            AggregateKind::Count => Ok(self.estimate_count(query, &mut rng)),
            AggregateKind::Avg => self.estimate_avg(query, &mut rng),
        }
    }
}
