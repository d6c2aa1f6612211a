//! Uniform Sampling Baseline
//!
//! Keeps a fixed fraction of the table's rows, drawn uniformly without
//! replacement, and answers every query by scaling up what the sample says.

use cardbench_core::{
    AggregateEstimate, AggregateKind, AggregateQuery, CodeMasks, Estimator, EstimatorError,
    EstimatorStats, GroupKey, Query, Table,
};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Estimator over a uniform row sample
pub struct SamplingEstimator {
    name: String,
    table: Arc<Table>,
    rows: Vec<usize>,
    stats: EstimatorStats,
}

impl SamplingEstimator {
    /// Sample `ratio` of the rows (at least one) with a seeded generator
    pub fn new(table: Arc<Table>, ratio: f64, seed: u64) -> Self {
        let n = table.cardinality();
        let size = ((n as f64 * ratio).ceil() as usize).clamp(n.min(1), n);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows = index::sample(&mut rng, n, size).into_vec();
        rows.sort_unstable();
        debug!("Sampling estimator keeps {} of {} rows", size, n);
        Self {
            name: format!("sample_{}", ratio),
            table,
            rows,
            stats: EstimatorStats::default(),
        }
    }

    fn scale(&self) -> f64 {
        if self.rows.is_empty() {
            0.0
        } else {
            self.table.cardinality() as f64 / self.rows.len() as f64
        }
    }

    fn matching<'a>(&'a self, masks: &'a CodeMasks) -> impl Iterator<Item = usize> + 'a {
        self.rows.iter().copied().filter(move |&row| {
            masks.iter().enumerate().all(|(c, mask)| match mask {
                Some(range) => range.contains(&(self.table.column(c).codes()[row] as usize)),
                None => true,
            })
        })
    }

    fn key_of(&self, row: usize, group_by: &[usize]) -> GroupKey {
        group_by
            .iter()
            .map(|&c| self.table.column(c).value_at(row).clone())
            .collect()
    }
}

impl Estimator for SamplingEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&mut self, query: &Query) -> Result<f64, EstimatorError> {
        let masks = query.code_masks(&self.table);
        Ok(self.matching(&masks).count() as f64 * self.scale())
    }

    fn stats(&self) -> &EstimatorStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut EstimatorStats {
        &mut self.stats
    }

    fn estimate_aggregate(
        &mut self,
        query: &AggregateQuery,
        kind: AggregateKind,
    ) -> Result<AggregateEstimate, EstimatorError> {
        let masks = query.code_masks(&self.table);
        let agg = self.table.column(query.agg_column);
        let group_by = query.group_by.clone().unwrap_or_default();

        let mut groups: BTreeMap<GroupKey, (usize, f64, bool)> = BTreeMap::new();
        for row in self.matching(&masks) {
            let entry = groups
                .entry(self.key_of(row, &group_by))
                .or_insert((0, 0.0, true));
            entry.0 += 1;
            match agg.value_at(row).as_f64() {
                Some(v) => entry.1 += v,
                None => entry.2 = false,
            }
        }

        let scale = self.scale();
        let answer = |(count, sum, numeric): (usize, f64, bool)| match kind {
            AggregateKind::Count => Some(count as f64 * scale),
            AggregateKind::Avg if numeric && count > 0 => Some(sum / count as f64),
            AggregateKind::Avg => None,
        };

        Ok(match query.group_by {
            None => {
                let acc = groups.remove(&Vec::new()).unwrap_or((0, 0.0, true));
                AggregateEstimate::Scalar(answer(acc))
            }
            Some(_) => AggregateEstimate::Grouped(
                groups.into_iter().map(|(k, acc)| (k, answer(acc))).collect(),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardbench_core::{Column, Filter, Oracle, Predicate, Value};

    fn table() -> Arc<Table> {
        Arc::new(
            Table::new(
                "t",
                vec![
                    Column::new("g", (0..100).map(|i| Value::Int(i % 4)).collect()),
                    Column::new("x", (0..100).map(Value::Int).collect()),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_full_sample_is_exact() {
        let t = table();
        let mut est = SamplingEstimator::new(t.clone(), 1.0, 7);
        let mut oracle = Oracle::new(t.clone());
        let q = Query::new(vec![
            Filter::new(0, Predicate::Eq(Value::Int(2))),
            Filter::new(1, Predicate::Ge(Value::Int(50))),
        ]);
        assert_eq!(est.query(&q).unwrap(), oracle.cardinality(&q) as f64);
        assert_eq!(est.name(), "sample_1");
    }

    #[test]
    fn test_sample_size_and_scale() {
        let est = SamplingEstimator::new(table(), 0.013, 1);
        assert_eq!(est.rows.len(), 2);
        assert_eq!(est.scale(), 50.0);
    }

    #[test]
    fn test_aggregates_on_full_sample() {
        let mut est = SamplingEstimator::new(table(), 1.0, 0);
        let q = AggregateQuery {
            agg_column: 1,
            filters: vec![Filter::new(1, Predicate::Le(Value::Int(9)))],
            group_by: None,
        };
        assert_eq!(
            est.estimate_aggregate(&q, AggregateKind::Avg).unwrap(),
            AggregateEstimate::Scalar(Some(4.5))
        );
        assert_eq!(
            est.estimate_aggregate(&q, AggregateKind::Count).unwrap(),
            AggregateEstimate::Scalar(Some(10.0))
        );

        let grouped = AggregateQuery {
            group_by: Some(vec![0]),
            ..q
        };
        let AggregateEstimate::Grouped(rows) =
            est.estimate_aggregate(&grouped, AggregateKind::Count).unwrap()
        else {
            panic!("expected grouped");
        };
        let counts: Vec<f64> = rows.iter().map(|(_, c)| c.unwrap()).collect();
        assert_eq!(counts, vec![3.0, 3.0, 2.0, 2.0]);
    }
}
