//! Random Query Generation
//!
//! Point queries are anchored on a random row so they are satisfiable by at
//! least that row. Aggregate queries favour few filters and use operator
//! groups with fixed weights. In both cases a column with fewer than
//! [`QueryGenConfig::range_threshold`] distinct values only ever gets `=`.

use crate::query::{AggregateQuery, Filter, Operator, Predicate, Query};
use crate::table::{Table, TableError};
use crate::value::Value;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use thiserror::Error;

/// Errors raised while generating queries
#[derive(Debug, Error)]
pub enum QueryGenError {
    #[error("Cannot pick {requested} filter columns: only {available} selectable")]
    NotEnoughColumns { requested: usize, available: usize },

    #[error("Cannot anchor a query on an empty table")]
    EmptyTable,

    #[error("No column left to aggregate once key columns are excluded")]
    NoAggregateCandidate,

    #[error("Unknown key column: {0}")]
    UnknownKeyColumn(#[source] TableError),

    #[error("Invalid sampling weights: {0}")]
    Weights(String),
}

/// Query generator settings
#[derive(Debug, Clone)]
pub struct QueryGenConfig {
    /// Inclusive lower bound on filters per point query
    pub min_filters: usize,
    /// Exclusive upper bound on filters per point query
    pub max_filters: usize,
    /// Trailing columns never filtered in point queries
    pub reserved_suffix: usize,
    /// Columns with fewer distinct values than this only get `=`
    pub range_threshold: usize,
}

impl Default for QueryGenConfig {
    fn default() -> Self {
        Self {
            min_filters: 5,
            max_filters: 10,
            reserved_suffix: 2,
            range_threshold: 10,
        }
    }
}

/// Operator groups for aggregate queries, with their weights
const OPERATOR_GROUPS: [(OperatorGroup, f64); 4] = [
    (OperatorGroup::Le, 0.3),
    (OperatorGroup::Ge, 0.3),
    (OperatorGroup::Range, 0.3),
    (OperatorGroup::Eq, 0.1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperatorGroup {
    Le,
    Ge,
    Range,
    Eq,
}

/// Random query generator
#[derive(Debug, Clone, Default)]
pub struct QueryGenerator {
    config: QueryGenConfig,
}

impl QueryGenerator {
    /// Create a generator
    pub fn new(config: QueryGenConfig) -> Self {
        Self { config }
    }

    /// Settings in use
    pub fn config(&self) -> &QueryGenConfig {
        &self.config
    }

    fn selectable(&self, table: &Table) -> usize {
        table
            .columns()
            .len()
            .saturating_sub(self.config.reserved_suffix)
    }

    /// A point query with a random number of filters in `[min_filters, max_filters)`.
    ///
    /// The range is clamped to the number of selectable columns.
    pub fn generate_query<R: Rng + ?Sized>(
        &self,
        table: &Table,
        rng: &mut R,
    ) -> Result<Query, QueryGenError> {
        let selectable = self.selectable(table);
        let hi = self.config.max_filters.min(selectable + 1);
        let lo = self.config.min_filters.min(hi.saturating_sub(1));
        let num_filters = if lo < hi { rng.gen_range(lo..hi) } else { lo };
        self.sample_tuple_then_random(table, num_filters, rng)
    }

    /// Anchor a row and filter `num_filters` distinct columns on its values.
    ///
    /// The anchor row always satisfies the result.
    pub fn sample_tuple_then_random<R: Rng + ?Sized>(
        &self,
        table: &Table,
        num_filters: usize,
        rng: &mut R,
    ) -> Result<Query, QueryGenError> {
        if table.cardinality() == 0 {
            return Err(QueryGenError::EmptyTable);
        }
        let selectable = self.selectable(table);
        if num_filters > selectable {
            return Err(QueryGenError::NotEnoughColumns {
                requested: num_filters,
                available: selectable,
            });
        }

        let anchor = rng.gen_range(0..table.cardinality());
        let columns = index::sample(rng, selectable, num_filters).into_vec();
        let ops = [Operator::Le, Operator::Ge, Operator::Eq];

        let filters = columns
            .into_iter()
            .map(|c| {
                let column = table.column(c);
                let drawn = ops[rng.gen_range(0..ops.len())];
                let op = if column.distribution_size() < self.config.range_threshold {
                    Operator::Eq
                } else {
                    drawn
                };
                Filter::new(c, Predicate::from_operator(op, column.value_at(anchor).clone()))
            })
            .collect();
        Ok(Query::new(filters))
    }

    /// A random aggregate query.
    ///
    /// The aggregate column is drawn from every column not named in
    /// `key_columns`; filters are drawn from every column but the aggregate.
    pub fn generate_aggregate_query<R: Rng + ?Sized>(
        &self,
        table: &Table,
        key_columns: &[String],
        rng: &mut R,
    ) -> Result<AggregateQuery, QueryGenError> {
        if table.cardinality() == 0 {
            return Err(QueryGenError::EmptyTable);
        }
        let keys = key_columns
            .iter()
            .map(|k| table.column_index(k))
            .collect::<Result<Vec<_>, _>>()
            .map_err(QueryGenError::UnknownKeyColumn)?;

        let candidates: Vec<usize> = (0..table.columns().len())
            .filter(|c| !keys.contains(c))
            .collect();
        let agg_column = *candidates
            .choose(rng)
            .ok_or(QueryGenError::NoAggregateCandidate)?;

        let others: Vec<usize> = (0..table.columns().len())
            .filter(|&c| c != agg_column)
            .collect();
        if others.is_empty() {
            return Ok(AggregateQuery {
                agg_column,
                filters: Vec::new(),
                group_by: None,
            });
        }

        let count_dist = WeightedIndex::new(filter_count_weights(others.len()))
            .map_err(|e| QueryGenError::Weights(e.to_string()))?;
        let num_filters = count_dist.sample(rng) + 1;

        let mut chosen: Vec<usize> = index::sample(rng, others.len(), num_filters)
            .into_iter()
            .map(|i| others[i])
            .collect();
        chosen.sort_unstable();

        let group_dist = WeightedIndex::new(OPERATOR_GROUPS.iter().map(|(_, w)| *w))
            .map_err(|e| QueryGenError::Weights(e.to_string()))?;

        let mut filters = Vec::with_capacity(chosen.len());
        for c in chosen {
            let column = table.column(c);
            let drawn = OPERATOR_GROUPS[group_dist.sample(rng)].0;
            let group = if column.distribution_size() < self.config.range_threshold {
                OperatorGroup::Eq
            } else {
                drawn
            };
            let domain = column.all_distinct_values();
            let predicate = match group {
                OperatorGroup::Range => {
                    let mut pair = [pick(domain, rng), pick(domain, rng)];
                    pair.sort();
                    let [low, high] = pair;
                    Predicate::Range { low, high }
                }
                OperatorGroup::Le => Predicate::Le(pick(domain, rng)),
                OperatorGroup::Ge => Predicate::Ge(pick(domain, rng)),
                OperatorGroup::Eq => Predicate::Eq(pick(domain, rng)),
            };
            filters.push(Filter::new(c, predicate));
        }

        Ok(AggregateQuery {
            agg_column,
            filters,
            group_by: None,
        })
    }
}

/// Probability of using `1..=n` filter columns
fn filter_count_weights(n: usize) -> Vec<f64> {
    match n {
        0 | 1 => vec![1.0],
        2 => vec![0.6, 0.4],
        _ => {
            let rest = 0.2 / (n - 2) as f64;
            let mut p = vec![0.5, 0.3];
            p.extend(std::iter::repeat(rest).take(n - 2));
            p
        }
    }
}

fn pick<R: Rng + ?Sized>(domain: &[Value], rng: &mut R) -> Value {
    domain[rng.gen_range(0..domain.len())].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::Oracle;
    use crate::table::Column;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn low_and_high_cardinality() -> Table {
        let a = Column::new("A", vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let b = Column::with_domain(
            "B",
            (0..50).map(Value::Int).collect(),
            vec![Value::Int(7), Value::Int(21), Value::Int(40)],
        )
        .unwrap();
        Table::new("ab", vec![a, b]).unwrap()
    }

    fn wide_table(rows: usize, cols: usize, seed: u64) -> Table {
        let mut rng = StdRng::seed_from_u64(seed);
        let columns = (0..cols)
            .map(|c| {
                let domain = if c % 3 == 0 { 4 } else { 40 };
                let values = (0..rows).map(|_| Value::Int(rng.gen_range(0..domain))).collect();
                Column::new(format!("c{}", c), values)
            })
            .collect();
        Table::new("wide", columns).unwrap()
    }

    #[test]
    fn test_low_cardinality_column_is_always_equality() {
        let table = low_and_high_cardinality();
        assert_eq!(table.column(1).distribution_size(), 50);
        let generator = QueryGenerator::new(QueryGenConfig {
            reserved_suffix: 0,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(1234);
        let mut b_ops = std::collections::HashSet::new();

        for _ in 0..1000 {
            let q = generator.sample_tuple_then_random(&table, 2, &mut rng).unwrap();
            assert_eq!(q.filters.len(), 2);
            for f in &q.filters {
                let ops = f.predicate.operators();
                assert_eq!(ops.len(), 1);
                if f.column == 0 {
                    assert_eq!(ops, vec![Operator::Eq]);
                } else {
                    b_ops.insert(ops[0]);
                }
            }
        }
        assert_eq!(b_ops.len(), 3, "B draws from all three operators");
    }

    #[test]
    fn test_anchor_row_satisfies_query() {
        let table = Arc::new(wide_table(200, 12, 5));
        let generator = QueryGenerator::default();
        let mut oracle = Oracle::new(table.clone());
        let mut rng = StdRng::seed_from_u64(99);

        for _ in 0..300 {
            let mut replay = rng.clone();
            let _num_filters = replay.gen_range(5..10usize);
            let anchor = replay.gen_range(0..table.cardinality());
            let q = generator.generate_query(&table, &mut rng).unwrap();
            assert!(q.matches_row(&table, anchor));
            assert!(oracle.cardinality(&q) >= 1);
            assert!((5..10).contains(&q.filters.len()));
            assert!(q.columns().iter().all(|&c| c < 10), "reserved suffix untouched");
        }
    }

    #[test]
    fn test_too_many_filters_rejected() {
        let table = wide_table(10, 4, 1);
        let generator = QueryGenerator::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            generator.sample_tuple_then_random(&table, 3, &mut rng),
            Err(QueryGenError::NotEnoughColumns { requested: 3, available: 2 })
        ));
    }

    #[test]
    fn test_generate_query_clamps_to_narrow_table() {
        let table = wide_table(20, 7, 2);
        let generator = QueryGenerator::default();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let q = generator.generate_query(&table, &mut rng).unwrap();
            assert_eq!(q.filters.len(), 5);
        }
    }

    #[test]
    fn test_aggregate_query_shape() {
        let mut columns: Vec<Column> = (0..6)
            .map(|c| {
                let values = (0..30).map(|i| Value::Int((i * (c + 1)) % 25)).collect();
                Column::new(format!("c{}", c), values)
            })
            .collect();
        columns.push(Column::new(
            "ss_store_sk",
            (0..30).map(|i| Value::Int(i % 3)).collect(),
        ));
        let table = Table::new("t", columns).unwrap();
        let keys = vec!["ss_store_sk".to_string()];
        let generator = QueryGenerator::default();
        let mut rng = StdRng::seed_from_u64(17);

        for _ in 0..500 {
            let q = generator.generate_aggregate_query(&table, &keys, &mut rng).unwrap();
            assert_ne!(q.agg_column, 6);
            assert!(!q.filters.is_empty());
            let cols: Vec<usize> = q.filters.iter().map(|f| f.column).collect();
            let mut sorted = cols.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(cols, sorted, "filter columns distinct and sorted");
            assert!(!cols.contains(&q.agg_column));
            for f in &q.filters {
                if table.column(f.column).distribution_size() < 10 {
                    assert!(matches!(f.predicate, Predicate::Eq(_)));
                }
                if let Predicate::Range { low, high } = &f.predicate {
                    assert!(low <= high);
                }
            }
        }
    }

    #[test]
    fn test_aggregate_query_unknown_key_column() {
        let table = wide_table(5, 3, 0);
        let generator = QueryGenerator::default();
        let mut rng = StdRng::seed_from_u64(0);
        let keys = vec!["nope".to_string()];
        assert!(matches!(
            generator.generate_aggregate_query(&table, &keys, &mut rng),
            Err(QueryGenError::UnknownKeyColumn(_))
        ));
    }

    #[test]
    fn test_aggregate_query_on_empty_table() {
        let table = Table::new(
            "e",
            vec![Column::new("a", vec![]), Column::new("b", vec![])],
        )
        .unwrap();
        let generator = QueryGenerator::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            generator.generate_aggregate_query(&table, &[], &mut rng),
            Err(QueryGenError::EmptyTable)
        ));
    }

    #[test]
    fn test_filter_count_weights_sum_to_one() {
        for n in 1..12 {
            let total: f64 = filter_count_weights(n).iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
            assert_eq!(filter_count_weights(n).len(), n);
        }
    }
}
