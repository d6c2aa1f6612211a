//! Exact Oracle
//!
//! Ground truth by full scan. Filters are evaluated on dictionary codes so a
//! scan is a tight loop over `u32`s per filtered column.

use crate::aggregate::{AggregateAnswer, AggregateTriple, GroupKey};
use crate::query::{AggregateQuery, CodeMasks, Query};
use crate::table::{ColumnType, Table};
use fxhash::FxHashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

/// Full-scan answerer for point and aggregate queries
#[derive(Debug, Clone)]
pub struct Oracle {
    table: Arc<Table>,
    query_dur_ms: Vec<f64>,
}

impl Oracle {
    /// Create an oracle over `table`
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            query_dur_ms: Vec::new(),
        }
    }

    /// Table being scanned
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Wall time of every call so far, in milliseconds
    pub fn query_dur_ms(&self) -> &[f64] {
        &self.query_dur_ms
    }

    /// Exact number of rows satisfying `query`
    pub fn cardinality(&mut self, query: &Query) -> u64 {
        let start = Instant::now();
        let masks = query.code_masks(&self.table);
        let count = self.matching_rows(&masks).count() as u64;
        self.query_dur_ms.push(start.elapsed().as_secs_f64() * 1000.0);
        count
    }

    /// Exact `(avg, count, sum)`, per group when the query has a group-by.
    pub fn aggregate(&mut self, query: &AggregateQuery) -> AggregateAnswer {
        let start = Instant::now();
        let masks = query.code_masks(&self.table);
        let agg_column = self.table.column(query.agg_column);
        let numeric = agg_column.column_type() != ColumnType::Text;
        let value_of = |row: usize| agg_column.value_at(row).as_f64().unwrap_or(0.0);

        let answer = match &query.group_by {
            None => {
                let mut count = 0u64;
                let mut sum = 0.0;
                for row in self.matching_rows(&masks) {
                    count += 1;
                    sum += value_of(row);
                }
                AggregateAnswer::Scalar(exact_triple(count, sum, numeric))
            }
            Some(group_by) => {
                let mut groups: FxHashMap<Vec<u32>, (u64, f64)> = FxHashMap::default();
                for row in self.matching_rows(&masks) {
                    let key: Vec<u32> = group_by
                        .iter()
                        .map(|&c| self.table.column(c).codes()[row])
                        .collect();
                    let entry = groups.entry(key).or_insert((0, 0.0));
                    entry.0 += 1;
                    entry.1 += value_of(row);
                }
                let mut rows: Vec<(GroupKey, AggregateTriple)> = groups
                    .into_iter()
                    .map(|(codes, (count, sum))| {
                        let key = codes
                            .iter()
                            .zip(group_by)
                            .map(|(&code, &c)| self.table.column(c).value(code).clone())
                            .collect();
                        (key, exact_triple(count, sum, numeric))
                    })
                    .collect();
                rows.sort_by(|a, b| a.0.cmp(&b.0));
                AggregateAnswer::Grouped(rows)
            }
        };

        self.query_dur_ms.push(start.elapsed().as_secs_f64() * 1000.0);
        answer
    }

    fn matching_rows<'a>(&'a self, masks: &'a CodeMasks) -> impl Iterator<Item = usize> + 'a {
        let active: Vec<(&'a [u32], Range<usize>)> = masks
            .iter()
            .enumerate()
            .filter_map(|(c, m)| m.clone().map(|r| (self.table.column(c).codes(), r)))
            .collect();
        (0..self.table.cardinality()).filter(move |&row| {
            active
                .iter()
                .all(|(codes, range)| range.contains(&(codes[row] as usize)))
        })
    }
}

fn exact_triple(count: u64, sum: f64, numeric: bool) -> AggregateTriple {
    let avg = if count > 0 && numeric {
        Some(sum / count as f64)
    } else {
        None
    };
    AggregateTriple {
        avg,
        count: Some(count as f64),
        sum: if numeric { Some(sum) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, Predicate};
    use crate::table::Column;
    use crate::value::Value;

    fn table() -> Arc<Table> {
        // g: 0 1 0 1 0 1, x: 1..=6
        Arc::new(
            Table::new(
                "t",
                vec![
                    Column::new("g", (0..6).map(|i| Value::Int(i % 2)).collect()),
                    Column::new("x", (1..=6).map(Value::Int).collect()),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_cardinality() {
        let mut oracle = Oracle::new(table());
        let q = Query::new(vec![
            Filter::new(0, Predicate::Eq(Value::Int(1))),
            Filter::new(1, Predicate::Ge(Value::Int(3))),
        ]);
        assert_eq!(oracle.cardinality(&q), 2);
        assert_eq!(oracle.cardinality(&Query::default()), 6);
        assert_eq!(oracle.query_dur_ms().len(), 2);
    }

    #[test]
    fn test_aggregate_scalar() {
        let mut oracle = Oracle::new(table());
        let q = AggregateQuery {
            agg_column: 1,
            filters: vec![Filter::new(1, Predicate::Le(Value::Int(4)))],
            group_by: None,
        };
        let AggregateAnswer::Scalar(t) = oracle.aggregate(&q) else {
            panic!("expected scalar");
        };
        assert_eq!(t.count, Some(4.0));
        assert_eq!(t.sum, Some(10.0));
        assert_eq!(t.avg, Some(2.5));
    }

    #[test]
    fn test_aggregate_empty_selection_has_no_average() {
        let mut oracle = Oracle::new(table());
        let q = AggregateQuery {
            agg_column: 1,
            filters: vec![Filter::new(1, Predicate::Ge(Value::Int(100)))],
            group_by: None,
        };
        let AggregateAnswer::Scalar(t) = oracle.aggregate(&q) else {
            panic!("expected scalar");
        };
        assert_eq!(t.count, Some(0.0));
        assert_eq!(t.avg, None);
    }

    #[test]
    fn test_aggregate_grouped_sorted_by_key() {
        let mut oracle = Oracle::new(table());
        let q = AggregateQuery {
            agg_column: 1,
            filters: vec![],
            group_by: Some(vec![0]),
        };
        let AggregateAnswer::Grouped(rows) = oracle.aggregate(&q) else {
            panic!("expected grouped");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, vec![Value::Int(0)]);
        assert_eq!(rows[0].1.sum, Some(9.0));
        assert_eq!(rows[1].1.sum, Some(12.0));
        assert_eq!(rows[1].1.avg, Some(4.0));
    }
}
