//! Filter Queries
//!
//! A point query is a conjunction of per-column [`Filter`]s. An aggregate
//! query adds an aggregate column and an optional group-by list.
//!
//! Predicates are answered on dictionary codes: because column domains are
//! sorted, every predicate selects a contiguous code range.

use crate::table::{Column, Table};
use crate::value::Value;
use fxhash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;

/// Comparison operator of a single filter bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "=",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Operator::Eq),
            "<=" => Ok(Operator::Le),
            ">=" => Ok(Operator::Ge),
            other => Err(format!("Unknown operator: {}", other)),
        }
    }
}

/// Operator group applied to one column.
///
/// A two-sided range always carries exactly two values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// `col = v`
    Eq(Value),
    /// `col <= v`
    Le(Value),
    /// `col >= v`
    Ge(Value),
    /// `col >= low AND col <= high`
    Range { low: Value, high: Value },
}

impl Predicate {
    /// Single-bound predicate from an operator
    pub fn from_operator(op: Operator, value: Value) -> Self {
        match op {
            Operator::Eq => Predicate::Eq(value),
            Operator::Le => Predicate::Le(value),
            Operator::Ge => Predicate::Ge(value),
        }
    }

    /// Operators in rendering order
    pub fn operators(&self) -> Vec<Operator> {
        match self {
            Predicate::Eq(_) => vec![Operator::Eq],
            Predicate::Le(_) => vec![Operator::Le],
            Predicate::Ge(_) => vec![Operator::Ge],
            Predicate::Range { .. } => vec![Operator::Ge, Operator::Le],
        }
    }

    /// Values, parallel to [`Predicate::operators`]
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Predicate::Eq(v) | Predicate::Le(v) | Predicate::Ge(v) => vec![v],
            Predicate::Range { low, high } => vec![low, high],
        }
    }

    /// Whether this is anything other than equality
    pub fn is_range(&self) -> bool {
        !matches!(self, Predicate::Eq(_))
    }

    /// Whether `value` satisfies the predicate
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Predicate::Eq(v) => value == v,
            Predicate::Le(v) => value <= v,
            Predicate::Ge(v) => value >= v,
            Predicate::Range { low, high } => value >= low && value <= high,
        }
    }

    /// Half-open range of dictionary codes of `column` that satisfy the predicate
    pub fn code_range(&self, column: &Column) -> Range<usize> {
        let n = column.distribution_size();
        let range = match self {
            Predicate::Eq(v) => column.lower_bound(v)..column.upper_bound(v),
            Predicate::Le(v) => 0..column.upper_bound(v),
            Predicate::Ge(v) => column.lower_bound(v)..n,
            Predicate::Range { low, high } => column.lower_bound(low)..column.upper_bound(high),
        };
        if range.start > range.end {
            range.start..range.start
        } else {
            range
        }
    }
}

/// One predicate bound to a column index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    /// Column index in table order
    pub column: usize,
    /// Predicate on that column
    pub predicate: Predicate,
}

impl Filter {
    /// Create a filter
    pub fn new(column: usize, predicate: Predicate) -> Self {
        Self { column, predicate }
    }

    fn render(&self, table: &Table, out: &mut Vec<String>) {
        let name = table.column(self.column).name();
        for (op, value) in self.predicate.operators().iter().zip(self.predicate.values()) {
            out.push(format!("{} {} {}", name, op, value));
        }
    }
}

/// Per-column code ranges of a conjunction; `None` means the column is unfiltered.
pub type CodeMasks = Vec<Option<Range<usize>>>;

fn code_masks(filters: &[Filter], table: &Table) -> CodeMasks {
    let mut masks: CodeMasks = vec![None; table.columns().len()];
    for filter in filters {
        let range = filter.predicate.code_range(table.column(filter.column));
        let slot = &mut masks[filter.column];
        *slot = Some(match slot.take() {
            Some(prev) => {
                let start = prev.start.max(range.start);
                let end = prev.end.min(range.end).max(start);
                start..end
            }
            None => range,
        });
    }
    masks
}

/// A conjunction of filters (point-cardinality query)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Query {
    /// Filters, in generation order
    pub filters: Vec<Filter>,
}

impl Query {
    /// Create a query from filters
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    /// Column indices touched by the query
    pub fn columns(&self) -> Vec<usize> {
        self.filters.iter().map(|f| f.column).collect()
    }

    /// Stable fingerprint of the query content
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Satisfying code range per column
    pub fn code_masks(&self, table: &Table) -> CodeMasks {
        code_masks(&self.filters, table)
    }

    /// Whether row `row` of `table` satisfies every filter
    pub fn matches_row(&self, table: &Table, row: usize) -> bool {
        self.filters
            .iter()
            .all(|f| f.predicate.matches(table.column(f.column).value_at(row)))
    }

    /// Console rendering, e.g. `Q(a = 1, b <= 7)`
    pub fn describe(&self, table: &Table) -> String {
        let mut parts = Vec::new();
        for filter in &self.filters {
            filter.render(table, &mut parts);
        }
        format!("Q({})", parts.join(", "))
    }
}

/// An aggregate query: `SELECT agg(col) ... WHERE ... [GROUP BY ...]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateQuery {
    /// Column being aggregated
    pub agg_column: usize,
    /// Filter conjunction
    pub filters: Vec<Filter>,
    /// Group-by columns, if any
    pub group_by: Option<Vec<usize>>,
}

impl AggregateQuery {
    /// The filter part as a point query
    pub fn where_query(&self) -> Query {
        Query::new(self.filters.clone())
    }

    /// Satisfying code range per column
    pub fn code_masks(&self, table: &Table) -> CodeMasks {
        code_masks(&self.filters, table)
    }

    /// Stable fingerprint of the query content
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// SQL-like rendering used in result records
    pub fn to_sql(&self, table: &Table, dataset: &str) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            table.column(self.agg_column).name(),
            dataset
        );
        if !self.filters.is_empty() {
            let mut parts = Vec::new();
            for filter in &self.filters {
                let name = table.column(filter.column).name();
                for (op, value) in filter
                    .predicate
                    .operators()
                    .iter()
                    .zip(filter.predicate.values())
                {
                    parts.push(format!("{}{}{}", name, op, value));
                }
            }
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }
        if let Some(group_by) = &self.group_by {
            let names: Vec<&str> = group_by.iter().map(|&c| table.column(c).name()).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&names.join(", "));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(
            "t",
            vec![
                Column::new("a", (0..10).map(Value::Int).collect()),
                Column::new("b", (0..10).map(|i| Value::Int(i % 3)).collect()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_code_ranges() {
        let t = table();
        let a = t.column(0);
        assert_eq!(Predicate::Eq(Value::Int(4)).code_range(a), 4..5);
        assert_eq!(Predicate::Le(Value::Int(4)).code_range(a), 0..5);
        assert_eq!(Predicate::Ge(Value::Int(4)).code_range(a), 4..10);
        assert_eq!(Predicate::Eq(Value::Int(42)).code_range(a), 10..10);
        let range = Predicate::Range {
            low: Value::Int(7),
            high: Value::Int(2),
        };
        assert!(range.code_range(a).is_empty());
    }

    #[test]
    fn test_masks_intersect_on_same_column() {
        let t = table();
        let q = Query::new(vec![
            Filter::new(0, Predicate::Ge(Value::Int(3))),
            Filter::new(0, Predicate::Le(Value::Int(6))),
        ]);
        let masks = q.code_masks(&t);
        assert_eq!(masks[0], Some(3..7));
        assert_eq!(masks[1], None);
    }

    #[test]
    fn test_range_carries_two_values() {
        let p = Predicate::Range {
            low: Value::Int(1),
            high: Value::Int(5),
        };
        assert_eq!(p.operators(), vec![Operator::Ge, Operator::Le]);
        assert_eq!(p.values().len(), 2);
    }

    #[test]
    fn test_to_sql() {
        let t = table();
        let q = AggregateQuery {
            agg_column: 0,
            filters: vec![Filter::new(
                1,
                Predicate::Range {
                    low: Value::Int(0),
                    high: Value::Int(1),
                },
            )],
            group_by: Some(vec![1]),
        };
        assert_eq!(
            q.to_sql(&t, "ds"),
            "SELECT a FROM ds WHERE b>=0 AND b<=1 GROUP BY b"
        );
    }

    #[test]
    fn test_fingerprint_is_content_based() {
        let q1 = Query::new(vec![Filter::new(0, Predicate::Eq(Value::Int(1)))]);
        let q2 = q1.clone();
        let q3 = Query::new(vec![Filter::new(0, Predicate::Eq(Value::Int(2)))]);
        assert_eq!(q1.fingerprint(), q2.fingerprint());
        assert_ne!(q1.fingerprint(), q3.fingerprint());
    }

    #[test]
    fn test_describe() {
        let t = table();
        let q = Query::new(vec![Filter::new(1, Predicate::Le(Value::Int(1)))]);
        assert_eq!(q.describe(&t), "Q(b <= 1)");
    }
}
