//! Aggregate Answers
//!
//! Shapes shared by the oracle and by estimators for `AVG` / `COUNT` / `SUM`
//! queries, with or without a group-by.

use crate::value::Value;

/// Values of the group-by columns, in group-by order
pub type GroupKey = Vec<Value>;

/// Which aggregate an estimator is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    /// Mean of the aggregate column over the selection
    Avg,
    /// Number of selected rows
    Count,
}

/// One estimator answer for a single aggregate kind
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateEstimate {
    /// Query without group-by; `None` when undefined (e.g. average of nothing)
    Scalar(Option<f64>),
    /// One value per group key
    Grouped(Vec<(GroupKey, Option<f64>)>),
}

/// `(avg, count, sum)` for one selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateTriple {
    /// Mean of the aggregate column, undefined on an empty or non-numeric selection
    pub avg: Option<f64>,
    /// Selected rows
    pub count: Option<f64>,
    /// Sum of the aggregate column
    pub sum: Option<f64>,
}

impl AggregateTriple {
    /// Build an estimated triple. The sum is never estimated on its own: it is
    /// always the product of the two estimates.
    pub fn from_estimates(avg: Option<f64>, count: Option<f64>) -> Self {
        let sum = match (avg, count) {
            (Some(a), Some(c)) => Some(a * c),
            _ => None,
        };
        Self { avg, count, sum }
    }

    /// Whether every component is present
    pub fn is_complete(&self) -> bool {
        self.avg.is_some() && self.count.is_some() && self.sum.is_some()
    }
}

/// Full `(avg, count, sum)` answer to an aggregate query
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateAnswer {
    /// Query without group-by
    Scalar(AggregateTriple),
    /// One triple per group key, sorted by key
    Grouped(Vec<(GroupKey, AggregateTriple)>),
}

impl AggregateAnswer {
    /// Combine separately estimated averages and counts.
    ///
    /// Grouped inputs are joined on the group key; a key present on only one
    /// side keeps `None` for the missing component.
    pub fn combine(avg: AggregateEstimate, count: AggregateEstimate) -> Self {
        match (avg, count) {
            (AggregateEstimate::Scalar(a), AggregateEstimate::Scalar(c)) => {
                AggregateAnswer::Scalar(AggregateTriple::from_estimates(a, c))
            }
            (avg, count) => {
                let avg = into_grouped(avg);
                let count = into_grouped(count);
                let mut keys: Vec<GroupKey> = avg.iter().map(|(k, _)| k.clone()).collect();
                for (k, _) in &count {
                    if !keys.contains(k) {
                        keys.push(k.clone());
                    }
                }
                keys.sort();
                let lookup = |side: &[(GroupKey, Option<f64>)], key: &GroupKey| {
                    side.iter().find(|(k, _)| k == key).and_then(|(_, v)| *v)
                };
                let rows = keys
                    .into_iter()
                    .map(|key| {
                        let triple =
                            AggregateTriple::from_estimates(lookup(&avg, &key), lookup(&count, &key));
                        (key, triple)
                    })
                    .collect();
                AggregateAnswer::Grouped(rows)
            }
        }
    }

    /// Whether this answer is grouped
    pub fn is_grouped(&self) -> bool {
        matches!(self, AggregateAnswer::Grouped(_))
    }
}

fn into_grouped(estimate: AggregateEstimate) -> Vec<(GroupKey, Option<f64>)> {
    match estimate {
        AggregateEstimate::Grouped(rows) => rows,
        AggregateEstimate::Scalar(v) => vec![(Vec::new(), v)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_is_product_of_estimates() {
        let answer = AggregateAnswer::combine(
            AggregateEstimate::Scalar(Some(2.5)),
            AggregateEstimate::Scalar(Some(4.0)),
        );
        assert_eq!(
            answer,
            AggregateAnswer::Scalar(AggregateTriple {
                avg: Some(2.5),
                count: Some(4.0),
                sum: Some(10.0),
            })
        );
    }

    #[test]
    fn test_grouped_join_keeps_missing_sides() {
        let avg = AggregateEstimate::Grouped(vec![
            (vec![Value::Int(1)], Some(3.0)),
            (vec![Value::Int(2)], Some(5.0)),
        ]);
        let count = AggregateEstimate::Grouped(vec![(vec![Value::Int(2)], Some(10.0))]);

        let AggregateAnswer::Grouped(rows) = AggregateAnswer::combine(avg, count) else {
            panic!("expected grouped answer");
        };
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].1.is_complete());
        assert_eq!(rows[1].1.sum, Some(50.0));
    }
}
