//! Aggregate Query Execution
//!
//! Count and average come from two independently built estimators; the sum
//! is always their product, never estimated on its own.

use cardbench_core::{AggregateAnswer, AggregateKind, AggregateQuery, Estimator, EstimatorError, Oracle};
use cardbench_report::AggregateRun;
use std::time::Instant;
use tracing::debug;

/// Estimated and exact answers to one aggregate query
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    /// `(avg, count, avg * count)` from the estimators
    pub estimated: AggregateAnswer,
    /// Exact `(avg, count, sum)` from the oracle
    pub real: AggregateAnswer,
    /// Timings and the order the average estimator used
    pub run: AggregateRun,
}

/// Answer `query` with `count_estimator` and `avg_estimator`, and with the oracle.
///
/// Unlike point queries, an empty selection is still evaluated: undefined
/// values surface as `None` and are handled when the record is built.
pub fn run_single_aggregate_query(
    count_estimator: &mut dyn Estimator,
    avg_estimator: &mut dyn Estimator,
    oracle: &mut Oracle,
    query: &AggregateQuery,
    order: Option<Vec<usize>>,
) -> Result<AggregateOutcome, EstimatorError> {
    let start = Instant::now();
    let avg = avg_estimator.estimate_aggregate(query, AggregateKind::Avg)?;
    let count = count_estimator.estimate_aggregate(query, AggregateKind::Count)?;
    let estimated = AggregateAnswer::combine(avg, count);
    let query_dur_ms_est = start.elapsed().as_secs_f64() * 1000.0;

    let real = oracle.aggregate(query);
    let query_dur_ms_real = oracle.query_dur_ms().last().copied().unwrap_or_default();
    debug!(
        "Aggregate query answered in {:.2}ms (oracle {:.2}ms)",
        query_dur_ms_est, query_dur_ms_real
    );

    Ok(AggregateOutcome {
        estimated,
        real,
        run: AggregateRun {
            query_dur_ms_est,
            query_dur_ms_real,
            order,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardbench_core::{
        AggregateTriple, Column, Filter, Predicate, Table, Value,
    };
    use cardbench_model::SamplingEstimator;
    use std::sync::Arc;

    fn table() -> Arc<Table> {
        Arc::new(
            Table::new(
                "t",
                vec![
                    Column::new("g", (0..8).map(|i| Value::Int(i % 2)).collect()),
                    Column::new("x", (0..8).map(Value::Int).collect()),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_full_sample_matches_oracle() {
        let t = table();
        let mut count = SamplingEstimator::new(t.clone(), 1.0, 1);
        let mut avg = SamplingEstimator::new(t.clone(), 1.0, 2);
        let mut oracle = Oracle::new(t);
        let query = AggregateQuery {
            agg_column: 1,
            filters: vec![Filter::new(1, Predicate::Ge(Value::Int(4)))],
            group_by: None,
        };

        let outcome =
            run_single_aggregate_query(&mut count, &mut avg, &mut oracle, &query, Some(vec![0, 1]))
                .unwrap();
        let expected = AggregateTriple {
            avg: Some(5.5),
            count: Some(4.0),
            sum: Some(22.0),
        };
        assert_eq!(outcome.estimated, AggregateAnswer::Scalar(expected));
        assert_eq!(outcome.real, AggregateAnswer::Scalar(expected));
        assert_eq!(outcome.run.order, Some(vec![0, 1]));
    }

    #[test]
    fn test_grouped_sum_is_product_of_estimates() {
        let t = table();
        let mut count = SamplingEstimator::new(t.clone(), 1.0, 1);
        let mut avg = SamplingEstimator::new(t.clone(), 1.0, 2);
        let mut oracle = Oracle::new(t);
        let query = AggregateQuery {
            agg_column: 1,
            filters: Vec::new(),
            group_by: Some(vec![0]),
        };

        let outcome =
            run_single_aggregate_query(&mut count, &mut avg, &mut oracle, &query, None).unwrap();
        let AggregateAnswer::Grouped(groups) = outcome.estimated else {
            panic!("expected grouped answer");
        };
        assert_eq!(groups.len(), 2);
        for (_, triple) in groups {
            assert_eq!(triple.sum, Some(triple.avg.unwrap() * triple.count.unwrap()));
        }
        assert!(outcome.real.is_grouped());
    }

    #[test]
    fn test_empty_selection_is_evaluated() {
        let t = table();
        let mut count = SamplingEstimator::new(t.clone(), 1.0, 1);
        let mut avg = SamplingEstimator::new(t.clone(), 1.0, 2);
        let mut oracle = Oracle::new(t);
        let query = AggregateQuery {
            agg_column: 1,
            filters: vec![Filter::new(1, Predicate::Eq(Value::Int(99)))],
            group_by: None,
        };
        let outcome =
            run_single_aggregate_query(&mut count, &mut avg, &mut oracle, &query, None).unwrap();
        let AggregateAnswer::Scalar(real) = outcome.real else {
            panic!("expected scalar answer");
        };
        assert_eq!(real.avg, None);
        assert_eq!(real.count, Some(0.0));
    }
}
