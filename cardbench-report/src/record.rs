//! Result Record Data Structures

use cardbench_core::{
    AggregateAnswer, AggregateTriple, GroupKey, RelativeError, relative_error,
};
use cardbench_stats::mean_of_present;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while building or writing records
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Estimated answer is {estimated} but the real answer is {real}")]
    ShapeMismatch {
        estimated: &'static str,
        real: &'static str,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Fields shared by every record
#[derive(Debug, Clone, Serialize)]
pub struct RecordMeta {
    /// When the query completed
    pub timestamp: DateTime<Utc>,
    /// Dataset identifier
    pub dataset: String,
    /// Model identifier (checkpoint glob or estimator name)
    pub model: String,
}

impl RecordMeta {
    /// Stamp a record with the current time
    pub fn now(dataset: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            dataset: dataset.into(),
            model: model.into(),
        }
    }
}

/// One estimator's answer to a point query
#[derive(Debug, Clone, Serialize)]
pub struct PointEstimate {
    /// Estimator name
    pub estimator: String,
    /// Estimated cardinality
    pub est_card: f64,
    /// Symmetric ratio error
    pub err: f64,
    /// Estimator wall time
    pub query_dur_ms: f64,
}

/// A point-cardinality query and every estimator's answer
#[derive(Debug, Clone, Serialize)]
pub struct PointRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub query: String,
    pub true_card: f64,
    pub estimates: Vec<PointEstimate>,
    pub query_dur_ms_real: f64,
    pub order: Option<Vec<usize>>,
    pub groupby: bool,
}

/// An aggregate query without group-by
#[derive(Debug, Clone, Serialize)]
pub struct AggregateRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub query: String,
    pub avg_est: Option<f64>,
    pub avg_real: Option<f64>,
    pub avg_err: RelativeError,
    pub count_est: Option<f64>,
    pub count_real: Option<f64>,
    pub count_err: RelativeError,
    pub sum_est: Option<f64>,
    pub sum_real: Option<f64>,
    pub sum_err: RelativeError,
    pub query_dur_ms_est: f64,
    pub query_dur_ms_real: f64,
    pub query_dur_ms_err: RelativeError,
    pub order: Option<Vec<usize>>,
    pub groupby: bool,
}

/// One group key with estimated and real triples side by side
#[derive(Debug, Clone, Serialize)]
pub struct GroupRow {
    pub key: GroupKey,
    pub avg_est: Option<f64>,
    pub count_est: Option<f64>,
    pub sum_est: Option<f64>,
    pub avg_real: Option<f64>,
    pub count_real: Option<f64>,
    pub sum_real: Option<f64>,
}

impl GroupRow {
    fn is_complete(&self) -> bool {
        [
            self.avg_est,
            self.count_est,
            self.sum_est,
            self.avg_real,
            self.count_real,
            self.sum_real,
        ]
        .iter()
        .all(Option::is_some)
    }
}

/// An aggregate query with group-by.
///
/// The errors are unweighted means over the groups that are complete on both
/// sides; groups missing any value on either side are left out.
#[derive(Debug, Clone, Serialize)]
pub struct GroupByRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub query: String,
    pub groups: Vec<GroupRow>,
    pub avg_err: Option<f64>,
    pub count_err: Option<f64>,
    pub sum_err: Option<f64>,
    pub query_dur_ms_est: f64,
    pub query_dur_ms_real: f64,
    pub query_dur_ms_err: RelativeError,
    pub order: Option<Vec<usize>>,
    pub groupby: bool,
}

/// Any record written by the recorder
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResultRecord {
    /// Point-cardinality query
    Point(PointRecord),
    /// Aggregate query
    Aggregate(AggregateRecord),
    /// Group-by aggregate query
    GroupBy(GroupByRecord),
}

/// Timing and ordering of one aggregate run
#[derive(Debug, Clone)]
pub struct AggregateRun {
    /// Estimator wall time (average and count estimates together)
    pub query_dur_ms_est: f64,
    /// Oracle wall time
    pub query_dur_ms_real: f64,
    /// Variable order the average estimator used
    pub order: Option<Vec<usize>>,
}

fn shape(answer: &AggregateAnswer) -> &'static str {
    if answer.is_grouped() { "grouped" } else { "scalar" }
}

impl ResultRecord {
    /// Build the record comparing an estimated and a real aggregate answer.
    pub fn from_aggregate(
        meta: RecordMeta,
        query: String,
        estimated: &AggregateAnswer,
        real: &AggregateAnswer,
        run: AggregateRun,
    ) -> Result<Self, ReportError> {
        let dur_err = relative_error(Some(run.query_dur_ms_est), Some(run.query_dur_ms_real));
        match (estimated, real) {
            (AggregateAnswer::Scalar(est), AggregateAnswer::Scalar(real)) => {
                Ok(ResultRecord::Aggregate(AggregateRecord {
                    meta,
                    query,
                    avg_est: est.avg,
                    avg_real: real.avg,
                    avg_err: relative_error(est.avg, real.avg),
                    count_est: est.count,
                    count_real: real.count,
                    count_err: relative_error(est.count, real.count),
                    sum_est: est.sum,
                    sum_real: real.sum,
                    sum_err: relative_error(est.sum, real.sum),
                    query_dur_ms_est: run.query_dur_ms_est,
                    query_dur_ms_real: run.query_dur_ms_real,
                    query_dur_ms_err: dur_err,
                    order: run.order,
                    groupby: false,
                }))
            }
            (AggregateAnswer::Grouped(est), AggregateAnswer::Grouped(real)) => {
                let groups = join_groups(est, real);
                let complete: Vec<&GroupRow> = groups.iter().filter(|g| g.is_complete()).collect();
                let mean_err = |pick: fn(&GroupRow) -> (Option<f64>, Option<f64>)| {
                    mean_of_present(complete.iter().map(|g| {
                        let (e, r) = pick(g);
                        relative_error(e, r).value()
                    }))
                };
                let avg_err = mean_err(|g| (g.avg_est, g.avg_real));
                let count_err = mean_err(|g| (g.count_est, g.count_real));
                let sum_err = mean_err(|g| (g.sum_est, g.sum_real));

                Ok(ResultRecord::GroupBy(GroupByRecord {
                    meta,
                    query,
                    groups,
                    avg_err,
                    count_err,
                    sum_err,
                    query_dur_ms_est: run.query_dur_ms_est,
                    query_dur_ms_real: run.query_dur_ms_real,
                    query_dur_ms_err: dur_err,
                    order: run.order,
                    groupby: true,
                }))
            }
            (estimated, real) => Err(ReportError::ShapeMismatch {
                estimated: shape(estimated),
                real: shape(real),
            }),
        }
    }
}

/// Full outer join on group key, sorted by key
fn join_groups(
    est: &[(GroupKey, AggregateTriple)],
    real: &[(GroupKey, AggregateTriple)],
) -> Vec<GroupRow> {
    let mut keys: Vec<&GroupKey> = est.iter().chain(real).map(|(k, _)| k).collect();
    keys.sort();
    keys.dedup();

    let find = |side: &[(GroupKey, AggregateTriple)], key: &GroupKey| {
        side.iter().find(|(k, _)| k == key).map(|(_, t)| *t)
    };
    keys.into_iter()
        .map(|key| {
            let e = find(est, key);
            let r = find(real, key);
            GroupRow {
                key: key.clone(),
                avg_est: e.and_then(|t| t.avg),
                count_est: e.and_then(|t| t.count),
                sum_est: e.and_then(|t| t.sum),
                avg_real: r.and_then(|t| t.avg),
                count_real: r.and_then(|t| t.count),
                sum_real: r.and_then(|t| t.sum),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardbench_core::Value;

    fn meta() -> RecordMeta {
        RecordMeta::now("tpcds", "model-*.pt")
    }

    fn run() -> AggregateRun {
        AggregateRun {
            query_dur_ms_est: 4.0,
            query_dur_ms_real: 2.0,
            order: Some(vec![0, 2, 1]),
        }
    }

    fn triple(avg: f64, count: f64) -> AggregateTriple {
        AggregateTriple::from_estimates(Some(avg), Some(count))
    }

    #[test]
    fn test_scalar_record_with_zero_denominator() {
        let est = AggregateAnswer::Scalar(triple(2.0, 3.0));
        let real = AggregateAnswer::Scalar(AggregateTriple {
            avg: None,
            count: Some(0.0),
            sum: Some(0.0),
        });
        let record =
            ResultRecord::from_aggregate(meta(), "SELECT x FROM t".into(), &est, &real, run())
                .unwrap();
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();

        assert_eq!(json["count_err"], "result=0!");
        assert_eq!(json["sum_err"], "result=0!");
        assert_eq!(json["avg_err"], "result=0!");
        assert_eq!(json["avg_real"], serde_json::Value::Null);
        assert_eq!(json["query_dur_ms_err"], 1.0);
        assert_eq!(json["groupby"], false);
        assert_eq!(json["dataset"], "tpcds");
        assert_eq!(json["order"], serde_json::json!([0, 2, 1]));
    }

    #[test]
    fn test_group_by_mean_excludes_incomplete_rows() {
        let k = |v: i64| vec![Value::Int(v)];
        let est = AggregateAnswer::Grouped(vec![
            (k(1), triple(11.0, 10.0)),
            (k(2), triple(5.0, 30.0)),
            (k(3), triple(1.0, 1.0)),
        ]);
        let real = AggregateAnswer::Grouped(vec![
            (k(1), triple(10.0, 10.0)),
            (k(2), triple(5.0, 20.0)),
            (k(4), triple(7.0, 7.0)),
        ]);
        let record = ResultRecord::from_aggregate(meta(), "q".into(), &est, &real, run()).unwrap();
        let ResultRecord::GroupBy(record) = record else {
            panic!("expected group-by record");
        };

        assert_eq!(record.groups.len(), 4);
        assert!(record.groupby);
        // avg: (0.1 + 0) / 2, count: (0 + 0.5) / 2
        assert!((record.avg_err.unwrap() - 0.05).abs() < 1e-12);
        assert!((record.count_err.unwrap() - 0.25).abs() < 1e-12);
        // sum: 110 vs 100, 150 vs 100
        assert!((record.sum_err.unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let est = AggregateAnswer::Scalar(triple(1.0, 1.0));
        let real = AggregateAnswer::Grouped(vec![]);
        assert!(matches!(
            ResultRecord::from_aggregate(meta(), "q".into(), &est, &real, run()),
            Err(ReportError::ShapeMismatch { estimated: "scalar", real: "grouped" })
        ));
    }
}
