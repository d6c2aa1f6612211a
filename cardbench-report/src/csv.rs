//! CSV Output
//!
//! One row per recorded query per estimator, in recording order.

use crate::record::ReportError;
use cardbench_core::EstimatorStats;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ErrorRow<'a> {
    est: &'a str,
    err: f64,
    est_card: f64,
    true_card: f64,
    query_dur_ms: f64,
}

/// Write `est,err,est_card,true_card,query_dur_ms` rows for every estimator.
pub fn write_error_csv<'a>(
    path: &Path,
    estimators: impl IntoIterator<Item = (&'a str, &'a EstimatorStats)>,
) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    for (name, stats) in estimators {
        for i in 0..stats.len() {
            writer.serialize(ErrorRow {
                est: name,
                err: stats.errors[i],
                est_card: stats.est_cards[i],
                true_card: stats.true_cards[i],
                query_dur_ms: stats.query_dur_ms[i],
            })?;
        }
    }
    writer.flush().map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.csv");
        let mut a = EstimatorStats::default();
        a.add_error(2.0, 20.0, 10.0, 1.5);
        let mut b = EstimatorStats::default();
        b.add_error(1.0, 10.0, 10.0, 0.5);
        b.add_error(4.0, 1.0, 4.0, 0.25);

        write_error_csv(&path, [("psample_2000", &a), ("sample_0.01", &b)]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "est,err,est_card,true_card,query_dur_ms");
        assert_eq!(lines[1], "psample_2000,2.0,20.0,10.0,1.5");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with("sample_0.01,4.0,"));
    }
}
