//! Result Recorder
//!
//! Writes one pretty-printed JSON file per record, numbered in the order
//! records arrive: `<dir>/query0.json`, `<dir>/query1.json`, ...

use crate::json::generate_json_record;
use crate::record::{ReportError, ResultRecord};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Numbered JSON record writer
#[derive(Debug)]
pub struct ResultRecorder {
    dir: PathBuf,
    next: usize,
}

impl ResultRecorder {
    /// Create the output directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| ReportError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir, next: 0 })
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of records written so far
    pub fn written(&self) -> usize {
        self.next
    }

    /// Write `record` to the next numbered file and return its path
    pub fn record(&mut self, record: &ResultRecord) -> Result<PathBuf, ReportError> {
        let path = self.dir.join(format!("query{}.json", self.next));
        let json = generate_json_record(record)?;
        fs::write(&path, json).map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        self.next += 1;
        info!("...Done, result: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PointEstimate, PointRecord, RecordMeta};

    fn point() -> ResultRecord {
        ResultRecord::Point(PointRecord {
            meta: RecordMeta::now("dmv-tiny", "psample_100"),
            query: "Q(a = 1)".to_string(),
            true_card: 4.0,
            estimates: vec![PointEstimate {
                estimator: "psample_100".to_string(),
                est_card: 8.0,
                err: 2.0,
                query_dur_ms: 0.3,
            }],
            query_dur_ms_real: 0.1,
            order: None,
            groupby: false,
        })
    }

    #[test]
    fn test_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = ResultRecorder::new(dir.path().join("results")).unwrap();
        let first = recorder.record(&point()).unwrap();
        let second = recorder.record(&point()).unwrap();

        assert!(first.ends_with("query0.json"));
        assert!(second.ends_with("query1.json"));
        assert_eq!(recorder.written(), 2);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&second).unwrap()).unwrap();
        assert_eq!(json["estimates"][0]["err"], 2.0);
        assert_eq!(json["groupby"], false);
        assert!(json["timestamp"].is_string());
    }
}
