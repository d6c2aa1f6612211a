//! Oracle Cardinality Cache
//!
//! Precomputed true cardinalities for a fixed, seeded query set. When the
//! cache for a dataset exists, the runner reads query `i`'s cardinality from
//! entry `i` instead of scanning the table.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors raised while reading a cache file
#[derive(Debug, Error)]
pub enum OracleCacheError {
    #[error("Failed to read oracle cache {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Oracle cache {path}, line {line}: '{value}' is not a cardinality")]
    Parse {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("Oracle cache {path} holds {found} entries, expected {expected}")]
    CountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

/// A dataset's registered cache file and its exact entry count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleCacheSpec {
    /// File name under the datasets directory
    pub file: &'static str,
    /// Number of entries the file must hold
    pub entries: usize,
    /// Query-generation seed the entries belong to
    pub seed: u64,
}

/// Cache registered for `dataset`, if any
pub fn oracle_cache_spec(dataset: &str) -> Option<OracleCacheSpec> {
    match dataset {
        "dmv" => Some(OracleCacheSpec {
            file: "dmv-2000queries-oracle-cards-seed1234.csv",
            entries: 2000,
            seed: 1234,
        }),
        _ => None,
    }
}

/// Load the cache registered for `dataset` from `datasets_dir`.
///
/// Returns `Ok(None)` when no cache is registered or the file is absent.
pub fn load_oracle_cards(
    dataset: &str,
    datasets_dir: &Path,
) -> Result<Option<Vec<u64>>, OracleCacheError> {
    let Some(spec) = oracle_cache_spec(dataset) else {
        return Ok(None);
    };
    let path = datasets_dir.join(spec.file);
    if !path.exists() {
        return Ok(None);
    }
    let cards = read_oracle_cards(&path, Some(spec.entries))?;
    info!("Loaded {} oracle cardinalities from {}", cards.len(), path.display());
    Ok(Some(cards))
}

/// Read a flat list of cardinalities, one per line.
///
/// Values may be written as floats (`123.0`). With `expected` set, a file
/// holding any other number of entries is rejected.
pub fn read_oracle_cards(
    path: &Path,
    expected: Option<usize>,
) -> Result<Vec<u64>, OracleCacheError> {
    let csv_err = |source| OracleCacheError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut cards = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let field = record.get(0).unwrap_or_default().trim();
        if field.is_empty() {
            continue;
        }
        let value: f64 = field.parse().map_err(|_| OracleCacheError::Parse {
            path: path.to_path_buf(),
            line: line + 1,
            value: field.to_string(),
        })?;
        if !value.is_finite() || value < 0.0 {
            return Err(OracleCacheError::Parse {
                path: path.to_path_buf(),
                line: line + 1,
                value: field.to_string(),
            });
        }
        cards.push(value.round() as u64);
    }

    if let Some(expected) = expected {
        if cards.len() != expected {
            return Err(OracleCacheError::CountMismatch {
                path: path.to_path_buf(),
                expected,
                found: cards.len(),
            });
        }
    }
    Ok(cards)
}
