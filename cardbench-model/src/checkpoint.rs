//! Checkpoint Discovery
//!
//! Model artifacts carry their quality metadata in the file name:
//! `<prefix>model<bits>-data<bits><sep>seed<int><suffix>.pt`. A file that does
//! not follow this contract is a misconfigured run and fails hard.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while finding or parsing checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint name does not match '<..>model<bits>-data<bits><..>seed<int><..>.pt': {0}")]
    BadName(PathBuf),

    #[error("Invalid checkpoint glob '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to read checkpoint candidate: {0}")]
    Glob(#[from] glob::GlobError),
}

/// Metadata parsed from a checkpoint file name
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    /// Artifact location
    pub path: PathBuf,
    /// Bits per tuple achieved by the model
    pub model_bits: f64,
    /// Entropy of the data, in bits per tuple
    pub data_bits: f64,
    /// Training seed
    pub seed: u64,
}

fn name_pattern() -> &'static Regex {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    NAME_RE.get_or_init(|| {
        Regex::new(r"^.+model([\d\.]+)-data([\d\.]+).+seed(\d+).*\.pt$").unwrap()
    })
}

impl CheckpointMeta {
    /// Parse the metadata out of `path`'s file name.
    pub fn parse(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        let bad = || CheckpointError::BadName(path.to_path_buf());
        let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(bad)?;
        let caps = name_pattern().captures(name).ok_or_else(bad)?;

        let model_bits = caps[1].parse::<f64>().map_err(|_| bad())?;
        let data_bits = caps[2].parse::<f64>().map_err(|_| bad())?;
        let seed = caps[3].parse::<u64>().map_err(|_| bad())?;

        Ok(Self {
            path: path.to_path_buf(),
            model_bits,
            data_bits,
            seed,
        })
    }

    /// `model_bits - data_bits`; smaller is a better model
    pub fn bits_gap(&self) -> f64 {
        self.model_bits - self.data_bits
    }
}

/// Find checkpoints matching `pattern` under `models_dir`.
///
/// Paths containing `blacklist` are dropped. Every remaining path must
/// satisfy the naming contract. The result is sorted by path.
pub fn discover_checkpoints(
    models_dir: &Path,
    pattern: &str,
    blacklist: Option<&str>,
) -> Result<Vec<CheckpointMeta>, CheckpointError> {
    let full = models_dir.join(pattern).to_string_lossy().into_owned();
    let entries = glob::glob(&full).map_err(|source| CheckpointError::Pattern {
        pattern: full.clone(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?;
        if let Some(needle) = blacklist {
            if path.to_string_lossy().contains(needle) {
                debug!("Skipping blacklisted checkpoint {}", path.display());
                continue;
            }
        }
        paths.push(path);
    }
    paths.sort();

    let ckpts = paths
        .iter()
        .map(CheckpointMeta::parse)
        .collect::<Result<Vec<_>, _>>()?;
    info!("Found {} checkpoint(s) matching {}", ckpts.len(), full);
    Ok(ckpts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_parse_checkpoint_name() {
        let meta = CheckpointMeta::parse("run-model12.3-data10.1-seed42-x.pt").unwrap();
        assert_eq!(meta.model_bits, 12.3);
        assert_eq!(meta.data_bits, 10.1);
        assert_eq!(meta.seed, 42);
        assert!((meta.bits_gap() - 2.2).abs() < 1e-9);
    }

    #[test]
    fn test_broken_name_is_fatal() {
        assert!(matches!(
            CheckpointMeta::parse("run-broken.pt"),
            Err(CheckpointError::BadName(_))
        ));
        assert!(CheckpointMeta::parse("run-model1-data1-seed1.json").is_err());
    }

    #[test]
    fn test_parse_uses_file_name_only() {
        let meta = CheckpointMeta::parse("/models/dir/dmv-model20.5-data19.0-x-seed7.pt").unwrap();
        assert_eq!(meta.seed, 7);
        assert_eq!(meta.path, PathBuf::from("/models/dir/dmv-model20.5-data19.0-x-seed7.pt"));
    }

    #[test]
    fn test_discover_with_blacklist() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "dmv-model21.0-data19.5-made-seed1.pt",
            "dmv-model20.0-data19.5-made-seed0.pt",
            "dmv-model25.0-data19.5-old-seed2.pt",
            "notes.txt",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let found = discover_checkpoints(dir.path(), "dmv-*.pt", Some("old")).unwrap();
        let seeds: Vec<u64> = found.iter().map(|c| c.seed).collect();
        assert_eq!(seeds, vec![0, 1]);
    }

    #[test]
    fn test_discover_rejects_bad_name() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("dmv-latest.pt")).unwrap();
        assert!(matches!(
            discover_checkpoints(dir.path(), "*.pt", None),
            Err(CheckpointError::BadName(_))
        ));
    }
}
