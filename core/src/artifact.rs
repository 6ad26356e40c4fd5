//! Model artifact: full ensemble state to/from one JSON file.
//!
//! RULE: every write goes to a sibling `.tmp` file first and is
//! renamed into place. A reader never sees a half-written artifact.

use crate::{
    config::EnsembleConfig,
    ensemble::{Provenance, QuantileModel, TrainingMetadata},
    error::{PromoError, PromoResult},
    lifecycle::ModelStatus,
    types::{ClientId, ModelId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub model_id: ModelId,
    pub client_id: ClientId,
    pub simulator_version: String,
    pub config: EnsembleConfig,
    pub quantiles: Vec<f64>,
    pub status: ModelStatus,
    pub deployed_at: Option<DateTime<Utc>>,
    pub retired_at: Option<DateTime<Utc>>,
    pub provenance: Provenance,
    pub feature_names: Vec<String>,
    pub training_metadata: TrainingMetadata,
    pub models: Vec<QuantileModel>,
    pub saved_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn write(&self, path: &Path) -> PromoResult<()> {
        let bytes = serde_json::to_vec(self)?;
        write_atomic(path, &bytes)
    }

    pub fn read(path: &Path) -> PromoResult<Self> {
        let bytes = fs::read(path)?;
        // Peek at the version before committing to the full schema.
        let header: ArtifactHeader = serde_json::from_slice(&bytes)?;
        if header.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(PromoError::UnsupportedArtifact { found: header.format_version });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Deserialize)]
struct ArtifactHeader {
    format_version: u32,
}

/// Write `bytes` to `path` via a temporary sibling and a rename,
/// creating missing parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> PromoResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path
        .file_name()
        .ok_or_else(|| PromoError::invalid_input(format!("{} has no file name", path.display())))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        PromoError::Io(e)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/model.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        assert!(!path.with_file_name("model.json.tmp").exists());
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn unknown_format_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        write_atomic(&path, br#"{"format_version": 99}"#).unwrap();
        assert!(matches!(
            ModelArtifact::read(&path),
            Err(PromoError::UnsupportedArtifact { found: 99 })
        ));
    }
}
