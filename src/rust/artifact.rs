use std::fs;
use std::path::{Path, PathBuf};

use log;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classifier::model::TrainedModel;
use crate::classifier::EngineError;

/// On-disk wrapper: the model plus a SHA-256 of its canonical JSON encoding.
#[derive(Serialize, Deserialize)]
struct ArtifactEnvelope {
    sha256: String,
    model: TrainedModel,
}

fn checksum(model: &TrainedModel) -> Result<String, EngineError> {
    let payload = serde_json::to_vec(model)?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    Ok(format!("{:x}", hasher.finalize()))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Persists a trained model to `path`.
///
/// The artifact is written to a sibling temporary file and renamed into place,
/// so readers never observe a half-written model.
///
/// # Errors
/// - `PersistenceError` if the directory cannot be created or the file cannot be written
pub fn save_model<P: AsRef<Path>>(model: &TrainedModel, path: P) -> Result<(), EngineError> {
    let path = path.as_ref();
    let envelope = ArtifactEnvelope {
        sha256: checksum(model)?,
        model: model.clone(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        log::info!("Creating model directory at {:?}", parent);
        fs::create_dir_all(parent).map_err(|e| {
            EngineError::PersistenceError(format!("Failed to create {:?}: {}", parent, e))
        })?;
    }

    let bytes = serde_json::to_vec_pretty(&envelope)?;
    let staging = staging_path(path);
    log::info!("Writing {} bytes to {:?}", bytes.len(), staging);
    fs::write(&staging, &bytes).map_err(|e| {
        EngineError::PersistenceError(format!("Failed to write {:?}: {}", staging, e))
    })?;
    fs::rename(&staging, path).map_err(|e| {
        let _ = fs::remove_file(&staging);
        EngineError::PersistenceError(format!("Failed to move artifact into {:?}: {}", path, e))
    })?;

    log::info!("Model artifact saved to {:?} (sha256 {})", path, envelope.sha256);
    Ok(())
}

/// Reads a model back from `path`, verifying its checksum and structure.
///
/// Schema compatibility is checked by the serving wrapper, not here.
///
/// # Errors
/// - `ModelNotFound` if nothing exists at `path`
/// - `ChecksumMismatch` if the contents were altered after saving
/// - `PersistenceError` if the file is unreadable or malformed
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<TrainedModel, EngineError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EngineError::ModelNotFound(path.display().to_string()));
    }

    log::info!("Reading model artifact from {:?}", path);
    let bytes = fs::read(path)
        .map_err(|e| EngineError::PersistenceError(format!("Failed to read {:?}: {}", path, e)))?;
    let envelope: ArtifactEnvelope = serde_json::from_slice(&bytes)?;

    let actual = checksum(&envelope.model)?;
    log::debug!("Calculated hash: {}", actual);
    log::debug!("Expected hash:   {}", envelope.sha256);
    if actual != envelope.sha256 {
        log::error!("Model artifact hash mismatch: expected {}, got {}", envelope.sha256, actual);
        return Err(EngineError::ChecksumMismatch {
            expected: envelope.sha256,
            actual,
        });
    }

    envelope.model.validate()?;
    Ok(envelope.model)
}

/// Returns `Ok(false)` when the artifact is missing or fails its checksum.
pub fn verify_model<P: AsRef<Path>>(path: P) -> Result<bool, EngineError> {
    match load_model(path) {
        Ok(_) => Ok(true),
        Err(EngineError::ModelNotFound(_)) | Err(EngineError::ChecksumMismatch { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Deletes the artifact at `path` if one exists.
pub fn remove_model<P: AsRef<Path>>(path: P) -> Result<(), EngineError> {
    let path = path.as_ref();
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
