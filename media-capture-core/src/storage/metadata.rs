use std::path::{Path, PathBuf};

use crate::models::error::DeliveryError;
use crate::models::recording_result::RecordingMetadata;

/// Path of the JSON sidecar for `recording_path`: `{stem}.metadata.json`.
pub fn sidecar_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("metadata.json")
}

/// Write recording metadata as a JSON sidecar file next to the recording.
pub async fn write_metadata(metadata: &RecordingMetadata, recording_path: &Path) -> Result<PathBuf, DeliveryError> {
    let metadata_path = sidecar_path(recording_path);
    let json = serde_json::to_string_pretty(metadata)?;
    tokio::fs::write(&metadata_path, json).await?;
    log::debug!("wrote metadata sidecar {}", metadata_path.display());
    Ok(metadata_path)
}

/// Read recording metadata from a JSON sidecar file.
pub async fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, DeliveryError> {
    let json = tokio::fs::read_to_string(sidecar_path(recording_path)).await?;
    Ok(serde_json::from_str(&json)?)
}
