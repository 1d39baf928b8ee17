use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::artifact::Artifact;
use super::device::DeviceDescriptor;

/// Result returned when a recording reaches `Finalized`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub artifact: Artifact,
    pub duration: Duration,
    pub chunk_count: usize,
    pub metadata: RecordingMetadata,
}

/// Metadata stored alongside a delivered recording.
///
/// Serializable for the JSON sidecar written next to saved files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub mime_type: String,
    pub byte_length: u64,
    pub duration_secs: f64,
    pub chunk_count: usize,
    pub checksum: String,
    pub device_id: Option<String>,
    pub device_label: Option<String>,
}

impl RecordingMetadata {
    pub fn new(
        artifact: &Artifact,
        duration: Duration,
        chunk_count: usize,
        device: Option<&DeviceDescriptor>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            mime_type: artifact.mime_type().to_string(),
            byte_length: artifact.len() as u64,
            duration_secs: duration.as_secs_f64(),
            chunk_count,
            checksum: artifact.checksum().to_string(),
            device_id: device.map(|d| d.id.clone()),
            device_label: device.map(|d| d.label.clone()),
        }
    }

    /// Metadata describing a transcoded copy of the same recording.
    pub fn for_derived(&self, artifact: &Artifact) -> Self {
        Self {
            mime_type: artifact.mime_type().to_string(),
            byte_length: artifact.len() as u64,
            checksum: artifact.checksum().to_string(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifact::MediaFormat;

    #[test]
    fn derived_metadata_keeps_identity() {
        let raw = Artifact::new(vec![1u8; 25], MediaFormat::Webm);
        let device = DeviceDescriptor::video("cam-1", "Front Camera");
        let meta = RecordingMetadata::new(&raw, Duration::from_secs(2), 3, Some(&device));

        let mp4 = Artifact::new(vec![2u8; 40], MediaFormat::Mp4);
        let derived = meta.for_derived(&mp4);

        assert_eq!(derived.id, meta.id);
        assert_eq!(derived.device_id.as_deref(), Some("cam-1"));
        assert_eq!(derived.mime_type, "video/mp4");
        assert_eq!(derived.byte_length, 40);
        assert_ne!(derived.checksum, meta.checksum);
    }
}
