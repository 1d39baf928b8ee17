use serde::{Deserialize, Serialize};

/// Kind of capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Video,
    Audio,
}

/// A capture device available for recording.
///
/// Snapshot taken by a `DeviceEnumerator`; may differ between enumerations
/// when hardware is attached or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
    #[serde(default)]
    pub is_default: bool,
}

impl DeviceDescriptor {
    pub fn video(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: DeviceKind::Video,
            is_default: false,
        }
    }

    pub fn audio(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: DeviceKind::Audio,
            is_default: false,
        }
    }
}

/// Which way the camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
    #[default]
    None,
}

/// Parameters for acquiring a live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Device to open, or `None` for the platform default.
    pub device_id: Option<String>,
    pub facing: FacingMode,
    pub audio: bool,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            device_id: None,
            facing: FacingMode::None,
            audio: true,
        }
    }
}

/// Counters for debugging recording sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub acquisitions: u64,
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub recordings_finalized: u64,
    pub capture_failures: u64,
}
