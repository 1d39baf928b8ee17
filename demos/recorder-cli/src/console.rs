use serde::Serialize;

use media_capture_core::{CaptureError, DeviceDescriptor, DeviceKind, RecordingResult, RecordingState, SessionDelegate};

/// SessionDelegate that reports progress on the terminal.
pub struct ConsoleDelegate;

impl SessionDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: RecordingState) {
        log::debug!("session state: {}", state);
        match state {
            RecordingState::DeviceReady => eprintln!("camera on"),
            RecordingState::Recording => eprintln!("recording... (Ctrl-C to stop)"),
            RecordingState::Stopping => eprintln!("finishing recording"),
            _ => {}
        }
    }

    fn on_error(&self, error: &CaptureError) {
        eprintln!("capture error: {}", error);
    }

    fn on_finalized(&self, result: &RecordingResult) {
        eprintln!(
            "recorded {:.1}s, {} bytes in {} chunks",
            result.duration.as_secs_f64(),
            result.artifact.len(),
            result.chunk_count
        );
    }
}

/// Serializable device listing entry.
#[derive(Clone, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub is_default: bool,
}

impl From<DeviceDescriptor> for DeviceInfo {
    fn from(device: DeviceDescriptor) -> Self {
        Self {
            id: device.id,
            name: device.label,
            kind: device.kind,
            is_default: device.is_default,
        }
    }
}

/// Serializable delivery summary printed after a recording.
#[derive(Clone, Serialize)]
pub struct RecordingInfo {
    pub file_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub duration_secs: f64,
    pub checksum: String,
    pub uploaded_to: Option<String>,
}
