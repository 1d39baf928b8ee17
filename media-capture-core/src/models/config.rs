use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::artifact::MediaFormat;
use super::device::{CaptureRequest, FacingMode};

/// Configuration for a recording session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Specific capture device ID, or None for the platform default.
    pub device_id: Option<String>,

    /// Preferred camera facing (default: none).
    pub facing: FacingMode,

    /// Capture audio alongside video (default: true).
    pub enable_audio: bool,

    /// Container requested from the capture source (default: `video/webm`).
    pub mime_type: String,

    /// How often the source emits a chunk, in milliseconds (default: 1000).
    pub timeslice_ms: u64,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if MediaFormat::from_mime(&self.mime_type).is_none() {
            return Err(format!("unsupported mime type: {}", self.mime_type));
        }
        if self.timeslice_ms == 0 {
            return Err("timeslice must be positive".into());
        }
        if matches!(&self.device_id, Some(id) if id.trim().is_empty()) {
            return Err("device id must not be blank".into());
        }
        Ok(())
    }

    pub fn format(&self) -> Option<MediaFormat> {
        MediaFormat::from_mime(&self.mime_type)
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    /// Acquisition request for `device_id`, falling back to the configured device.
    pub fn request_for(&self, device_id: Option<String>) -> CaptureRequest {
        CaptureRequest {
            device_id: device_id.or_else(|| self.device_id.clone()),
            facing: self.facing,
            audio: self.enable_audio,
        }
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            device_id: None,
            facing: FacingMode::None,
            enable_audio: true,
            mime_type: MediaFormat::Webm.mime_type().to_string(),
            timeslice_ms: 1000,
        }
    }
}

/// Configuration for the remote upload sink.
///
/// The access token is injected at runtime and never serialized back out.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Upload endpoint receiving the raw bytes.
    pub endpoint: String,

    /// Header carrying the JSON upload argument.
    pub arg_header: String,

    /// Remote directory the file is placed in (must start with `/`).
    pub target_dir: String,

    /// Suppress remote change notifications.
    pub mute: bool,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    #[serde(skip_serializing)]
    pub access_token: String,
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(format!("invalid upload endpoint: {:?}", self.endpoint));
        }
        if self.access_token.trim().is_empty() {
            return Err("upload access token is not set".into());
        }
        if !self.target_dir.starts_with('/') {
            return Err(format!("target dir must be absolute: {:?}", self.target_dir));
        }
        if self.arg_header.trim().is_empty() {
            return Err("argument header name is empty".into());
        }
        Ok(())
    }

    /// Remote path for `file_name` under `target_dir`.
    pub fn target_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.target_dir.trim_end_matches('/'), file_name)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://content.dropboxapi.com/2/files/upload".into(),
            arg_header: "Dropbox-API-Arg".into(),
            target_dir: "/recordings".into(),
            mute: false,
            timeout_secs: 120,
            access_token: String::new(),
        }
    }
}

impl fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConfig")
            .field("endpoint", &self.endpoint)
            .field("arg_header", &self.arg_header)
            .field("target_dir", &self.target_dir)
            .field("mute", &self.mute)
            .field("timeout_secs", &self.timeout_secs)
            .field("access_token", &"<redacted>")
            .finish()
    }
}
