use thiserror::Error;

/// Errors raised while acquiring a device or driving a recording.
///
/// Acquisition failures (`PermissionDenied`, `DeviceUnavailable`,
/// `ConstraintNotSatisfiable`) are recoverable by retrying or picking another
/// device. `InvalidState` is caller misuse and never changes session state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device not available: {0}")]
    DeviceUnavailable(String),

    #[error("constraint not satisfiable: {0}")]
    ConstraintNotSatisfiable(String),

    #[error("device query failed: {0}")]
    DeviceQuery(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("capture stream failed: {0}")]
    StreamFailed(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),
}

impl CaptureError {
    /// Whether this error came from acquiring a device.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::DeviceUnavailable(_) | Self::ConstraintNotSatisfiable(_)
        )
    }

    /// Whether the caller can reasonably retry (possibly after re-selecting a device).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidState(_) | Self::ConfigurationFailed(_))
    }

    pub(crate) fn invalid_state(operation: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState(format!("cannot {} while {}", operation, state))
    }
}

/// Errors from the transcode pipeline.
///
/// `Init` means the transcoder runtime itself failed to load; `Failed` means
/// this particular input could not be converted. Neither affects the input artifact.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    #[error("transcoder failed to initialize: {0}")]
    Init(String),

    #[error("transcoder is busy with another job")]
    Busy,

    #[error("transcode failed: {0}")]
    Failed(String),
}

/// Errors from delivering a finished artifact.
///
/// The artifact is never consumed by a failed delivery, so the caller can retry.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("delivery misconfigured: {0}")]
    Configuration(String),
}
