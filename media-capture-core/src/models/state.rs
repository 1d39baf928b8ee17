use std::fmt;

use serde::{Deserialize, Serialize};

/// Recording session state machine.
///
/// State transitions:
/// ```text
/// idle → device_ready → recording → stopping → finalized
///  ↑          ↺ switch_device                      │
///  └──────────────────── reset ────────────────────┘
/// any state ── unrecoverable capture error ──→ idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    DeviceReady,
    Recording,
    Stopping,
    Finalized,
}

impl RecordingState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Recording or flushing its last chunks.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Recording | Self::Stopping)
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DeviceReady => "device_ready",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Finalized => "finalized",
        }
    }
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of the hardware stream owned by a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceState {
    Idle,
    Acquiring,
    Active,
    Stopped,
}

impl SourceState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}
