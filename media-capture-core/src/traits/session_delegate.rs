use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordingState;
use crate::processing::chunk_buffer::Chunk;

/// Event delegate for recording session notifications.
///
/// `on_chunk` and failures detected mid-recording are reported from the
/// session's collector task, not the caller's task. Implementations should
/// return quickly.
pub trait SessionDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: RecordingState);

    /// Called for every chunk appended to the buffer.
    fn on_chunk(&self, _chunk: &Chunk) {}

    /// Called when a capture error resets the session.
    fn on_error(&self, error: &CaptureError);

    /// Called once the recording is finalized.
    fn on_finalized(&self, result: &RecordingResult);
}

/// Delegate that forwards every notification to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelegate;

impl SessionDelegate for LogDelegate {
    fn on_state_changed(&self, state: RecordingState) {
        log::info!("recording session -> {}", state);
    }

    fn on_chunk(&self, chunk: &Chunk) {
        log::debug!("chunk #{} ({} bytes) at {:?}", chunk.sequence, chunk.data.len(), chunk.offset);
    }

    fn on_error(&self, error: &CaptureError) {
        log::error!("recording session error: {}", error);
    }

    fn on_finalized(&self, result: &RecordingResult) {
        log::info!(
            "recording finalized: {} bytes of {} in {:.1}s",
            result.artifact.len(),
            result.artifact.mime_type(),
            result.duration.as_secs_f64()
        );
    }
}
