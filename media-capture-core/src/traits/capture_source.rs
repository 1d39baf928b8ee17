use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::models::artifact::MediaFormat;
use crate::models::device::{CaptureRequest, DeviceDescriptor};
use crate::models::error::CaptureError;
use crate::models::state::SourceState;

/// One event on a recording's chunk channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    Data(Bytes),
    /// Unrecoverable capture failure. The source sends nothing after this.
    Failed(CaptureError),
}

pub type ChunkSender = mpsc::UnboundedSender<ChunkEvent>;
pub type ChunkReceiver = mpsc::UnboundedReceiver<ChunkEvent>;

/// Create the channel a source uses to deliver chunks for one recording.
pub fn chunk_channel() -> (ChunkSender, ChunkReceiver) {
    mpsc::unbounded_channel()
}

/// A live audio/video stream from one capture device.
///
/// Implemented by:
/// - `FfmpegCaptureSource` (media-capture-ffmpeg)
/// - `ScriptedSource` (tests)
///
/// A source owns at most one hardware lease. Chunks for a recording are
/// delivered in emission order on the receiver returned by
/// `begin_recording`; the sender is dropped once the last chunk after
/// `end_recording` has been sent, so a closed channel means the flush is complete.
#[async_trait]
pub trait CaptureSource: Send {
    fn state(&self) -> SourceState;

    /// Device backing the active stream, if any.
    fn device(&self) -> Option<DeviceDescriptor>;

    /// Whether the source can produce the given container MIME type.
    fn supports_mime(&self, mime: &str) -> bool;

    /// Container the source records when no supported preference is given.
    fn default_format(&self) -> MediaFormat;

    /// Acquire a live stream. Releases any stream this source already holds first.
    ///
    /// On failure the source is left `Idle` with nothing acquired.
    async fn start(&mut self, request: &CaptureRequest) -> Result<(), CaptureError>;

    /// Release the stream. Calling this on an idle or stopped source is a no-op.
    async fn stop(&mut self);

    /// Start emitting chunks of `format` roughly every `timeslice`.
    async fn begin_recording(
        &mut self,
        format: MediaFormat,
        timeslice: Duration,
    ) -> Result<ChunkReceiver, CaptureError>;

    /// Ask the recorder to stop. The final chunk may arrive after this returns.
    async fn end_recording(&mut self) -> Result<(), CaptureError>;
}
