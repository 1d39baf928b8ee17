//! # media-capture-core
//!
//! Platform-agnostic recording core library.
//!
//! Provides the recording session state machine, chunk buffering, the
//! transcode pipeline and delivery sinks. Platform backends (ffmpeg today)
//! implement the `CaptureSource`, `DeviceEnumerator` and `TranscoderRuntime`
//! traits and plug into the generic `RecordingSession` and `TranscodePipeline`.
//!
//! ## Architecture
//!
//! ```text
//! media-capture-core (this crate)
//! ├── traits/       ← CaptureSource, DeviceEnumerator, Transcoder, DeliverySink, SessionDelegate
//! ├── models/       ← CaptureError, RecordingState, CaptureConfiguration, Artifact, etc.
//! ├── processing/   ← ChunkBuffer, delivery file names
//! ├── session/      ← RecordingSession (generic state machine)
//! ├── transcode/    ← TranscodePipeline (serialized jobs over a runtime)
//! ├── delivery/     ← LocalSaveSink, UploadSink
//! └── storage/      ← metadata sidecar
//! ```

pub mod delivery;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod traits;
pub mod transcode;

// Re-export key types at crate root for convenience.
pub use delivery::local::LocalSaveSink;
pub use delivery::upload::UploadSink;
pub use models::artifact::{Artifact, MediaFormat};
pub use models::config::{CaptureConfiguration, UploadConfig};
pub use models::device::{CaptureRequest, DeviceDescriptor, DeviceKind, FacingMode, SessionDiagnostics};
pub use models::error::{CaptureError, DeliveryError, TranscodeError};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::{RecordingState, SourceState};
pub use processing::chunk_buffer::{Chunk, ChunkBuffer};
pub use session::recording::RecordingSession;
pub use traits::capture_source::{chunk_channel, CaptureSource, ChunkEvent, ChunkReceiver, ChunkSender};
pub use traits::delivery_sink::{DeliveryReceipt, DeliverySink};
pub use traits::device_enumerator::DeviceEnumerator;
pub use traits::session_delegate::{LogDelegate, SessionDelegate};
pub use traits::transcoder::{Transcoder, TranscoderRuntime};
pub use transcode::job::{TranscodeJob, TranscodeStatus};
pub use transcode::pipeline::TranscodePipeline;
