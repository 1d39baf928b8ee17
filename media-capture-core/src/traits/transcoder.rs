use async_trait::async_trait;
use bytes::Bytes;

use crate::models::artifact::{Artifact, MediaFormat};
use crate::models::error::TranscodeError;

/// Converts an artifact into another container format.
///
/// The input is never modified; on failure it stays valid for delivery as-is.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Artifact, target: MediaFormat) -> Result<Artifact, TranscodeError>;
}

/// Low-level transcoder backend with a private working-file namespace.
///
/// A job writes its input under a name, runs one conversion from that name
/// to an output name, reads the output back, and deletes both names.
/// `TranscodePipeline` drives this sequence and guarantees only one job uses
/// the runtime at a time.
#[async_trait]
pub trait TranscoderRuntime: Send {
    /// Load the runtime. Called once before the first job, and again after a failed load.
    async fn load(&mut self) -> Result<(), TranscodeError>;

    async fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), TranscodeError>;

    /// Convert the file at `input` into `target`, written at `output`.
    async fn run(&mut self, input: &str, output: &str, target: MediaFormat) -> Result<(), TranscodeError>;

    async fn read_file(&mut self, name: &str) -> Result<Bytes, TranscodeError>;

    async fn delete_file(&mut self, name: &str) -> Result<(), TranscodeError>;
}
