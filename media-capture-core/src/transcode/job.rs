use crate::models::artifact::{Artifact, MediaFormat};
use crate::models::error::TranscodeError;

/// Progress of a single transcode job.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeStatus {
    Pending,
    Running,
    Succeeded(Artifact),
    Failed(TranscodeError),
}

impl TranscodeStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

/// One conversion of an artifact into a target container.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub id: u64,
    pub source: MediaFormat,
    pub target: MediaFormat,
    pub input_len: usize,
    pub status: TranscodeStatus,
}

impl TranscodeJob {
    pub fn new(id: u64, input: &Artifact, target: MediaFormat) -> Self {
        Self {
            id,
            source: input.format(),
            target,
            input_len: input.len(),
            status: TranscodeStatus::Pending,
        }
    }

    /// Working-file name of the job input inside the runtime namespace.
    pub fn input_name(&self) -> String {
        format!("job-{}-input.{}", self.id, self.source.extension())
    }

    /// Working-file name of the job output inside the runtime namespace.
    pub fn output_name(&self) -> String {
        format!("job-{}-output.{}", self.id, self.target.extension())
    }
}
