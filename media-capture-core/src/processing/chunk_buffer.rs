use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::models::artifact::{Artifact, MediaFormat};
use crate::models::error::CaptureError;

/// One unit of media data emitted by an active recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Arrival index within the recording, starting at 0.
    pub sequence: u64,
    /// Time since the recording began.
    pub offset: Duration,
    pub data: Bytes,
}

/// Append-only buffer of chunks for a single recording.
///
/// Wrap in `Arc<parking_lot::Mutex<ChunkBuffer>>` to share it between the
/// session and its collector task.
///
/// Insertion order is arrival order. Once sealed the buffer accepts no more
/// chunks and can be finalized; `begin` or `clear` opens it for a new cycle.
#[derive(Debug)]
pub struct ChunkBuffer {
    chunks: Vec<Chunk>,
    total_bytes: usize,
    sealed: bool,
    started_at: Option<Instant>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            total_bytes: 0,
            sealed: false,
            started_at: None,
        }
    }

    /// Discard anything buffered and start timing a new recording.
    pub fn begin(&mut self) {
        self.clear();
        self.started_at = Some(Instant::now());
    }

    /// Append a chunk. Empty payloads are ignored.
    ///
    /// Returns the stored chunk, or `None` for an empty payload.
    pub fn append(&mut self, data: Bytes) -> Result<Option<&Chunk>, CaptureError> {
        if self.sealed {
            return Err(CaptureError::InvalidState("cannot append to a sealed chunk buffer".into()));
        }
        if data.is_empty() {
            return Ok(None);
        }

        let offset = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        self.total_bytes += data.len();
        self.chunks.push(Chunk {
            sequence: self.chunks.len() as u64,
            offset,
            data,
        });
        Ok(self.chunks.last())
    }

    /// Stop accepting chunks. Required before `finalize`.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Concatenate every chunk in arrival order into one artifact.
    pub fn finalize(&self, format: MediaFormat) -> Result<Artifact, CaptureError> {
        if !self.sealed {
            return Err(CaptureError::InvalidState(
                "cannot finalize a chunk buffer that is still being appended to".into(),
            ));
        }

        let mut data = BytesMut::with_capacity(self.total_bytes);
        for chunk in &self.chunks {
            data.extend_from_slice(&chunk.data);
        }
        Ok(Artifact::new(data.freeze(), format))
    }

    /// Drop all chunks and reopen the buffer.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
        self.sealed = false;
        self.started_at = None;
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of chunks buffered.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total payload bytes across all chunks.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Time since `begin`, or zero if never started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(data: &'static [u8]) -> Bytes {
        Bytes::from_static(data)
    }

    #[test]
    fn basic_append_finalize() {
        let mut buf = ChunkBuffer::new();
        buf.begin();
        buf.append(bytes(b"abc")).unwrap();
        buf.append(bytes(b"de")).unwrap();
        buf.seal();

        let artifact = buf.finalize(MediaFormat::Webm).unwrap();
        assert_eq!(artifact.data().as_ref(), b"abcde");
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.total_bytes(), 5);
    }

    #[test]
    fn sequence_follows_arrival_order() {
        let mut buf = ChunkBuffer::new();
        buf.begin();
        for data in [bytes(b"1"), bytes(b"2"), bytes(b"3")] {
            buf.append(data).unwrap();
        }

        let sequences: Vec<u64> = buf.chunks().iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(buf.chunks().windows(2).all(|w| w[0].offset <= w[1].offset));
    }

    #[test]
    fn finalize_before_seal_is_rejected() {
        let mut buf = ChunkBuffer::new();
        buf.begin();
        buf.append(bytes(b"abc")).unwrap();

        assert!(matches!(buf.finalize(MediaFormat::Webm), Err(CaptureError::InvalidState(_))));
    }

    #[test]
    fn sealed_buffer_rejects_appends() {
        let mut buf = ChunkBuffer::new();
        buf.begin();
        buf.seal();

        assert!(buf.append(bytes(b"late")).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_payloads_are_ignored() {
        let mut buf = ChunkBuffer::new();
        buf.begin();
        assert!(buf.append(Bytes::new()).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn finalize_empty_buffer_yields_empty_artifact() {
        let mut buf = ChunkBuffer::new();
        buf.begin();
        buf.seal();

        let artifact = buf.finalize(MediaFormat::Webm).unwrap();
        assert!(artifact.is_empty());
    }

    #[test]
    fn begin_clears_previous_cycle() {
        let mut buf = ChunkBuffer::new();
        buf.begin();
        buf.append(bytes(b"old")).unwrap();
        buf.seal();

        buf.begin();
        assert!(!buf.is_sealed());
        assert!(buf.is_empty());
        buf.append(bytes(b"new")).unwrap();
        buf.seal();
        assert_eq!(buf.finalize(MediaFormat::Webm).unwrap().data().as_ref(), b"new");
    }
}
