//! In-memory test doubles: a scripted capture source and a transcoder runtime.
//!
//! Available to this crate's tests and, with the `testing` feature, to downstream crates.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::models::artifact::MediaFormat;
use crate::models::device::{CaptureRequest, DeviceDescriptor};
use crate::models::error::{CaptureError, TranscodeError};
use crate::models::state::SourceState;
use crate::traits::capture_source::{chunk_channel, CaptureSource, ChunkEvent, ChunkReceiver, ChunkSender};
use crate::traits::transcoder::TranscoderRuntime;

/// EBML magic that opens every WebM file.
pub const WEBM_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// A payload of at least `len` bytes that starts like a WebM stream.
pub fn webm_payload(len: usize) -> Bytes {
    let mut data = vec![0u8; len.max(WEBM_MAGIC.len())];
    data[..WEBM_MAGIC.len()].copy_from_slice(&WEBM_MAGIC);
    Bytes::from(data)
}

#[derive(Default)]
struct Script {
    devices: Vec<DeviceDescriptor>,
    supported: Vec<MediaFormat>,
    acquire_failures: VecDeque<CaptureError>,
    sender: Option<ChunkSender>,
    final_chunk: Option<Bytes>,
    /// Reported on the chunk channel after `end_recording`, in place of the final chunk.
    flush_failure: Option<CaptureError>,
    end_failure: Option<CaptureError>,
    recording_format: Option<MediaFormat>,
    active_leases: usize,
    peak_leases: usize,
    starts: usize,
}

/// Capture source driven by a `ScriptHandle`.
///
/// Chunks are only delivered when the test emits them. `end_recording`
/// sends the configured final chunk from a spawned task, after the call
/// has already returned.
pub struct ScriptedSource {
    script: Arc<Mutex<Script>>,
    state: SourceState,
    device: Option<DeviceDescriptor>,
}

/// Test-side control of a `ScriptedSource`.
#[derive(Clone)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSource {
    /// A source that can open any of `devices`. The first device marked
    /// default (or the first device) is used when no id is requested.
    pub fn new(devices: Vec<DeviceDescriptor>) -> (Self, ScriptHandle) {
        let script = Arc::new(Mutex::new(Script {
            devices,
            supported: vec![MediaFormat::Webm],
            ..Default::default()
        }));
        let source = Self {
            script: Arc::clone(&script),
            state: SourceState::Idle,
            device: None,
        };
        (source, ScriptHandle { script })
    }

    /// A source with two cameras, `cam-1` (default) and `cam-2`.
    pub fn with_cameras() -> (Self, ScriptHandle) {
        let mut front = DeviceDescriptor::video("cam-1", "Front Camera");
        front.is_default = true;
        Self::new(vec![front, DeviceDescriptor::video("cam-2", "USB Camera")])
    }

    fn resolve(&self, script: &Script, request: &CaptureRequest) -> Result<DeviceDescriptor, CaptureError> {
        match &request.device_id {
            Some(id) => script
                .devices
                .iter()
                .find(|d| &d.id == id)
                .cloned()
                .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no device with id {}", id))),
            None => script
                .devices
                .iter()
                .find(|d| d.is_default)
                .or_else(|| script.devices.first())
                .cloned()
                .ok_or_else(|| CaptureError::DeviceUnavailable("no capture devices".into())),
        }
    }
}

#[async_trait]
impl CaptureSource for ScriptedSource {
    fn state(&self) -> SourceState {
        self.state
    }

    fn device(&self) -> Option<DeviceDescriptor> {
        self.device.clone()
    }

    fn supports_mime(&self, mime: &str) -> bool {
        MediaFormat::from_mime(mime).is_some_and(|f| self.script.lock().supported.contains(&f))
    }

    fn default_format(&self) -> MediaFormat {
        self.script.lock().supported.first().copied().unwrap_or(MediaFormat::Webm)
    }

    async fn start(&mut self, request: &CaptureRequest) -> Result<(), CaptureError> {
        self.stop().await;
        self.state = SourceState::Acquiring;

        let mut script = self.script.lock();
        script.starts += 1;
        let acquired = match script.acquire_failures.pop_front() {
            Some(err) => Err(err),
            None => self.resolve(&script, request),
        };
        match acquired {
            Ok(device) => {
                script.active_leases += 1;
                script.peak_leases = script.peak_leases.max(script.active_leases);
                self.device = Some(device);
                self.state = SourceState::Active;
                Ok(())
            }
            Err(err) => {
                self.state = SourceState::Idle;
                Err(err)
            }
        }
    }

    async fn stop(&mut self) {
        if !self.state.is_active() {
            return;
        }
        let mut script = self.script.lock();
        script.sender = None;
        script.recording_format = None;
        script.active_leases -= 1;
        self.device = None;
        self.state = SourceState::Stopped;
    }

    async fn begin_recording(
        &mut self,
        format: MediaFormat,
        _timeslice: Duration,
    ) -> Result<ChunkReceiver, CaptureError> {
        if !self.state.is_active() {
            return Err(CaptureError::InvalidState("no live stream to record".into()));
        }
        let (tx, rx) = chunk_channel();
        let mut script = self.script.lock();
        script.sender = Some(tx);
        script.recording_format = Some(format);
        Ok(rx)
    }

    async fn end_recording(&mut self) -> Result<(), CaptureError> {
        let (sender, final_chunk, flush_failure) = {
            let mut script = self.script.lock();
            if let Some(err) = script.end_failure.take() {
                return Err(err);
            }
            script.recording_format = None;
            (script.sender.take(), script.final_chunk.take(), script.flush_failure.take())
        };
        if let Some(tx) = sender {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                if let Some(err) = flush_failure {
                    let _ = tx.send(ChunkEvent::Failed(err));
                } else if let Some(data) = final_chunk {
                    let _ = tx.send(ChunkEvent::Data(data));
                }
            });
        }
        Ok(())
    }
}

impl ScriptHandle {
    /// Deliver a chunk to the active recording. Returns false when nothing is recording.
    pub fn emit(&self, data: impl Into<Bytes>) -> bool {
        match &self.script.lock().sender {
            Some(tx) => tx.send(ChunkEvent::Data(data.into())).is_ok(),
            None => false,
        }
    }

    /// Report an unrecoverable capture failure on the active recording.
    pub fn fail(&self, error: CaptureError) -> bool {
        match self.script.lock().sender.take() {
            Some(tx) => tx.send(ChunkEvent::Failed(error)).is_ok(),
            None => false,
        }
    }

    /// Close the chunk channel without a stop request, as if the device vanished.
    pub fn disconnect(&self) {
        self.script.lock().sender = None;
    }

    /// Chunk delivered asynchronously after the next `end_recording`.
    pub fn set_final_chunk(&self, data: impl Into<Bytes>) {
        self.script.lock().final_chunk = Some(data.into());
    }

    /// Report `error` while the next `end_recording` flushes, instead of a final chunk.
    pub fn fail_during_flush(&self, error: CaptureError) {
        self.script.lock().flush_failure = Some(error);
    }

    /// Make the next `end_recording` call itself fail with `error`.
    pub fn fail_next_end(&self, error: CaptureError) {
        self.script.lock().end_failure = Some(error);
    }

    /// Make the next acquisition fail with `error`.
    pub fn fail_next_acquire(&self, error: CaptureError) {
        self.script.lock().acquire_failures.push_back(error);
    }

    pub fn set_supported_formats(&self, formats: Vec<MediaFormat>) {
        self.script.lock().supported = formats;
    }

    pub fn active_leases(&self) -> usize {
        self.script.lock().active_leases
    }

    /// Highest number of simultaneously held leases seen so far.
    pub fn peak_leases(&self) -> usize {
        self.script.lock().peak_leases
    }

    pub fn start_count(&self) -> usize {
        self.script.lock().starts
    }

    /// Format of the recording in progress, if any.
    pub fn recording_format(&self) -> Option<MediaFormat> {
        self.script.lock().recording_format
    }
}

/// ISO BMFF `ftyp` box written at the head of every MP4 produced by `MemoryRuntime`.
const MP4_FTYP: [u8; 24] = [
    0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm', 0x00, 0x00, 0x02, 0x00, b'i', b's',
    b'o', b'm', b'i', b's', b'o', b'2',
];

#[derive(Default)]
struct RuntimeState {
    files: HashMap<String, Bytes>,
    load_failures: u32,
    loads: u32,
    runs: u32,
    run_delay: Option<Duration>,
}

/// Transcoder runtime backed by an in-memory file table.
///
/// Accepts only WebM input (checked by magic bytes); MP4 output is the input
/// behind an `ftyp` box. Clones share state, so a test can keep a clone to
/// inspect the file table after handing the runtime to a pipeline.
#[derive(Clone, Default)]
pub struct MemoryRuntime {
    state: Arc<Mutex<RuntimeState>>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` loads.
    pub fn failing_loads(self, count: u32) -> Self {
        self.state.lock().load_failures = count;
        self
    }

    /// Suspend every run for `delay` before converting.
    pub fn with_run_delay(self, delay: Duration) -> Self {
        self.state.lock().run_delay = Some(delay);
        self
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }

    pub fn load_count(&self) -> u32 {
        self.state.lock().loads
    }

    pub fn run_count(&self) -> u32 {
        self.state.lock().runs
    }
}

#[async_trait]
impl TranscoderRuntime for MemoryRuntime {
    async fn load(&mut self) -> Result<(), TranscodeError> {
        let mut state = self.state.lock();
        state.loads += 1;
        if state.load_failures > 0 {
            state.load_failures -= 1;
            return Err(TranscodeError::Init("runtime failed to load".into()));
        }
        Ok(())
    }

    async fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), TranscodeError> {
        self.state.lock().files.insert(name.to_string(), Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn run(&mut self, input: &str, output: &str, target: MediaFormat) -> Result<(), TranscodeError> {
        let delay = {
            let mut state = self.state.lock();
            state.runs += 1;
            state.run_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let source = state
            .files
            .get(input)
            .cloned()
            .ok_or_else(|| TranscodeError::Failed(format!("{}: no such file", input)))?;
        if !source.starts_with(&WEBM_MAGIC) {
            return Err(TranscodeError::Failed(format!(
                "{}: invalid data found when processing input",
                input
            )));
        }

        let converted = match target {
            MediaFormat::Mp4 => {
                let mut out = MP4_FTYP.to_vec();
                out.extend_from_slice(&source);
                Bytes::from(out)
            }
            MediaFormat::Webm => source,
        };
        state.files.insert(output.to_string(), converted);
        Ok(())
    }

    async fn read_file(&mut self, name: &str) -> Result<Bytes, TranscodeError> {
        self.state
            .lock()
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| TranscodeError::Failed(format!("{}: no such file", name)))
    }

    async fn delete_file(&mut self, name: &str) -> Result<(), TranscodeError> {
        self.state
            .lock()
            .files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| TranscodeError::Failed(format!("{}: no such file", name)))
    }
}
