use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::models::artifact::{Artifact, MediaFormat};
use crate::models::config::CaptureConfiguration;
use crate::models::device::{CaptureRequest, DeviceDescriptor, SessionDiagnostics};
use crate::models::error::CaptureError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::models::state::RecordingState;
use crate::processing::chunk_buffer::ChunkBuffer;
use crate::traits::capture_source::{CaptureSource, ChunkEvent, ChunkReceiver};
use crate::traits::session_delegate::SessionDelegate;

/// Mutable session state shared with the chunk collector task.
struct SessionShared {
    state: RecordingState,
    buffer: ChunkBuffer,
    /// Capture failure reported by the collector, surfaced by the next session call.
    fault: Option<CaptureError>,
    diagnostics: SessionDiagnostics,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            buffer: ChunkBuffer::new(),
            fault: None,
            diagnostics: SessionDiagnostics::default(),
        }
    }
}

/// Recording lifecycle over one capture source.
///
/// Owns the source, the chunk buffer, and the finalized artifact. Every
/// lifecycle call takes `&mut self`, so start/stop calls on one session are
/// serialized by construction.
///
/// ```text
/// [CaptureSource] → chunk channel → [collector task] → [ChunkBuffer]
///                                                          ↓ stop + flush
///                                                     [Artifact] → transcode / deliver
/// ```
pub struct RecordingSession<S: CaptureSource> {
    source: S,
    config: CaptureConfiguration,
    format: MediaFormat,
    shared: Arc<Mutex<SessionShared>>,
    delegate: Option<Arc<dyn SessionDelegate>>,
    collector: Option<JoinHandle<()>>,
    result: Option<RecordingResult>,
}

impl<S: CaptureSource> RecordingSession<S> {
    pub fn new(source: S, config: CaptureConfiguration) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let format = config.format().unwrap_or(MediaFormat::Webm);

        Ok(Self {
            source,
            config,
            format,
            shared: Arc::new(Mutex::new(SessionShared::new())),
            delegate: None,
            collector: None,
            result: None,
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> RecordingState {
        self.shared.lock().state
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Device backing the live stream, if one is held.
    pub fn device(&self) -> Option<DeviceDescriptor> {
        self.source.device()
    }

    /// Container the next (or current) recording is produced in.
    pub fn format(&self) -> MediaFormat {
        self.format
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.shared.lock().diagnostics.clone()
    }

    /// Capture failure that reset the session and has not been surfaced yet.
    pub fn pending_error(&self) -> Option<CaptureError> {
        self.shared.lock().fault.clone()
    }

    /// Chunks currently buffered for the active recording.
    pub fn buffered_chunks(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.shared.lock().buffer.total_bytes()
    }

    /// The finalized recording, available in `Finalized` until `reset`.
    pub fn result(&self) -> Option<&RecordingResult> {
        self.result.as_ref()
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.result.as_ref().map(|r| &r.artifact)
    }

    /// Acquire a live stream. Transitions: idle → device_ready.
    ///
    /// `device_id` overrides the configured device. On failure the session
    /// stays idle and nothing is left acquired.
    pub async fn acquire(&mut self, device_id: Option<String>) -> Result<(), CaptureError> {
        let state = self.state();
        if !state.is_idle() {
            return Err(CaptureError::invalid_state("acquire a device", state));
        }

        // A fault from an earlier attempt is superseded by this new cycle.
        if let Some(stale) = self.shared.lock().fault.take() {
            log::debug!("discarding unreported capture error: {}", stale);
        }
        self.await_collector().await;

        let request = self.config.request_for(device_id);
        self.open_stream(&request).await?;
        self.set_state(RecordingState::DeviceReady);
        Ok(())
    }

    /// Replace the live stream with one from another device. Only legal in
    /// `device_ready`; a recording in progress must be stopped first.
    pub async fn switch_device(&mut self, device_id: impl Into<String>) -> Result<(), CaptureError> {
        let state = self.state();
        if state != RecordingState::DeviceReady {
            return Err(CaptureError::invalid_state("switch device", state));
        }

        let request = self.config.request_for(Some(device_id.into()));
        self.open_stream(&request).await?;
        self.set_state(RecordingState::DeviceReady);
        Ok(())
    }

    /// Turn the camera off: release the live stream.
    ///
    /// device_ready → idle. In `finalized` the device is released and the
    /// artifact kept. Rejected while recording.
    pub async fn release(&mut self) -> Result<(), CaptureError> {
        let state = self.state();
        if state.is_busy() {
            return Err(CaptureError::invalid_state("release the device", state));
        }

        self.source.stop().await;
        if state == RecordingState::DeviceReady {
            self.set_state(RecordingState::Idle);
        }
        Ok(())
    }

    /// Start recording. Transitions: device_ready → recording.
    ///
    /// Never acquires a device implicitly.
    pub async fn start_recording(&mut self) -> Result<(), CaptureError> {
        let state = self.state();
        if state != RecordingState::DeviceReady {
            return Err(CaptureError::invalid_state("start recording", state));
        }
        if !self.source.state().is_active() {
            let err = CaptureError::DeviceUnavailable("live stream is no longer active".into());
            return Err(self.fail(err).await);
        }

        self.shared.lock().buffer.begin();
        let receiver = match self
            .source
            .begin_recording(self.format, self.config.timeslice())
            .await
        {
            Ok(receiver) => receiver,
            Err(err) => return Err(self.fail(err).await),
        };

        self.set_state(RecordingState::Recording);
        self.collector = Some(tokio::spawn(collect_chunks(
            receiver,
            Arc::clone(&self.shared),
            self.delegate.clone(),
        )));

        log::info!("recording started ({})", self.format);
        Ok(())
    }

    /// Stop recording and finalize the artifact.
    /// Transitions: recording → stopping → finalized.
    ///
    /// Returns only after the source has delivered its last chunk.
    pub async fn stop_recording(&mut self) -> Result<RecordingResult, CaptureError> {
        // Checked and claimed under one lock: the collector may record a fault at any time.
        let fault = {
            let mut s = self.shared.lock();
            let fault = s.fault.take();
            if fault.is_none() {
                if s.state != RecordingState::Recording {
                    return Err(CaptureError::invalid_state("stop recording", s.state));
                }
                s.state = RecordingState::Stopping;
            }
            fault
        };
        if let Some(fault) = fault {
            self.release_after_fault().await;
            return Err(fault);
        }

        self.notify_state(RecordingState::Stopping);
        if let Err(err) = self.source.end_recording().await {
            return Err(self.fail(err).await);
        }

        // Flush: the collector exits once the source closes the chunk channel.
        self.await_collector().await;

        let fault = self.shared.lock().fault.take();
        if let Some(fault) = fault {
            self.release_after_fault().await;
            return Err(fault);
        }

        let (artifact, chunk_count, duration) = {
            let mut s = self.shared.lock();
            s.buffer.seal();
            let artifact = s.buffer.finalize(self.format)?;
            s.diagnostics.recordings_finalized += 1;
            (artifact, s.buffer.len(), s.buffer.elapsed())
        };

        let metadata = RecordingMetadata::new(&artifact, duration, chunk_count, self.source.device().as_ref());
        let result = RecordingResult {
            artifact,
            duration,
            chunk_count,
            metadata,
        };
        self.result = Some(result.clone());
        self.set_state(RecordingState::Finalized);

        if let Some(ref delegate) = self.delegate {
            delegate.on_finalized(&result);
        }
        Ok(result)
    }

    /// Start a new cycle. Transitions: finalized → idle.
    ///
    /// Clears the buffer, drops the finalized artifact and releases the device.
    pub async fn reset(&mut self) -> Result<(), CaptureError> {
        let state = self.state();
        if !(state.is_finalized() || state.is_idle()) {
            return Err(CaptureError::invalid_state("reset", state));
        }

        self.source.stop().await;
        self.await_collector().await;
        {
            let mut s = self.shared.lock();
            s.buffer.clear();
            s.fault = None;
        }
        self.result = None;
        if !state.is_idle() {
            self.set_state(RecordingState::Idle);
        }
        Ok(())
    }

    // --- Internal helpers ---

    fn set_state(&self, new_state: RecordingState) {
        self.shared.lock().state = new_state;
        self.notify_state(new_state);
    }

    fn notify_state(&self, new_state: RecordingState) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(new_state);
        }
    }

    async fn open_stream(&mut self, request: &CaptureRequest) -> Result<(), CaptureError> {
        log::info!(
            "acquiring capture device {} (audio: {})",
            request.device_id.as_deref().unwrap_or("<default>"),
            request.audio
        );
        match self.source.start(request).await {
            Ok(()) => {
                self.shared.lock().diagnostics.acquisitions += 1;
                self.format = self.negotiate_format();
                Ok(())
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Container to record in: the configured one if the source supports it.
    fn negotiate_format(&self) -> MediaFormat {
        let requested = self.config.format().unwrap_or(MediaFormat::Webm);
        if self.source.supports_mime(&self.config.mime_type) {
            return requested;
        }
        let fallback = self.source.default_format();
        log::warn!(
            "{} is not supported by the capture source, recording {} instead",
            self.config.mime_type,
            fallback
        );
        fallback
    }

    /// Reset to idle after a capture error: release the device, drop buffered data.
    async fn fail(&mut self, error: CaptureError) -> CaptureError {
        log::error!("capture failed: {}", error);

        self.source.stop().await;
        if let Some(handle) = self.collector.take() {
            handle.abort();
            let _ = handle.await;
        }
        {
            let mut s = self.shared.lock();
            s.buffer.clear();
            s.fault = None;
            s.diagnostics.capture_failures += 1;
        }
        self.result = None;
        self.set_state(RecordingState::Idle);

        if let Some(ref delegate) = self.delegate {
            delegate.on_error(&error);
        }
        error
    }

    /// Release what the collector could not after it reported a fault, and
    /// make sure the session ends up idle with nothing buffered.
    async fn release_after_fault(&mut self) {
        self.source.stop().await;
        self.await_collector().await;

        let previous = {
            let mut s = self.shared.lock();
            s.buffer.clear();
            std::mem::replace(&mut s.state, RecordingState::Idle)
        };
        self.result = None;
        if !previous.is_idle() {
            self.notify_state(RecordingState::Idle);
        }
    }

    async fn await_collector(&mut self) {
        if let Some(handle) = self.collector.take() {
            if let Err(e) = handle.await {
                log::error!("chunk collector task failed: {}", e);
            }
        }
    }
}

/// Append chunks in arrival order until the source closes the channel.
async fn collect_chunks(
    mut receiver: ChunkReceiver,
    shared: Arc<Mutex<SessionShared>>,
    delegate: Option<Arc<dyn SessionDelegate>>,
) {
    while let Some(event) = receiver.recv().await {
        match event {
            ChunkEvent::Data(data) => {
                let len = data.len() as u64;
                let appended = {
                    let mut s = shared.lock();
                    let appended = s.buffer.append(data).map(|chunk| chunk.cloned());
                    if let Ok(Some(_)) = appended {
                        s.diagnostics.chunks_received += 1;
                        s.diagnostics.bytes_received += len;
                    }
                    appended
                };
                match appended {
                    Ok(Some(chunk)) => {
                        if let Some(ref d) = delegate {
                            d.on_chunk(&chunk);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("dropping chunk: {}", e),
                }
            }
            ChunkEvent::Failed(error) => {
                record_fault(&shared, delegate.as_deref(), error);
                return;
            }
        }
    }

    // Closed without a stop request: the stream died underneath the recording.
    let still_recording = shared.lock().state == RecordingState::Recording;
    if still_recording {
        let error = CaptureError::StreamFailed("capture stream ended before the recording was stopped".into());
        record_fault(&shared, delegate.as_deref(), error);
    }
}

fn record_fault(shared: &Mutex<SessionShared>, delegate: Option<&dyn SessionDelegate>, error: CaptureError) {
    log::error!("capture failed mid-recording: {}", error);
    {
        let mut s = shared.lock();
        s.buffer.clear();
        s.fault = Some(error.clone());
        s.state = RecordingState::Idle;
        s.diagnostics.capture_failures += 1;
    }
    if let Some(d) = delegate {
        d.on_state_changed(RecordingState::Idle);
        d.on_error(&error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifact::MediaFormat;
    use crate::testing::{ScriptHandle, ScriptedSource};
    use bytes::Bytes;

    fn session() -> (RecordingSession<ScriptedSource>, ScriptHandle) {
        let (source, handle) = ScriptedSource::with_cameras();
        let session = RecordingSession::new(source, CaptureConfiguration::default()).unwrap();
        (session, handle)
    }

    async fn recording_session() -> (RecordingSession<ScriptedSource>, ScriptHandle) {
        let (mut session, handle) = session();
        session.acquire(Some("cam-1".into())).await.unwrap();
        session.start_recording().await.unwrap();
        (session, handle)
    }

    /// Let the collector task drain what has been emitted so far.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<RecordingState>>,
        errors: Mutex<Vec<CaptureError>>,
        chunks: Mutex<usize>,
        finalized: Mutex<usize>,
    }

    impl SessionDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: RecordingState) {
            self.states.lock().push(state);
        }

        fn on_chunk(&self, _chunk: &crate::processing::chunk_buffer::Chunk) {
            *self.chunks.lock() += 1;
        }

        fn on_error(&self, error: &CaptureError) {
            self.errors.lock().push(error.clone());
        }

        fn on_finalized(&self, _result: &RecordingResult) {
            *self.finalized.lock() += 1;
        }
    }

    #[tokio::test]
    async fn finalized_artifact_concatenates_chunks_in_order() {
        let (mut session, handle) = recording_session().await;

        let a = Bytes::from(vec![b'A'; 12]);
        let b = Bytes::from(vec![b'B'; 8]);
        let c = Bytes::from(vec![b'C'; 5]);
        assert!(handle.emit(a.clone()));
        assert!(handle.emit(b.clone()));
        assert!(handle.emit(c.clone()));

        let result = session.stop_recording().await.unwrap();

        assert_eq!(session.state(), RecordingState::Finalized);
        assert_eq!(result.artifact.len(), 25);
        assert_eq!(result.artifact.mime_type(), "video/webm");
        assert_eq!(result.chunk_count, 3);
        let expected: Vec<u8> = [a, b, c].concat();
        assert_eq!(result.artifact.data().as_ref(), expected.as_slice());
        assert_eq!(session.artifact(), Some(&result.artifact));
        assert_eq!(result.metadata.device_id.as_deref(), Some("cam-1"));
    }

    #[tokio::test]
    async fn finalize_waits_for_final_chunk() {
        let (mut session, handle) = recording_session().await;
        handle.emit(Bytes::from_static(b"first"));
        handle.set_final_chunk(Bytes::from_static(b"-last"));

        let result = session.stop_recording().await.unwrap();

        assert_eq!(result.artifact.data().as_ref(), b"first-last");
        assert_eq!(result.chunk_count, 2);
    }

    #[tokio::test]
    async fn stop_before_any_chunk_yields_empty_artifact() {
        let (mut session, _handle) = recording_session().await;

        let result = session.stop_recording().await.unwrap();

        assert_eq!(session.state(), RecordingState::Finalized);
        assert!(result.artifact.is_empty());
        assert_eq!(result.artifact.format(), MediaFormat::Webm);
    }

    #[tokio::test]
    async fn stop_with_only_final_chunk_still_captures_it() {
        let (mut session, handle) = recording_session().await;
        handle.set_final_chunk(Bytes::from_static(b"tail"));

        let result = session.stop_recording().await.unwrap();
        assert_eq!(result.artifact.data().as_ref(), b"tail");
    }

    #[tokio::test]
    async fn switch_device_while_recording_is_rejected() {
        let (mut session, handle) = recording_session().await;
        handle.emit(Bytes::from_static(b"abc"));
        settle().await;

        let err = session.switch_device("cam-2").await.unwrap_err();

        assert!(matches!(err, CaptureError::InvalidState(_)));
        assert_eq!(session.state(), RecordingState::Recording);
        assert_eq!(session.buffered_bytes(), 3);
        assert_eq!(session.device().unwrap().id, "cam-1");

        handle.emit(Bytes::from_static(b"def"));
        let result = session.stop_recording().await.unwrap();
        assert_eq!(result.artifact.data().as_ref(), b"abcdef");
    }

    #[tokio::test]
    async fn switch_device_when_ready_releases_previous_stream() {
        let (mut session, handle) = session();
        session.acquire(None).await.unwrap();
        assert_eq!(session.device().unwrap().id, "cam-1");

        session.switch_device("cam-2").await.unwrap();

        assert_eq!(session.state(), RecordingState::DeviceReady);
        assert_eq!(session.device().unwrap().id, "cam-2");
        assert_eq!(handle.active_leases(), 1);
        assert_eq!(handle.peak_leases(), 1);
    }

    #[tokio::test]
    async fn failed_switch_leaves_session_idle() {
        let (mut session, handle) = session();
        session.acquire(None).await.unwrap();

        let err = session.switch_device("missing").await.unwrap_err();

        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(handle.active_leases(), 0);
    }

    #[tokio::test]
    async fn reset_isolates_recording_cycles() {
        let (mut session, handle) = recording_session().await;
        handle.emit(Bytes::from_static(b"old-cycle"));
        session.stop_recording().await.unwrap();

        session.reset().await.unwrap();
        assert_eq!(session.state(), RecordingState::Idle);
        assert!(session.artifact().is_none());
        assert_eq!(handle.active_leases(), 0);

        session.acquire(None).await.unwrap();
        session.start_recording().await.unwrap();
        handle.emit(Bytes::from_static(b"new"));
        let result = session.stop_recording().await.unwrap();

        assert_eq!(result.artifact.data().as_ref(), b"new");
    }

    #[tokio::test]
    async fn start_without_device_is_invalid() {
        let (mut session, handle) = session();

        let err = session.start_recording().await.unwrap_err();

        assert!(matches!(err, CaptureError::InvalidState(_)));
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(handle.start_count(), 0);
    }

    #[tokio::test]
    async fn stop_without_start_is_invalid_and_harmless() {
        let (mut session, _handle) = session();
        session.acquire(None).await.unwrap();

        let err = session.stop_recording().await.unwrap_err();

        assert!(matches!(err, CaptureError::InvalidState(_)));
        assert_eq!(session.state(), RecordingState::DeviceReady);
    }

    #[tokio::test]
    async fn denied_acquisition_leaves_session_idle() {
        let (mut session, handle) = session();
        let delegate = Arc::new(RecordingDelegate::default());
        session.set_delegate(delegate.clone());
        handle.fail_next_acquire(CaptureError::PermissionDenied("user dismissed the prompt".into()));

        let err = session.acquire(None).await.unwrap_err();

        assert!(err.is_acquisition_failure());
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(handle.active_leases(), 0);
        assert!(session.device().is_none());
        assert_eq!(delegate.errors.lock().len(), 1);

        // Retry after permission is granted.
        session.acquire(None).await.unwrap();
        assert_eq!(session.state(), RecordingState::DeviceReady);
    }

    #[tokio::test]
    async fn acquire_twice_is_invalid() {
        let (mut session, handle) = session();
        session.acquire(None).await.unwrap();

        let err = session.acquire(Some("cam-2".into())).await.unwrap_err();

        assert!(matches!(err, CaptureError::InvalidState(_)));
        assert_eq!(handle.start_count(), 1);
        assert_eq!(session.device().unwrap().id, "cam-1");
    }

    #[tokio::test]
    async fn capture_failure_mid_recording_discards_buffer() {
        let (mut session, handle) = session();
        let delegate = Arc::new(RecordingDelegate::default());
        session.set_delegate(delegate.clone());
        session.acquire(None).await.unwrap();
        session.start_recording().await.unwrap();
        handle.emit(Bytes::from_static(b"partial"));
        handle.fail(CaptureError::StreamFailed("device unplugged".into()));
        settle().await;

        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(session.buffered_bytes(), 0);
        assert!(session.pending_error().is_some());

        let err = session.stop_recording().await.unwrap_err();
        assert_eq!(err, CaptureError::StreamFailed("device unplugged".into()));
        assert_eq!(handle.active_leases(), 0);
        assert!(session.pending_error().is_none());
        assert_eq!(delegate.errors.lock().len(), 1);

        // The next cycle starts clean.
        session.acquire(None).await.unwrap();
        session.start_recording().await.unwrap();
        handle.emit(Bytes::from_static(b"fresh"));
        let result = session.stop_recording().await.unwrap();
        assert_eq!(result.artifact.data().as_ref(), b"fresh");
    }

    #[tokio::test]
    async fn stream_closing_without_stop_is_a_failure() {
        let (mut session, handle) = recording_session().await;
        handle.emit(Bytes::from_static(b"abc"));
        handle.disconnect();
        settle().await;

        assert_eq!(session.state(), RecordingState::Idle);
        assert!(matches!(session.stop_recording().await, Err(CaptureError::StreamFailed(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fault_racing_stop_always_ends_idle() {
        let (mut session, handle) = session();
        for round in 0..200 {
            session.acquire(None).await.unwrap();
            session.start_recording().await.unwrap();
            handle.emit(Bytes::from_static(b"partial"));
            assert!(handle.fail(CaptureError::StreamFailed("unplugged".into())));

            let err = session.stop_recording().await.unwrap_err();

            assert_eq!(err, CaptureError::StreamFailed("unplugged".into()), "round {}", round);
            assert_eq!(session.state(), RecordingState::Idle, "round {}", round);
            assert_eq!(session.buffered_bytes(), 0);
            assert_eq!(handle.active_leases(), 0);
        }

        session.acquire(None).await.unwrap();
        session.start_recording().await.unwrap();
        handle.emit(Bytes::from_static(b"clean"));
        let result = session.stop_recording().await.unwrap();
        assert_eq!(result.artifact.data().as_ref(), b"clean");
    }

    #[tokio::test]
    async fn failure_while_flushing_resets_to_idle() {
        let (mut session, handle) = session();
        let delegate = Arc::new(RecordingDelegate::default());
        session.set_delegate(delegate.clone());
        session.acquire(None).await.unwrap();
        session.start_recording().await.unwrap();
        handle.emit(Bytes::from_static(b"partial"));
        settle().await;
        assert_eq!(session.buffered_chunks(), 1);
        handle.fail_during_flush(CaptureError::StreamFailed("muxer crashed".into()));

        let err = session.stop_recording().await.unwrap_err();

        assert_eq!(err, CaptureError::StreamFailed("muxer crashed".into()));
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(session.buffered_chunks(), 0);
        assert_eq!(session.buffered_bytes(), 0);
        assert_eq!(handle.active_leases(), 0);
        assert!(session.artifact().is_none());
        assert_eq!(delegate.states.lock().last(), Some(&RecordingState::Idle));
        assert_eq!(delegate.errors.lock().len(), 1);

        session.acquire(None).await.unwrap();
        session.start_recording().await.unwrap();
        handle.emit(Bytes::from_static(b"next"));
        let result = session.stop_recording().await.unwrap();
        assert_eq!(result.artifact.data().as_ref(), b"next");
    }

    #[tokio::test]
    async fn failed_end_recording_resets_to_idle() {
        let (mut session, handle) = recording_session().await;
        handle.emit(Bytes::from_static(b"partial"));
        settle().await;
        handle.fail_next_end(CaptureError::StreamFailed("encoder did not respond".into()));

        let err = session.stop_recording().await.unwrap_err();

        assert_eq!(err, CaptureError::StreamFailed("encoder did not respond".into()));
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(session.buffered_bytes(), 0);
        assert_eq!(handle.active_leases(), 0);
        assert!(session.pending_error().is_none());

        session.acquire(None).await.unwrap();
        session.start_recording().await.unwrap();
        handle.emit(Bytes::from_static(b"next"));
        let result = session.stop_recording().await.unwrap();
        assert_eq!(result.artifact.data().as_ref(), b"next");
    }

    #[tokio::test]
    async fn release_turns_camera_off() {
        let (mut session, handle) = session();
        session.acquire(None).await.unwrap();

        session.release().await.unwrap();
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(handle.active_leases(), 0);

        // Idempotent.
        session.release().await.unwrap();
    }

    #[tokio::test]
    async fn release_while_recording_is_rejected() {
        let (mut session, handle) = recording_session().await;

        assert!(matches!(session.release().await, Err(CaptureError::InvalidState(_))));
        assert_eq!(handle.active_leases(), 1);
        assert_eq!(session.state(), RecordingState::Recording);
    }

    #[tokio::test]
    async fn unsupported_container_falls_back_to_source_default() {
        let (source, handle) = ScriptedSource::with_cameras();
        handle.set_supported_formats(vec![MediaFormat::Mp4]);
        let mut session = RecordingSession::new(source, CaptureConfiguration::default()).unwrap();

        session.acquire(None).await.unwrap();
        session.start_recording().await.unwrap();

        assert_eq!(handle.recording_format(), Some(MediaFormat::Mp4));
        let result = session.stop_recording().await.unwrap();
        assert_eq!(result.artifact.mime_type(), "video/mp4");
    }

    #[tokio::test]
    async fn delegate_sees_full_lifecycle() {
        let (mut session, handle) = session();
        let delegate = Arc::new(RecordingDelegate::default());
        session.set_delegate(delegate.clone());

        session.acquire(None).await.unwrap();
        session.start_recording().await.unwrap();
        handle.emit(Bytes::from_static(b"x"));
        session.stop_recording().await.unwrap();
        session.reset().await.unwrap();

        assert_eq!(
            *delegate.states.lock(),
            vec![
                RecordingState::DeviceReady,
                RecordingState::Recording,
                RecordingState::Stopping,
                RecordingState::Finalized,
                RecordingState::Idle,
            ]
        );
        assert_eq!(*delegate.chunks.lock(), 1);
        assert_eq!(*delegate.finalized.lock(), 1);
    }

    #[tokio::test]
    async fn diagnostics_count_chunks_and_recordings() {
        let (mut session, handle) = recording_session().await;
        handle.emit(Bytes::from_static(b"1234"));
        handle.emit(Bytes::new());
        handle.emit(Bytes::from_static(b"56"));
        session.stop_recording().await.unwrap();

        let diagnostics = session.diagnostics();
        assert_eq!(diagnostics.acquisitions, 1);
        assert_eq!(diagnostics.chunks_received, 2);
        assert_eq!(diagnostics.bytes_received, 6);
        assert_eq!(diagnostics.recordings_finalized, 1);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let (source, _handle) = ScriptedSource::with_cameras();
        let config = CaptureConfiguration {
            timeslice_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            RecordingSession::new(source, config),
            Err(CaptureError::ConfigurationFailed(_))
        ));
    }
}
