//! Camera and microphone capture through an ffmpeg child process.
//!
//! `start` resolves and checks the device; the ffmpeg process itself is
//! spawned by `begin_recording` and muxes into a pipe. A pump task slices
//! stdout into chunks every timeslice. Stopping writes `q` to ffmpeg's stdin
//! so it finalizes the container; the pump forwards the trailing bytes and
//! then closes the chunk channel.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use media_capture_core::models::artifact::MediaFormat;
use media_capture_core::models::device::{CaptureRequest, DeviceDescriptor, DeviceKind, FacingMode};
use media_capture_core::models::error::CaptureError;
use media_capture_core::models::state::SourceState;
use media_capture_core::traits::capture_source::{chunk_channel, CaptureSource, ChunkEvent, ChunkReceiver, ChunkSender};
use media_capture_core::traits::device_enumerator::DeviceEnumerator;

use crate::permissions;
use crate::process::{classify_capture_failure, tokio_command};

/// How long ffmpeg gets to finalize the container after `q` before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(5);

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// ffmpeg capture input device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Video4Linux2 (Linux).
    V4l2,
    /// AVFoundation (macOS).
    AvFoundation,
    /// DirectShow (Windows).
    Dshow,
}

impl InputFormat {
    /// Input family of the platform this binary was built for.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::AvFoundation
        } else if cfg!(target_os = "windows") {
            Self::Dshow
        } else {
            Self::V4l2
        }
    }

    pub fn as_ffmpeg(&self) -> &'static str {
        match self {
            Self::V4l2 => "v4l2",
            Self::AvFoundation => "avfoundation",
            Self::Dshow => "dshow",
        }
    }
}

impl Default for InputFormat {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// ffmpeg capture settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// ffmpeg executable (default: `ffmpeg` on PATH).
    pub ffmpeg_path: PathBuf,

    pub input_format: InputFormat,

    /// Requested frame size such as `1280x720`, or None for the device default.
    pub video_size: Option<String>,

    /// Requested frame rate, or None for the device default.
    pub framerate: Option<u32>,

    /// PulseAudio source to record on Linux instead of the first listed ALSA card.
    pub pulse_source: Option<String>,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            input_format: InputFormat::platform_default(),
            video_size: None,
            framerate: None,
            pulse_source: None,
        }
    }
}

/// Build the ffmpeg argument list for recording `video` (and optionally
/// `audio`) into `format` on stdout.
pub fn build_capture_args(
    config: &FfmpegConfig,
    video: &DeviceDescriptor,
    audio: Option<&DeviceDescriptor>,
    format: MediaFormat,
) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error"].iter().map(|s| s.to_string()).collect();

    args.push("-f".into());
    args.push(config.input_format.as_ffmpeg().into());
    if let Some(rate) = config.framerate {
        args.push("-framerate".into());
        args.push(rate.to_string());
    }
    if let Some(ref size) = config.video_size {
        args.push("-video_size".into());
        args.push(size.clone());
    }

    match config.input_format {
        InputFormat::V4l2 => {
            args.push("-i".into());
            args.push(video.id.clone());
            if let Some(a) = audio {
                let backend = if config.pulse_source.is_some() { "pulse" } else { "alsa" };
                args.extend(["-f".into(), backend.into(), "-i".into(), a.id.clone()]);
            }
        }
        InputFormat::AvFoundation => {
            let audio_index = audio.map(|a| a.id.as_str()).unwrap_or("none");
            args.push("-i".into());
            args.push(format!("{}:{}", video.id, audio_index));
        }
        InputFormat::Dshow => {
            let mut input = format!("video={}", video.id);
            if let Some(a) = audio {
                input.push_str(&format!(":audio={}", a.id));
            }
            args.push("-i".into());
            args.push(input);
        }
    }

    let encode: &[&str] = match format {
        MediaFormat::Webm => &[
            "-c:v", "libvpx-vp9", "-deadline", "realtime", "-cpu-used", "8", "-b:v", "2M",
            "-c:a", "libopus", "-f", "webm",
        ],
        MediaFormat::Mp4 => &[
            "-c:v", "libx264", "-preset", "ultrafast", "-tune", "zerolatency", "-pix_fmt", "yuv420p",
            "-c:a", "aac", "-movflags", "frag_keyframe+empty_moov+default_base_moof", "-f", "mp4",
        ],
    };
    args.extend(encode.iter().map(|s| s.to_string()));
    if audio.is_none() {
        args.push("-an".into());
    }
    args.push("pipe:1".into());
    args
}

/// State shared between the source and its pump task.
struct PumpControl {
    stopping: AtomicBool,
    kill: Notify,
    last_error: Mutex<Option<String>>,
}

/// The ffmpeg process of the recording in progress.
struct ActiveRecording {
    stdin: Option<ChildStdin>,
    control: Arc<PumpControl>,
    pump: JoinHandle<()>,
}

/// Capture source backed by an ffmpeg child process.
pub struct FfmpegCaptureSource<E: DeviceEnumerator> {
    config: FfmpegConfig,
    enumerator: E,
    state: SourceState,
    video: Option<DeviceDescriptor>,
    audio: Option<DeviceDescriptor>,
    recording: Option<ActiveRecording>,
}

impl<E: DeviceEnumerator> FfmpegCaptureSource<E> {
    pub fn new(config: FfmpegConfig, enumerator: E) -> Self {
        Self {
            config,
            enumerator,
            state: SourceState::Idle,
            video: None,
            audio: None,
            recording: None,
        }
    }

    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }

    /// Resolve the requested camera and, when audio is enabled, the default microphone.
    async fn resolve(&self, request: &CaptureRequest) -> Result<(DeviceDescriptor, Option<DeviceDescriptor>), CaptureError> {
        if request.facing == FacingMode::Environment {
            return Err(CaptureError::ConstraintNotSatisfiable(
                "desktop capture devices do not report an environment-facing camera".into(),
            ));
        }

        let devices = self.enumerator.list_devices().await?;
        let video = match request.device_id {
            Some(ref id) => devices.iter().find(|d| d.kind == DeviceKind::Video && &d.id == id),
            None => devices
                .iter()
                .find(|d| d.kind == DeviceKind::Video && d.is_default)
                .or_else(|| devices.iter().find(|d| d.kind == DeviceKind::Video)),
        }
        .cloned()
        .ok_or_else(|| match request.device_id {
            Some(ref id) => CaptureError::DeviceUnavailable(format!("no camera with id {}", id)),
            None => CaptureError::DeviceUnavailable("no camera found".into()),
        })?;

        let audio = match (request.audio, &self.config.pulse_source) {
            (false, _) => None,
            (true, Some(pulse)) if self.config.input_format == InputFormat::V4l2 => {
                Some(DeviceDescriptor::audio(pulse, "PulseAudio source"))
            }
            (true, _) => {
                let mic = devices.iter().find(|d| d.kind == DeviceKind::Audio).cloned();
                if mic.is_none() {
                    log::warn!("no microphone found, recording video only");
                }
                mic
            }
        };

        Ok((video, audio))
    }

    /// Kill the recording's ffmpeg process, if any, and wait for its pump to finish.
    async fn kill_recording(&mut self) {
        let Some(recording) = self.recording.take() else {
            return;
        };
        recording.control.stopping.store(true, Ordering::SeqCst);
        recording.control.kill.notify_one();
        if let Err(e) = recording.pump.await {
            log::error!("capture pump task failed: {}", e);
        }
    }
}

#[async_trait]
impl<E: DeviceEnumerator + 'static> CaptureSource for FfmpegCaptureSource<E> {
    fn state(&self) -> SourceState {
        self.state
    }

    fn device(&self) -> Option<DeviceDescriptor> {
        self.video.clone()
    }

    fn supports_mime(&self, mime: &str) -> bool {
        MediaFormat::from_mime(mime).is_some()
    }

    fn default_format(&self) -> MediaFormat {
        MediaFormat::Webm
    }

    async fn start(&mut self, request: &CaptureRequest) -> Result<(), CaptureError> {
        self.stop().await;
        self.state = SourceState::Acquiring;

        let resolved = self.resolve(request).await;
        let (video, audio) = match resolved {
            Ok(devices) => devices,
            Err(e) => {
                self.state = SourceState::Idle;
                return Err(e);
            }
        };
        if permissions::is_device_node(&video.id) {
            if let Err(e) = permissions::check_device_access(std::path::Path::new(&video.id)).await {
                self.state = SourceState::Idle;
                return Err(e);
            }
        }

        log::info!("capture device ready: {} ({})", video.label, video.id);
        self.video = Some(video);
        self.audio = audio;
        self.state = SourceState::Active;
        Ok(())
    }

    async fn stop(&mut self) {
        self.kill_recording().await;
        if self.state.is_active() {
            log::info!("released capture device");
            self.state = SourceState::Stopped;
        }
        self.video = None;
        self.audio = None;
    }

    async fn begin_recording(&mut self, format: MediaFormat, timeslice: Duration) -> Result<ChunkReceiver, CaptureError> {
        let Some(ref video) = self.video else {
            return Err(CaptureError::InvalidState("no live stream to record".into()));
        };
        if let Some(previous) = self.recording.take() {
            if !previous.pump.is_finished() {
                self.recording = Some(previous);
                return Err(CaptureError::InvalidState("a recording is already running".into()));
            }
        }

        let args = build_capture_args(&self.config, video, self.audio.as_ref(), format);
        log::debug!("spawning {} {}", self.config.ffmpeg_path.display(), args.join(" "));

        let mut child = tokio_command(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CaptureError::StreamFailed(format!("failed to start {}: {}", self.config.ffmpeg_path.display(), e))
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(CaptureError::StreamFailed("ffmpeg pipes unavailable".into()));
        };
        let stdin = child.stdin.take();

        let control = Arc::new(PumpControl {
            stopping: AtomicBool::new(false),
            kill: Notify::new(),
            last_error: Mutex::new(None),
        });
        let (tx, rx) = chunk_channel();
        tokio::spawn(drain_stderr(stderr, Arc::clone(&control)));
        let pump = tokio::spawn(pump_chunks(child, stdout, tx, timeslice, Arc::clone(&control)));

        self.recording = Some(ActiveRecording { stdin, control, pump });
        log::info!("ffmpeg recording started ({}, {:?} chunks)", format, timeslice);
        Ok(rx)
    }

    async fn end_recording(&mut self) -> Result<(), CaptureError> {
        let Some(recording) = self.recording.as_mut() else {
            return Err(CaptureError::InvalidState("no recording in progress".into()));
        };
        recording.control.stopping.store(true, Ordering::SeqCst);

        // `q` asks ffmpeg to finish the container; the pump forwards what it writes.
        if let Some(mut stdin) = recording.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").await {
                log::warn!("could not signal ffmpeg to stop: {}", e);
                recording.control.kill.notify_one();
            }
            let _ = stdin.shutdown().await;
        }

        // The pump closes the chunk channel once ffmpeg exits.
        let control = Arc::clone(&recording.control);
        tokio::spawn(async move {
            tokio::time::sleep(STOP_GRACE).await;
            control.kill.notify_one();
        });
        Ok(())
    }
}

/// Forward ffmpeg's stdout as chunks, one per `timeslice`.
async fn pump_chunks(
    mut child: Child,
    mut stdout: ChildStdout,
    tx: ChunkSender,
    timeslice: Duration,
    control: Arc<PumpControl>,
) {
    let mut pending = BytesMut::new();
    let mut read_buf = vec![0u8; READ_BUFFER_SIZE];
    let mut ticker = tokio::time::interval(timeslice);
    ticker.tick().await;

    let killed = loop {
        tokio::select! {
            read = stdout.read(&mut read_buf) => match read {
                Ok(0) => break false,
                Ok(n) => pending.extend_from_slice(&read_buf[..n]),
                Err(e) => {
                    log::error!("reading ffmpeg output failed: {}", e);
                    break false;
                }
            },
            _ = ticker.tick() => {
                if !pending.is_empty() && tx.send(ChunkEvent::Data(pending.split().freeze())).is_err() {
                    log::debug!("chunk receiver dropped, stopping ffmpeg");
                    break true;
                }
            }
            _ = control.kill.notified() => break true,
        }
    };

    if killed {
        if let Err(e) = child.kill().await {
            log::warn!("failed to kill ffmpeg: {}", e);
        }
    }
    let status = child.wait().await;

    if !pending.is_empty() {
        let _ = tx.send(ChunkEvent::Data(pending.freeze()));
    }

    let stopping = control.stopping.load(Ordering::SeqCst);
    match status {
        Ok(status) if status.success() || stopping => {
            log::debug!("ffmpeg exited with {}", status);
        }
        Ok(status) => {
            let line = control
                .last_error
                .lock()
                .clone()
                .unwrap_or_else(|| format!("ffmpeg exited with {}", status));
            let _ = tx.send(ChunkEvent::Failed(classify_capture_failure(&line)));
        }
        Err(e) => {
            let _ = tx.send(ChunkEvent::Failed(CaptureError::StreamFailed(format!(
                "waiting for ffmpeg failed: {}",
                e
            ))));
        }
    }
}

/// Log ffmpeg's stderr and keep the last line for error reporting.
async fn drain_stderr(stderr: ChildStderr, control: Arc<PumpControl>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        log::debug!("ffmpeg: {}", line);
        *control.last_error.lock() = Some(line);
    }
}
