//! # media-capture-ffmpeg
//!
//! ffmpeg backend for media-capture-kit.
//!
//! Provides:
//! - `FfmpegCaptureSource`: camera + microphone capture through an ffmpeg child process
//! - `V4l2DeviceEnumerator` / `FfmpegDeviceEnumerator`: device listing (sysfs, avfoundation, dshow)
//! - `FfmpegRuntime`: `TranscoderRuntime` running ffmpeg over a private working directory
//! - `permissions`: device node access checks
//!
//! ## Platform Requirements
//! - `ffmpeg` on PATH (or configured via `FfmpegConfig::ffmpeg_path`) built with
//!   libvpx, libopus and libx264
//! - Linux: read access to `/dev/video*`; audio comes from the first ALSA card or a
//!   configured PulseAudio source
//!
//! ## Usage
//! ```ignore
//! use media_capture_core::{CaptureConfiguration, RecordingSession};
//! use media_capture_ffmpeg::{FfmpegCaptureSource, FfmpegConfig, V4l2DeviceEnumerator};
//!
//! let source = FfmpegCaptureSource::new(FfmpegConfig::default(), V4l2DeviceEnumerator::new());
//! let mut session = RecordingSession::new(source, CaptureConfiguration::default())?;
//! session.acquire(None).await?;
//! session.start_recording().await?;
//! ```

pub mod capture;
pub mod device_enumerator;
pub mod permissions;
pub mod process;
pub mod transcoder;

pub use capture::{build_capture_args, FfmpegCaptureSource, FfmpegConfig, InputFormat};
pub use device_enumerator::{FfmpegDeviceEnumerator, V4l2DeviceEnumerator};
pub use transcoder::FfmpegRuntime;
