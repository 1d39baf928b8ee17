//! `TranscoderRuntime` over the ffmpeg command line.
//!
//! Working files live in a private temporary directory created on load and
//! removed when the runtime is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;

use media_capture_core::models::artifact::MediaFormat;
use media_capture_core::models::error::TranscodeError;
use media_capture_core::processing::filename::is_plain_file_name;
use media_capture_core::traits::transcoder::TranscoderRuntime;

use crate::process::{stderr_tail, tokio_command};

/// Encoder arguments producing `target` from any input ffmpeg can decode.
pub fn build_transcode_args(input: &Path, output: &Path, target: MediaFormat) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(input.to_string_lossy().into_owned());

    let encode: &[&str] = match target {
        MediaFormat::Mp4 => &[
            "-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-pix_fmt", "yuv420p",
            "-c:a", "aac", "-b:a", "128k", "-movflags", "+faststart",
        ],
        MediaFormat::Webm => &["-c:v", "libvpx-vp9", "-crf", "32", "-b:v", "0", "-c:a", "libopus"],
    };
    args.extend(encode.iter().map(|s| s.to_string()));
    args.push(output.to_string_lossy().into_owned());
    args
}

/// ffmpeg-backed transcoder runtime.
pub struct FfmpegRuntime {
    ffmpeg_path: PathBuf,
    workdir: Option<TempDir>,
}

impl FfmpegRuntime {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            workdir: None,
        }
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, TranscodeError> {
        if !is_plain_file_name(name) {
            return Err(TranscodeError::Failed(format!("invalid working file name: {:?}", name)));
        }
        let dir = self
            .workdir
            .as_ref()
            .ok_or_else(|| TranscodeError::Init("transcoder runtime is not loaded".into()))?;
        Ok(dir.path().join(name))
    }
}

impl Default for FfmpegRuntime {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl TranscoderRuntime for FfmpegRuntime {
    async fn load(&mut self) -> Result<(), TranscodeError> {
        let output = tokio_command(&self.ffmpeg_path)
            .args(["-hide_banner", "-version"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| TranscodeError::Init(format!("cannot run {}: {}", self.ffmpeg_path.display(), e)))?;
        if !output.status.success() {
            return Err(TranscodeError::Init(stderr_tail(&output.stderr)));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        log::info!("using {}", version.lines().next().unwrap_or("ffmpeg"));

        let workdir = tempfile::Builder::new()
            .prefix("media-transcode-")
            .tempdir()
            .map_err(|e| TranscodeError::Init(format!("cannot create working directory: {}", e)))?;
        self.workdir = Some(workdir);
        Ok(())
    }

    async fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), TranscodeError> {
        let path = self.path_of(name)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| TranscodeError::Failed(format!("cannot write {}: {}", name, e)))
    }

    async fn run(&mut self, input: &str, output: &str, target: MediaFormat) -> Result<(), TranscodeError> {
        let args = build_transcode_args(&self.path_of(input)?, &self.path_of(output)?, target);
        log::debug!("running {} {}", self.ffmpeg_path.display(), args.join(" "));

        let result = tokio_command(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .output()
            .await
            .map_err(|e| TranscodeError::Failed(format!("cannot run {}: {}", self.ffmpeg_path.display(), e)))?;
        if !result.status.success() {
            return Err(TranscodeError::Failed(stderr_tail(&result.stderr)));
        }
        Ok(())
    }

    async fn read_file(&mut self, name: &str) -> Result<Bytes, TranscodeError> {
        let path = self.path_of(name)?;
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| TranscodeError::Failed(format!("cannot read {}: {}", name, e)))
    }

    async fn delete_file(&mut self, name: &str) -> Result<(), TranscodeError> {
        let path = self.path_of(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| TranscodeError::Failed(format!("cannot delete {}: {}", name, e)))
    }
}
