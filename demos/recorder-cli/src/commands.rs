use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use media_capture_core::storage::metadata::write_metadata;
use media_capture_core::{
    Artifact, CaptureConfiguration, DeliverySink, DeviceEnumerator, LocalSaveSink, MediaFormat, RecordingMetadata,
    RecordingResult, RecordingSession, TranscodePipeline, Transcoder, UploadConfig, UploadSink,
};
use media_capture_ffmpeg::{FfmpegCaptureSource, FfmpegConfig, FfmpegDeviceEnumerator, FfmpegRuntime, InputFormat};

use crate::console::{ConsoleDelegate, DeviceInfo, RecordingInfo};

/// Environment variable holding the upload access token.
const UPLOAD_TOKEN_ENV: &str = "MEDIA_CAPTURE_UPLOAD_TOKEN";

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Stop automatically after this many seconds (Ctrl-C stops earlier).
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Camera id from `devices` (defaults to the first camera).
    #[arg(long)]
    device: Option<String>,

    /// Record video only.
    #[arg(long)]
    no_audio: bool,

    /// Convert the recording to MP4 before saving.
    #[arg(long)]
    mp4: bool,

    /// Also upload the saved file.
    #[arg(long)]
    upload: bool,

    /// Remote directory for uploads.
    #[arg(long, default_value = "/recordings")]
    upload_dir: String,

    /// Directory recordings are saved to.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Chunk interval in milliseconds.
    #[arg(long)]
    timeslice_ms: Option<u64>,

    /// JSON capture configuration; command-line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame size such as 1280x720.
    #[arg(long)]
    video_size: Option<String>,
}

fn recordings_dir() -> PathBuf {
    dirs_next::video_dir()
        .or_else(dirs_next::document_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("MediaCaptureKit Recordings")
}

pub async fn list_devices(ffmpeg: &Path, input: InputFormat, json: bool) -> anyhow::Result<()> {
    let enumerator = FfmpegDeviceEnumerator::new(ffmpeg, input);
    let devices: Vec<DeviceInfo> = enumerator
        .list_devices()
        .await
        .context("listing capture devices")?
        .into_iter()
        .map(DeviceInfo::from)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("no capture devices found");
    }
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!("{} {:<5} {:<24} {}", marker, format!("{:?}", device.kind).to_lowercase(), device.id, device.name);
    }
    Ok(())
}

pub async fn record(ffmpeg: &Path, input: InputFormat, args: RecordArgs) -> anyhow::Result<()> {
    // Fail before touching the camera if the upload cannot happen.
    let uploader = if args.upload {
        let token = std::env::var(UPLOAD_TOKEN_ENV).with_context(|| format!("{} is not set", UPLOAD_TOKEN_ENV))?;
        let config = UploadConfig {
            target_dir: args.upload_dir.clone(),
            access_token: token,
            ..Default::default()
        };
        Some(UploadSink::new(config)?)
    } else {
        None
    };

    let ffmpeg_config = FfmpegConfig {
        ffmpeg_path: ffmpeg.to_path_buf(),
        input_format: input,
        video_size: args.video_size.clone(),
        ..Default::default()
    };
    let source = FfmpegCaptureSource::new(ffmpeg_config, FfmpegDeviceEnumerator::new(ffmpeg, input));
    let config = capture_config(&args).await?;

    let mut session = RecordingSession::new(source, config)?;
    session.set_delegate(Arc::new(ConsoleDelegate));

    session.acquire(None).await.context("opening camera")?;
    session.start_recording().await.context("starting recording")?;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.seconds)) => {}
        _ = tokio::signal::ctrl_c() => log::info!("interrupted, stopping"),
    }

    let result = session.stop_recording().await.context("stopping recording")?;
    session.release().await?;

    let (artifact, metadata) = if args.mp4 {
        convert_to_mp4(ffmpeg, &result).await
    } else {
        (result.artifact.clone(), result.metadata.clone())
    };

    let sink = LocalSaveSink::new(args.output.clone().unwrap_or_else(recordings_dir));
    let receipt = sink.deliver_timestamped(&artifact).await.context("saving recording")?;
    let saved = PathBuf::from(&receipt.location);
    write_metadata(&metadata, &saved).await.context("writing metadata")?;

    let uploaded_to = match uploader {
        Some(uploader) => {
            let file_name = saved
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("saved file has no name")?;
            match uploader.deliver(&artifact, &file_name).await {
                Ok(remote) => Some(remote.location),
                Err(e) => {
                    // The local copy is already saved; report and keep going.
                    log::error!("upload failed: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    session.reset().await?;

    let info = RecordingInfo {
        file_path: receipt.location,
        mime_type: artifact.mime_type().to_string(),
        size_bytes: receipt.bytes,
        duration_secs: result.duration.as_secs_f64(),
        checksum: artifact.checksum().to_string(),
        uploaded_to,
    };
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn capture_config(args: &RecordArgs) -> anyhow::Result<CaptureConfiguration> {
    let mut config = match args.config {
        Some(ref path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?
        }
        None => CaptureConfiguration::default(),
    };
    if let Some(ref device) = args.device {
        config.device_id = Some(device.clone());
    }
    if args.no_audio {
        config.enable_audio = false;
    }
    if let Some(ms) = args.timeslice_ms {
        config.timeslice_ms = ms;
    }
    Ok(config)
}

/// Transcode to MP4, falling back to the raw recording when conversion fails.
async fn convert_to_mp4(ffmpeg: &Path, result: &RecordingResult) -> (Artifact, RecordingMetadata) {
    let pipeline = TranscodePipeline::new(FfmpegRuntime::new(ffmpeg));
    match pipeline.transcode(&result.artifact, MediaFormat::Mp4).await {
        Ok(mp4) => {
            let metadata = result.metadata.for_derived(&mp4);
            (mp4, metadata)
        }
        Err(e) => {
            log::warn!("MP4 conversion failed, keeping {}: {}", result.artifact.mime_type(), e);
            (result.artifact.clone(), result.metadata.clone())
        }
    }
}
