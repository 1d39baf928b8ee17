//! Capture device enumeration.
//!
//! - `V4l2DeviceEnumerator` reads Linux sysfs (`/sys/class/video4linux`) for
//!   cameras and `/proc/asound/cards` for microphones.
//! - `FfmpegDeviceEnumerator` asks ffmpeg to list AVFoundation (macOS) or
//!   DirectShow (Windows) devices and parses its log output.
//!
//! The first video device found is marked as the default.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use media_capture_core::models::device::{DeviceDescriptor, DeviceKind};
use media_capture_core::models::error::CaptureError;
use media_capture_core::traits::device_enumerator::DeviceEnumerator;

use crate::capture::InputFormat;
use crate::process::{stderr_tail, tokio_command};

/// Camera and sound card enumeration from Linux sysfs and procfs.
#[derive(Debug, Clone)]
pub struct V4l2DeviceEnumerator {
    sysfs_root: PathBuf,
    asound_cards: PathBuf,
    dev_root: PathBuf,
}

impl V4l2DeviceEnumerator {
    pub fn new() -> Self {
        Self::with_roots("/sys/class/video4linux", "/proc/asound/cards", "/dev")
    }

    /// Enumerator over alternate roots (used by tests).
    pub fn with_roots(sysfs_root: impl Into<PathBuf>, asound_cards: impl Into<PathBuf>, dev_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            asound_cards: asound_cards.into(),
            dev_root: dev_root.into(),
        }
    }

    async fn list_cameras(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        let mut entries = match tokio::fs::read_dir(&self.sysfs_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(query_error(&self.sysfs_root, e)),
        };

        let mut nodes = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| query_error(&self.sysfs_root, e))? {
            let node = entry.file_name().to_string_lossy().into_owned();
            let Some(number) = node.strip_prefix("video").and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };

            // A camera exposes several nodes; only index 0 carries the capture stream.
            let index = read_trimmed(&entry.path().join("index")).await;
            if index.as_deref().is_some_and(|i| i != "0") {
                continue;
            }

            let label = read_trimmed(&entry.path().join("name"))
                .await
                .unwrap_or_else(|| format!("Camera {}", number));
            nodes.push((number, self.dev_root.join(&node), label));
        }

        nodes.sort_by_key(|(number, _, _)| *number);
        Ok(nodes
            .into_iter()
            .enumerate()
            .map(|(i, (_, path, label))| {
                let mut device = DeviceDescriptor::video(path.to_string_lossy(), label);
                device.is_default = i == 0;
                device
            })
            .collect())
    }

    async fn list_microphones(&self) -> Vec<DeviceDescriptor> {
        match tokio::fs::read_to_string(&self.asound_cards).await {
            Ok(cards) => parse_asound_cards(&cards),
            Err(e) => {
                log::debug!("no sound card listing at {}: {}", self.asound_cards.display(), e);
                Vec::new()
            }
        }
    }
}

impl Default for V4l2DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceEnumerator for V4l2DeviceEnumerator {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        let mut devices = self.list_cameras().await?;
        devices.extend(self.list_microphones().await);
        log::debug!("found {} capture devices", devices.len());
        Ok(devices)
    }
}

/// Device enumeration through `ffmpeg -list_devices`.
#[derive(Debug, Clone)]
pub struct FfmpegDeviceEnumerator {
    ffmpeg_path: PathBuf,
    input_format: InputFormat,
}

impl FfmpegDeviceEnumerator {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, input_format: InputFormat) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            input_format,
        }
    }
}

#[async_trait]
impl DeviceEnumerator for FfmpegDeviceEnumerator {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        let parse: fn(&str) -> Vec<DeviceDescriptor> = match self.input_format {
            InputFormat::AvFoundation => parse_avfoundation_listing,
            InputFormat::Dshow => parse_dshow_listing,
            InputFormat::V4l2 => return V4l2DeviceEnumerator::new().list_devices().await,
        };

        // ffmpeg always exits with an error here ("dummy" input); the listing is on stderr.
        let output = tokio_command(&self.ffmpeg_path)
            .args(["-hide_banner", "-f", self.input_format.as_ffmpeg(), "-list_devices", "true", "-i", "dummy"])
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| CaptureError::DeviceQuery(format!("failed to run {}: {}", self.ffmpeg_path.display(), e)))?;

        let listing = String::from_utf8_lossy(&output.stderr);
        let devices = parse(&listing);
        if devices.is_empty() {
            if let Some(line) = listing_failure(&listing) {
                return Err(CaptureError::DeviceQuery(line));
            }
            if !output.stderr.is_empty() {
                log::debug!("ffmpeg listed no devices: {}", stderr_tail(&output.stderr));
            }
        }
        Ok(devices)
    }
}

/// Parse `/proc/asound/cards` into audio devices (`hw:N`).
pub fn parse_asound_cards(cards: &str) -> Vec<DeviceDescriptor> {
    cards
        .lines()
        .filter_map(|line| {
            // " 0 [PCH            ]: HDA-Intel - HDA Intel PCH"
            let (head, rest) = line.split_once("]:")?;
            let (number, _) = head.trim().split_once(' ')?;
            let number: u32 = number.parse().ok()?;
            let label = rest.split_once(" - ").map(|(_, name)| name).unwrap_or(rest).trim();
            Some(DeviceDescriptor::audio(format!("hw:{}", number), label))
        })
        .collect()
}

/// Parse the device listing printed by `ffmpeg -f avfoundation -list_devices true`.
///
/// Ids are the AVFoundation indices. Screen capture inputs are skipped.
pub fn parse_avfoundation_listing(listing: &str) -> Vec<DeviceDescriptor> {
    let mut kind = None;
    let mut devices: Vec<DeviceDescriptor> = Vec::new();

    for line in listing.lines() {
        let message = strip_log_prefix(line);
        if message.contains("video devices:") {
            kind = Some(DeviceKind::Video);
            continue;
        }
        if message.contains("audio devices:") {
            kind = Some(DeviceKind::Audio);
            continue;
        }
        let Some(kind) = kind else { continue };
        let Some((index, label)) = message.strip_prefix('[').and_then(|m| m.split_once("] ")) else {
            continue;
        };
        if index.parse::<u32>().is_err() || label.starts_with("Capture screen") {
            continue;
        }
        let device = match kind {
            DeviceKind::Video => DeviceDescriptor::video(index, label.trim()),
            DeviceKind::Audio => DeviceDescriptor::audio(index, label.trim()),
        };
        devices.push(device);
    }

    mark_first_video_default(&mut devices);
    devices
}

/// Parse the device listing printed by `ffmpeg -f dshow -list_devices true`.
///
/// Handles both the `"Name" (video)` form and the older form with
/// "DirectShow video devices" section headers. Ids are the friendly names.
pub fn parse_dshow_listing(listing: &str) -> Vec<DeviceDescriptor> {
    let mut section = None;
    let mut devices: Vec<DeviceDescriptor> = Vec::new();

    for line in listing.lines() {
        let message = strip_log_prefix(line);
        if message.starts_with("DirectShow video devices") {
            section = Some(DeviceKind::Video);
            continue;
        }
        if message.starts_with("DirectShow audio devices") {
            section = Some(DeviceKind::Audio);
            continue;
        }
        let Some((name, suffix)) = message.strip_prefix('"').and_then(|m| m.rsplit_once('"')) else {
            continue;
        };

        let kind = if suffix.contains("video") {
            Some(DeviceKind::Video)
        } else if suffix.contains("audio") {
            Some(DeviceKind::Audio)
        } else {
            section
        };
        let device = match kind {
            Some(DeviceKind::Video) => DeviceDescriptor::video(name, name),
            Some(DeviceKind::Audio) => DeviceDescriptor::audio(name, name),
            None => continue,
        };
        devices.push(device);
    }

    mark_first_video_default(&mut devices);
    devices
}

/// First line of a device listing that shows ffmpeg failed before it could
/// enumerate anything. The errors about opening the `dummy` input are always
/// printed and do not count.
pub fn listing_failure(listing: &str) -> Option<String> {
    listing.lines().map(strip_log_prefix).find_map(|message| {
        let lower = message.to_ascii_lowercase();
        if lower.starts_with("error opening input") || lower.contains("dummy") {
            return None;
        }
        let failed = lower.contains("unknown input format")
            || lower.contains("not authorized")
            || lower.contains("error");
        failed.then(|| message.to_string())
    })
}

fn strip_log_prefix(line: &str) -> &str {
    let line = line.trim();
    match line.strip_prefix('[').and_then(|rest| rest.split_once("] ")) {
        Some((context, message)) if context.contains(" @ ") => message.trim(),
        _ => line,
    }
}

fn mark_first_video_default(devices: &mut [DeviceDescriptor]) {
    if let Some(first) = devices.iter_mut().find(|d| d.kind == DeviceKind::Video) {
        first.is_default = true;
    }
}

async fn read_trimmed(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn query_error(path: &Path, e: std::io::Error) -> CaptureError {
    CaptureError::DeviceQuery(format!("cannot read {}: {}", path.display(), e))
}
