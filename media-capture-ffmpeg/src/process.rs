//! Child-process helpers for invoking ffmpeg.

use std::ffi::OsStr;

use media_capture_core::models::error::CaptureError;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    #[allow(unused_mut)]
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.as_std_mut().creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Last non-empty line of ffmpeg's stderr output.
pub fn stderr_tail(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no output")
        .to_string()
}

/// Map an ffmpeg error line for a capture input onto a capture error kind.
pub fn classify_capture_failure(line: &str) -> CaptureError {
    let lower = line.to_ascii_lowercase();
    if lower.contains("permission denied") || lower.contains("not authorized") {
        CaptureError::PermissionDenied(line.to_string())
    } else if lower.contains("device or resource busy")
        || lower.contains("no such file or directory")
        || lower.contains("no such device")
        || lower.contains("could not find video device")
        || lower.contains("could not find audio")
        || lower.contains("i/o error")
    {
        CaptureError::DeviceUnavailable(line.to_string())
    } else if lower.contains("video size")
        || lower.contains("framerate")
        || lower.contains("not supported by the device")
    {
        CaptureError::ConstraintNotSatisfiable(line.to_string())
    } else {
        CaptureError::StreamFailed(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_skips_trailing_blank_lines() {
        let stderr = b"first line\n[v4l2 @ 0x1] Cannot open video device /dev/video0\n\n";
        assert_eq!(stderr_tail(stderr), "[v4l2 @ 0x1] Cannot open video device /dev/video0");
        assert_eq!(stderr_tail(b""), "no output");
    }

    #[test]
    fn classifies_common_capture_failures() {
        assert!(matches!(
            classify_capture_failure("/dev/video0: Permission denied"),
            CaptureError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_capture_failure("/dev/video0: Device or resource busy"),
            CaptureError::DeviceUnavailable(_)
        ));
        assert!(matches!(
            classify_capture_failure("The V4L2 driver changed the video size"),
            CaptureError::ConstraintNotSatisfiable(_)
        ));
        assert!(matches!(
            classify_capture_failure("Conversion failed!"),
            CaptureError::StreamFailed(_)
        ));
    }
}
