//! Capture device access checks.
//!
//! On Linux, camera access is governed by the permissions of the `/dev/video*`
//! node (typically the `video` group). There is no consent prompt, so an
//! inaccessible node is reported as a permission denial.
//!
//! AVFoundation and DirectShow device ids are not filesystem paths; access to
//! them is only known once ffmpeg tries to open the device.

use std::io::ErrorKind;
use std::path::Path;

use media_capture_core::models::error::CaptureError;

/// EBUSY on Linux.
const DEVICE_BUSY: i32 = 16;

/// Check that the device node at `path` can be opened for capture.
pub async fn check_device_access(path: &Path) -> Result<(), CaptureError> {
    match tokio::fs::OpenOptions::new().read(true).open(path).await {
        Ok(_) => Ok(()),
        Err(e) => Err(map_open_error(path, e)),
    }
}

/// Whether `device_id` names a device node that can be checked up front.
pub fn is_device_node(device_id: &str) -> bool {
    device_id.starts_with("/dev/")
}

fn map_open_error(path: &Path, e: std::io::Error) -> CaptureError {
    let device = path.display();
    match e.kind() {
        ErrorKind::PermissionDenied => {
            CaptureError::PermissionDenied(format!("access to {} denied (is the user in the video group?)", device))
        }
        ErrorKind::NotFound => CaptureError::DeviceUnavailable(format!("{} does not exist", device)),
        _ if e.raw_os_error() == Some(DEVICE_BUSY) => {
            CaptureError::DeviceUnavailable(format!("{} is in use by another application", device))
        }
        _ => CaptureError::DeviceUnavailable(format!("cannot open {}: {}", device, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_node_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_device_access(&dir.path().join("video9")).await.unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }

    #[tokio::test]
    async fn readable_node_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("video0");
        std::fs::write(&node, b"").unwrap();
        assert!(check_device_access(&node).await.is_ok());
    }

    #[test]
    fn open_errors_map_to_capture_errors() {
        let path = Path::new("/dev/video0");
        assert!(matches!(
            map_open_error(path, std::io::Error::from(ErrorKind::PermissionDenied)),
            CaptureError::PermissionDenied(_)
        ));
        assert!(matches!(
            map_open_error(path, std::io::Error::from_raw_os_error(DEVICE_BUSY)),
            CaptureError::DeviceUnavailable(_)
        ));
    }

    #[test]
    fn only_dev_paths_are_nodes() {
        assert!(is_device_node("/dev/video0"));
        assert!(!is_device_node("0"));
        assert!(!is_device_node("Integrated Camera"));
    }
}
