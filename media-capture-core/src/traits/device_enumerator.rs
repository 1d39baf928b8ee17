use async_trait::async_trait;

use crate::models::device::{DeviceDescriptor, DeviceKind};
use crate::models::error::CaptureError;

/// Lists capture-capable devices.
///
/// Every call re-queries the platform. When the platform refuses enumeration
/// (permissions not granted yet) this returns `CaptureError::DeviceQuery`
/// rather than an empty list.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError>;

    /// Only devices of `kind`.
    async fn list_devices_of(&self, kind: DeviceKind) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        Ok(self
            .list_devices()
            .await?
            .into_iter()
            .filter(|d| d.kind == kind)
            .collect())
    }
}
