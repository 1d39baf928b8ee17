use async_trait::async_trait;
use chrono::Local;

use crate::models::artifact::Artifact;
use crate::models::error::DeliveryError;
use crate::processing::filename;

/// Where a delivered artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Local path or remote path of the stored file.
    pub location: String,
    pub bytes: u64,
}

/// Receives finished artifacts (local save or remote upload).
///
/// Delivery borrows the artifact, so a failed attempt can be retried with the same value.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, artifact: &Artifact, file_name: &str) -> Result<DeliveryReceipt, DeliveryError>;

    /// Deliver under a timestamped name (`YYYY-MM-DD_HH-MM-SS.<ext>`).
    async fn deliver_timestamped(&self, artifact: &Artifact) -> Result<DeliveryReceipt, DeliveryError> {
        let name = filename::timestamped(Local::now().naive_local(), artifact.format());
        self.deliver(artifact, &name).await
    }
}
