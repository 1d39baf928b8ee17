use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::models::artifact::Artifact;
use crate::models::error::DeliveryError;
use crate::processing::filename;
use crate::traits::delivery_sink::{DeliveryReceipt, DeliverySink};

/// Upper bound on `-N` suffixes tried before giving up on a name.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Saves artifacts into a local directory.
///
/// Never overwrites: when the name is taken, `-1`, `-2`, ... is appended to the stem.
#[derive(Debug, Clone)]
pub struct LocalSaveSink {
    dir: PathBuf,
}

impl LocalSaveSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn create_unique(&self, file_name: &str) -> Result<(PathBuf, fs::File), DeliveryError> {
        for path in filename::candidates(&self.dir, file_name).take(MAX_NAME_ATTEMPTS) {
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(DeliveryError::Configuration(format!(
            "no free file name for {} in {}",
            file_name,
            self.dir.display()
        )))
    }
}

#[async_trait]
impl DeliverySink for LocalSaveSink {
    async fn deliver(&self, artifact: &Artifact, file_name: &str) -> Result<DeliveryReceipt, DeliveryError> {
        if !filename::is_plain_file_name(file_name) {
            return Err(DeliveryError::Configuration(format!("not a plain file name: {:?}", file_name)));
        }
        fs::create_dir_all(&self.dir).await?;

        let (path, mut file) = self.create_unique(file_name).await?;
        let written = async {
            file.write_all(artifact.data()).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(e.into());
        }

        log::info!("saved {} bytes to {}", artifact.len(), path.display());
        Ok(DeliveryReceipt {
            location: path.to_string_lossy().into_owned(),
            bytes: artifact.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifact::MediaFormat;

    #[tokio::test]
    async fn saves_artifact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalSaveSink::new(dir.path().join("recordings"));
        let artifact = Artifact::new(vec![7u8; 25], MediaFormat::Webm);

        let receipt = sink.deliver(&artifact, "clip.webm").await.unwrap();

        assert_eq!(receipt.bytes, 25);
        let saved = tokio::fs::read(&receipt.location).await.unwrap();
        assert_eq!(saved, vec![7u8; 25]);
    }

    #[tokio::test]
    async fn colliding_names_get_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalSaveSink::new(dir.path());
        let first = Artifact::new(vec![1u8; 4], MediaFormat::Mp4);
        let second = Artifact::new(vec![2u8; 4], MediaFormat::Mp4);

        let a = sink.deliver(&first, "clip.mp4").await.unwrap();
        let b = sink.deliver(&second, "clip.mp4").await.unwrap();

        assert_eq!(PathBuf::from(&a.location), dir.path().join("clip.mp4"));
        assert_eq!(PathBuf::from(&b.location), dir.path().join("clip-1.mp4"));
        assert_eq!(tokio::fs::read(&a.location).await.unwrap(), vec![1u8; 4]);
    }

    #[tokio::test]
    async fn timestamped_name_uses_artifact_extension() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalSaveSink::new(dir.path());
        let artifact = Artifact::new(vec![0u8; 3], MediaFormat::Mp4);

        let receipt = sink.deliver_timestamped(&artifact).await.unwrap();

        let name = PathBuf::from(&receipt.location)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(name.ends_with(".mp4"));
        assert_eq!(name.len(), "YYYY-MM-DD_HH-MM-SS.mp4".len());
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalSaveSink::new(dir.path());
        let artifact = Artifact::new(vec![0u8; 3], MediaFormat::Webm);

        let err = sink.deliver(&artifact, "../escape.webm").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration(_)));
    }
}
