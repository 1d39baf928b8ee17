use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Container format of a recording artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Webm,
    Mp4,
}

impl MediaFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Webm => "video/webm",
            Self::Mp4 => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::Mp4 => "mp4",
        }
    }

    /// Parse a MIME type, ignoring codec parameters (`video/webm;codecs=vp8,opus`).
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("video/webm") || essence.eq_ignore_ascii_case("audio/webm") {
            Some(Self::Webm)
        } else if essence.eq_ignore_ascii_case("video/mp4") || essence.eq_ignore_ascii_case("audio/mp4") {
            Some(Self::Mp4)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// An immutable, fully assembled media object with a declared format.
///
/// Cloning is cheap: the payload is reference counted.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    data: Bytes,
    format: MediaFormat,
    checksum: String,
}

impl Artifact {
    pub fn new(data: impl Into<Bytes>, format: MediaFormat) -> Self {
        let data = data.into();
        let checksum = sha256_hex(&data);
        Self { data, format, checksum }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn format(&self) -> MediaFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// SHA-256 hex digest of the payload.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("format", &self.format)
            .field("len", &self.data.len())
            .field("checksum", &self.checksum)
            .finish()
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data).iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_parameters_are_ignored() {
        assert_eq!(MediaFormat::from_mime("video/webm;codecs=vp8,opus"), Some(MediaFormat::Webm));
        assert_eq!(MediaFormat::from_mime("VIDEO/MP4"), Some(MediaFormat::Mp4));
        assert_eq!(MediaFormat::from_mime("video/x-matroska"), None);
    }

    #[test]
    fn checksum_matches_known_digest() {
        let artifact = Artifact::new(Bytes::from_static(b"abc"), MediaFormat::Webm);
        assert_eq!(
            artifact.checksum(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(artifact.len(), 3);
        assert_eq!(artifact.mime_type(), "video/webm");
    }

    #[test]
    fn empty_artifact_is_valid() {
        let artifact = Artifact::new(Vec::new(), MediaFormat::Webm);
        assert!(artifact.is_empty());
        assert_eq!(artifact.checksum().len(), 64);
    }
}
