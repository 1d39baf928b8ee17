use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::models::artifact::Artifact;
use crate::models::config::UploadConfig;
use crate::models::error::DeliveryError;
use crate::processing::filename;
use crate::traits::delivery_sink::{DeliveryReceipt, DeliverySink};

/// Structured upload argument sent in the argument header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadArg {
    pub path: String,
    pub mode: &'static str,
    pub autorename: bool,
    pub mute: bool,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    path_display: Option<String>,
    size: Option<u64>,
}

/// Uploads artifacts with an HTTP POST of the raw bytes.
///
/// The target path, add-only mode and auto-rename policy travel as JSON in
/// the configured argument header. Any non-2xx response is a delivery failure.
pub struct UploadSink {
    client: reqwest::Client,
    config: UploadConfig,
}

impl UploadSink {
    pub fn new(config: UploadConfig) -> Result<Self, DeliveryError> {
        config.validate().map_err(DeliveryError::Configuration)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn upload_arg(&self, file_name: &str) -> UploadArg {
        UploadArg {
            path: self.config.target_path(file_name),
            mode: "add",
            autorename: true,
            mute: self.config.mute,
        }
    }

    /// Build the upload request for `artifact` without sending it.
    pub fn build_request(&self, artifact: &Artifact, file_name: &str) -> Result<reqwest::Request, DeliveryError> {
        if !filename::is_plain_file_name(file_name) {
            return Err(DeliveryError::Configuration(format!("not a plain file name: {:?}", file_name)));
        }
        let arg = ascii_json(&serde_json::to_string(&self.upload_arg(file_name))?);

        Ok(self
            .client
            .post(&self.config.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.access_token))
            .header(self.config.arg_header.as_str(), arg)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(artifact.data().clone())
            .build()?)
    }
}

#[async_trait]
impl DeliverySink for UploadSink {
    async fn deliver(&self, artifact: &Artifact, file_name: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let request = self.build_request(artifact, file_name)?;
        let requested_path = self.config.target_path(file_name);
        log::info!("uploading {} bytes to {}", artifact.len(), requested_path);

        let response = self.client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("upload of {} rejected: {} {}", requested_path, status, body);
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // The server may rename on collision; prefer the path it reports.
        let body = response.text().await?;
        let (location, bytes) = match serde_json::from_str::<UploadResponse>(&body) {
            Ok(parsed) => (
                parsed.path_display.unwrap_or(requested_path),
                parsed.size.unwrap_or(artifact.len() as u64),
            ),
            Err(e) => {
                log::debug!("upload response was not JSON: {}", e);
                (requested_path, artifact.len() as u64)
            }
        };

        log::info!("uploaded to {}", location);
        Ok(DeliveryReceipt { location, bytes })
    }
}

/// Escape every non-ASCII character of `json` as `\uXXXX` so it is a valid header value.
fn ascii_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
