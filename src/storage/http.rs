use anyhow::{bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{info, warn};

use super::{ArtifactMetadata, PersistenceBackend, StoredRecording};

/// Uploads the artifact body to a recordings endpoint.
///
/// `POST <url>?filename=&ownerId=&duration=&size=&label=`, answered with
/// `{"url": "..."}`.
pub struct HttpUploadBackend {
    client: reqwest::Client,
    upload_url: String,
}

impl HttpUploadBackend {
    pub fn new(upload_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("session-recorder/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            upload_url: upload_url.to_string(),
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for HttpUploadBackend {
    async fn persist(&self, bytes: &[u8], metadata: &ArtifactMetadata) -> Result<StoredRecording> {
        let duration = metadata.display_duration();
        let size = metadata.display_size();

        let response = self
            .client
            .post(&self.upload_url)
            .query(&[
                ("filename", metadata.filename.as_str()),
                ("ownerId", metadata.owner_id.as_str()),
                ("duration", duration.as_str()),
                ("size", size.as_str()),
                ("label", metadata.label.as_str()),
            ])
            .header(CONTENT_TYPE, metadata.mime_type.as_str())
            .body(bytes.to_vec())
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.upload_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Upload of {} rejected: {} {}", metadata.filename, status, body);
            bail!("upload rejected with status {}", status);
        }

        let stored: StoredRecording = response
            .json()
            .await
            .context("Upload response did not contain a url")?;

        info!("Uploaded {} ({}) to {}", metadata.filename, size, stored.url);
        Ok(stored)
    }

    fn name(&self) -> &str {
        "http"
    }
}
