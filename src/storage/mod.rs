//! Durable storage for finished recordings

pub mod filesystem;
pub mod http;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StorageConfig, StorageKind};
use crate::recording::finalizer::{format_duration, format_size};

pub use filesystem::FilesystemBackend;
pub use http::HttpUploadBackend;

/// Metadata stored alongside an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    pub duration_seconds: u64,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
    pub owner_id: String,
    pub label: String,
    pub filename: String,
    pub mime_type: String,
}

impl ArtifactMetadata {
    /// Duration as `MM:SS`
    pub fn display_duration(&self) -> String {
        format_duration(self.duration_seconds)
    }

    /// Size as `"x.y MB"`
    pub fn display_size(&self) -> String {
        format_size(self.byte_size)
    }
}

/// Where a persisted artifact can be fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecording {
    pub url: String,
}

/// Accepts a finished artifact and returns a durable URL
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    async fn persist(&self, bytes: &[u8], metadata: &ArtifactMetadata) -> Result<StoredRecording>;

    fn name(&self) -> &str;
}

/// Build the backend selected in the storage section
pub fn backend_from_config(config: &StorageConfig) -> Result<Arc<dyn PersistenceBackend>> {
    match config.backend {
        StorageKind::Filesystem => Ok(Arc::new(FilesystemBackend::new(&config.recordings_path))),
        StorageKind::Http => {
            let url = config
                .upload_url
                .as_deref()
                .context("storage.upload_url is required for the http backend")?;
            let backend = HttpUploadBackend::new(url, Duration::from_secs(config.timeout_secs))?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serializes_camel_case() {
        let metadata = ArtifactMetadata {
            duration_seconds: 65,
            byte_size: 1_572_864,
            created_at: Utc::now(),
            owner_id: "owner-1".into(),
            label: "intake".into(),
            filename: "session-1.srec".into(),
            mime_type: "video/x-srec".into(),
        };

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["durationSeconds"], 65);
        assert_eq!(json["byteSize"], 1_572_864);
        assert_eq!(json["ownerId"], "owner-1");
        assert_eq!(metadata.display_duration(), "01:05");
        assert_eq!(metadata.display_size(), "1.5 MB");
    }

    #[test]
    fn test_http_backend_requires_url() {
        let config = StorageConfig {
            backend: StorageKind::Http,
            upload_url: None,
            ..StorageConfig::default()
        };
        assert!(backend_from_config(&config).is_err());
    }
}
