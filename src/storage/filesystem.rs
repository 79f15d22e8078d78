use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{ArtifactMetadata, PersistenceBackend, StoredRecording};

/// Writes each artifact plus a `.json` metadata sidecar into a directory
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for FilesystemBackend {
    async fn persist(&self, bytes: &[u8], metadata: &ArtifactMetadata) -> Result<StoredRecording> {
        if metadata.filename.contains(['/', '\\']) || metadata.filename.starts_with('.') {
            anyhow::bail!("refusing to write artifact with filename {:?}", metadata.filename);
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))?;

        let path = self.root.join(&metadata.filename);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let sidecar = self.root.join(format!("{}.json", metadata.filename));
        let json = serde_json::to_vec_pretty(metadata).context("Failed to serialize metadata")?;
        tokio::fs::write(&sidecar, json)
            .await
            .with_context(|| format!("Failed to write {}", sidecar.display()))?;

        let absolute = tokio::fs::canonicalize(&path)
            .await
            .with_context(|| format!("Failed to resolve {}", path.display()))?;

        info!("Saved recording to {} ({} bytes)", absolute.display(), bytes.len());

        Ok(StoredRecording {
            url: format!("file://{}", absolute.display()),
        })
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}
