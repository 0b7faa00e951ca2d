//! Filesystem content store for artwork files
//!
//! Each artwork lives at `{root}/{id}.png`. Writes go to a `.tmp` sibling
//! first and are renamed into place, so a reader never sees a partial file.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use config::{PathManager, Settings};

use crate::error::{ArtworkError, ArtworkResult};
use crate::storage::ids::ArtworkId;
use crate::storage::traits::ContentStore;

const ARTWORK_EXTENSION: &str = "png";
const TEMP_EXTENSION: &str = "tmp";

/// Artwork storage on the local filesystem
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Create a new FsContentStore with the given root directory
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Store rooted at the configured artwork directory, falling back to the
    /// platform default. None if no directory can be determined.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings
            .artwork_dir
            .clone()
            .or_else(PathManager::artwork_dir)
            .map(Self::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the filesystem path for an artwork
    pub fn path_for(&self, key: &ArtworkId) -> PathBuf {
        self.root.join(format!("{}.{}", key, ARTWORK_EXTENSION))
    }

    fn temp_path_for(&self, key: &ArtworkId) -> PathBuf {
        self.path_for(key).with_extension(TEMP_EXTENSION)
    }

    /// Get the size of a stored artwork without reading its contents
    pub async fn size(&self, key: &ArtworkId) -> ArtworkResult<u64> {
        let metadata = fs::metadata(self.path_for(key)).await?;
        Ok(metadata.len())
    }

    pub async fn get(&self, key: &ArtworkId) -> ArtworkResult<Vec<u8>> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtworkError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Clean up temp files left behind by interrupted writes
    pub async fn cleanup_temp_files(&self) -> ArtworkResult<usize> {
        let mut cleaned = 0;

        if !fs::try_exists(&self.root).await? {
            return Ok(0);
        }

        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                fs::remove_file(&path).await?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            tracing::debug!(cleaned, root = ?self.root, "Removed leftover artwork temp files");
        }
        Ok(cleaned)
    }

    async fn write_temp(&self, temp_path: &Path, data: &[u8]) -> ArtworkResult<()> {
        let mut file = fs::File::create(temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put(
        &self,
        key: &ArtworkId,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> ArtworkResult<()> {
        let path = self.path_for(key);
        fs::create_dir_all(&self.root).await?;

        let temp_path = self.temp_path_for(key);
        if let Err(e) = self.write_temp(&temp_path, &data).await {
            fs::remove_file(&temp_path).await.ok();
            return Err(e);
        }

        if cancel.is_cancelled() {
            fs::remove_file(&temp_path).await.ok();
            return Err(ArtworkError::Cancelled);
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            fs::remove_file(&temp_path).await.ok();
            return Err(e.into());
        }

        tracing::debug!(artwork = %key, path = ?path, bytes = data.len(), "Artwork written");
        Ok(())
    }

    async fn delete(&self, key: &ArtworkId, cancel: &CancellationToken) -> ArtworkResult<bool> {
        if cancel.is_cancelled() {
            return Err(ArtworkError::Cancelled);
        }
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &ArtworkId) -> bool {
        fs::try_exists(self.path_for(key)).await.unwrap_or(false)
    }
}
