//! Flat on-disk asset store.
//!
//! All files live directly under a single root directory with deterministic
//! names: `<asset_id><ext>` for originals and `<asset_id>_<profile><ext>`
//! for derivatives. Keys are plain file names; anything that could escape
//! the root is rejected.

use std::path::{Path, PathBuf};

use tracing::debug;

use ephem_models::{AssetId, ImageFormat, SizeProfile};

use crate::error::{StorageError, StorageResult};

/// Local filesystem store for asset originals and derivatives.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::config_error(format!("create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage key of an asset's original file.
    pub fn original_key(asset_id: &AssetId, format: ImageFormat) -> String {
        ephem_models::profile::original_key(asset_id, format)
    }

    /// Storage key of one derivative rendition.
    pub fn derivative_key(
        asset_id: &AssetId,
        profile: &SizeProfile,
        format: ImageFormat,
    ) -> String {
        profile.derivative_key(asset_id, format)
    }

    /// Absolute path for a key.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// Write bytes to a key, replacing any existing file.
    pub async fn write(&self, key: &str, bytes: &[u8]) -> StorageResult<PathBuf> {
        let path = self.path_for(key)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::write_failed(format!("{key}: {e}")))?;
        debug!(key, bytes = bytes.len(), "wrote object");
        Ok(path)
    }

    /// Read a key's contents.
    pub async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(key))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// File size for a key, or `None` if absent.
    pub async fn stat(&self, key: &str) -> StorageResult<Option<u64>> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(m) => Ok(Some(m.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a key exists on disk.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.stat(key).await?.is_some())
    }

    /// Delete a key. Returns `true` if a file was removed, `false` if the
    /// key was already absent. Absence is not an error.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "deleted object");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::delete_failed(format!("{key}: {e}"))),
        }
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
        || key.starts_with('.')
    {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}
