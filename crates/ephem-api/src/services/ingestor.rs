//! Asset ingestion pipeline.
//!
//! Ingestion is all-or-nothing: the original is persisted, every size
//! profile is rendered, and only then is the catalog record written. Any
//! failure along the way removes whatever was already on disk, so a
//! cataloged asset always has its full file set.

use std::sync::Arc;

use tracing::{info, warn};

use ephem_media::generate_derivative;
use ephem_models::{Asset, AssetId, ImageFormat, PostId, SizeProfile};
use ephem_storage::DiskStore;
use ephem_store::AssetCatalog;

use crate::error::{ApiError, ApiResult};

/// Ingests uploaded images and renders their derivative set.
#[derive(Clone)]
pub struct AssetIngestor {
    disk: DiskStore,
    catalog: Arc<dyn AssetCatalog>,
    profiles: Vec<SizeProfile>,
    max_upload_size: usize,
}

impl AssetIngestor {
    pub fn new(
        disk: DiskStore,
        catalog: Arc<dyn AssetCatalog>,
        profiles: Vec<SizeProfile>,
        max_upload_size: usize,
    ) -> Self {
        Self {
            disk,
            catalog,
            profiles,
            max_upload_size,
        }
    }

    pub fn profiles(&self) -> &[SizeProfile] {
        &self.profiles
    }

    /// Ingest one uploaded image.
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        declared_mime: &str,
        owner: Option<PostId>,
    ) -> ApiResult<Asset> {
        if bytes.is_empty() {
            return Err(ApiError::bad_request("empty upload"));
        }
        if bytes.len() > self.max_upload_size {
            return Err(ApiError::PayloadTooLarge(format!(
                "upload of {} bytes exceeds limit of {}",
                bytes.len(),
                self.max_upload_size
            )));
        }
        let format = ImageFormat::from_mime(declared_mime).ok_or_else(|| {
            ApiError::UnsupportedMediaType(format!("'{declared_mime}' is not an accepted image type"))
        })?;

        let asset_id = AssetId::new();
        let size_bytes = bytes.len() as u64;
        let original_key = DiskStore::original_key(&asset_id, format);

        self.disk.write(&original_key, &bytes).await?;

        let mut asset = Asset::new(asset_id.clone(), original_key.clone(), format, size_bytes);
        if let Some(post_id) = owner {
            asset = asset.owned_by(post_id);
        }

        match self.render_profiles(&mut asset, format).await {
            Ok(()) => {}
            Err(e) => {
                self.cleanup_partial(&asset).await;
                return Err(e);
            }
        }

        if let Err(e) = self.catalog.put(&asset).await {
            self.cleanup_partial(&asset).await;
            return Err(e.into());
        }

        info!(
            asset_id = %asset.asset_id,
            format = %format,
            size_bytes,
            derivatives = asset.derivatives.len(),
            "ingested asset"
        );
        Ok(asset)
    }

    async fn render_profiles(&self, asset: &mut Asset, format: ImageFormat) -> ApiResult<()> {
        let source = self.disk.path_for(&asset.original_key)?;
        for profile in &self.profiles {
            let key = DiskStore::derivative_key(&asset.asset_id, profile, format);
            let output = self.disk.path_for(&key)?;
            let derivative = generate_derivative(&source, &output, profile, format).await?;
            asset.add_derivative(profile.name.clone(), derivative);
        }
        Ok(())
    }

    /// Best-effort removal of a half-ingested asset's files.
    ///
    /// Failures here are logged, not raised: the upload error the caller is
    /// about to see is the real problem.
    async fn cleanup_partial(&self, asset: &Asset) {
        if let Err(e) = self.disk.delete(&asset.original_key).await {
            warn!(key = %asset.original_key, error = %e, "cleanup of partial ingest failed");
        }
        for derivative in asset.derivatives.values() {
            if let Err(e) = self.disk.delete(&derivative.key).await {
                warn!(key = %derivative.key, error = %e, "cleanup of partial ingest failed");
            }
        }
        // Derivatives rendered before the failing one but not yet recorded
        // on the asset are covered by the deterministic key layout.
        for profile in &self.profiles {
            if asset.derivatives.contains_key(&profile.name) {
                continue;
            }
            if let Some(format) = ImageFormat::from_mime(&asset.mime_type) {
                let key = DiskStore::derivative_key(&asset.asset_id, profile, format);
                let _ = self.disk.delete(&key).await;
            }
        }
    }
}
