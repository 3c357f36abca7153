//! Asset API handlers.

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use ephem_media::{probe_image, transient_resize, MediaError};
use ephem_models::{Asset, AssetId, ImageFormat, PostId};

use crate::error::{ApiError, ApiResult};
use crate::metrics::{record_asset_ingested, record_asset_rejected, record_transient_resize};
use crate::state::AppState;

/// Largest accepted on-demand resize bound, per axis.
const MAX_RESIZE_DIMENSION: u32 = 4096;

/// URL prefix under which the front proxy serves the storage root.
const MEDIA_URL_PREFIX: &str = "/media";

fn media_url(key: &str) -> String {
    format!("{MEDIA_URL_PREFIX}/{key}")
}

/// Probed metadata of a stored original.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size_bytes: u64,
    pub modified_at: String,
}

/// One derived rendition in a response.
#[derive(Debug, Serialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Per-file upload descriptor.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedAsset {
    pub id: String,
    pub url: String,
    pub thumbnails: HashMap<String, Thumbnail>,
    pub metadata: AssetMetadata,
}

/// Asset registry read: the catalog record plus freshly probed metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetResponse {
    pub asset_id: String,
    pub url: String,
    pub mime_type: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_post_id: Option<String>,
    pub thumbnails: HashMap<String, Thumbnail>,
    pub metadata: AssetMetadata,
}

fn thumbnails_of(asset: &Asset) -> HashMap<String, Thumbnail> {
    asset
        .derivatives
        .iter()
        .map(|(profile, d)| {
            (
                profile.clone(),
                Thumbnail {
                    url: media_url(&d.key),
                    width: d.width,
                    height: d.height,
                },
            )
        })
        .collect()
}

/// Probe the stored original on every call, so the response always
/// reflects the file actually on disk.
async fn probe_metadata(state: &AppState, asset: &Asset) -> ApiResult<AssetMetadata> {
    let path = state.disk.path_for(&asset.original_key)?;
    let info = probe_image(&path).await?;
    Ok(AssetMetadata {
        width: info.width,
        height: info.height,
        format: info.format.as_str().to_string(),
        size_bytes: info.size,
        modified_at: info.modified_at.to_rfc3339(),
    })
}

/// Upload one or more images as a multipart form.
///
/// Every `file` part carries image bytes and a content type; an optional
/// `post_id` part ties the assets to a post. Each file is ingested
/// all-or-nothing and described independently in the response.
pub async fn upload_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Vec<UploadedAsset>>)> {
    let mut files: Vec<(Vec<u8>, String)> = Vec::new();
    let mut post_id: Option<PostId> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") | Some("files") => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::bad_request("file part has no content type"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read upload: {e}")))?;
                files.push((bytes.to_vec(), content_type));
            }
            Some("post_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid post_id: {e}")))?;
                if !text.is_empty() {
                    post_id = Some(PostId::from_string(text));
                }
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("missing 'file' part"));
    }

    let mut uploaded = Vec::with_capacity(files.len());
    for (bytes, content_type) in files {
        let start = Instant::now();
        let result = state
            .ingestor
            .ingest(bytes, &content_type, post_id.clone())
            .await;

        match &result {
            Ok(asset) => record_asset_ingested(&asset.mime_type, start.elapsed().as_secs_f64()),
            Err(ApiError::UnsupportedMediaType(_)) => record_asset_rejected("unsupported_type"),
            Err(ApiError::PayloadTooLarge(_)) => record_asset_rejected("too_large"),
            Err(_) => record_asset_rejected("invalid"),
        }

        let asset = result?;
        let metadata = probe_metadata(&state, &asset).await?;
        uploaded.push(UploadedAsset {
            id: asset.asset_id.to_string(),
            url: media_url(&asset.original_key),
            thumbnails: thumbnails_of(&asset),
            metadata,
        });
    }

    Ok((StatusCode::CREATED, Json(uploaded)))
}

/// Fetch an asset descriptor with live-probed metadata.
pub async fn get_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> ApiResult<Json<AssetResponse>> {
    let asset = state
        .assets
        .get(&AssetId::from_string(&asset_id))
        .await?
        .filter(|a| !a.is_deleted())
        .ok_or_else(|| ApiError::not_found(format!("asset {asset_id}")))?;

    let metadata = probe_metadata(&state, &asset).await?;
    Ok(Json(AssetResponse {
        asset_id: asset.asset_id.to_string(),
        url: media_url(&asset.original_key),
        mime_type: asset.mime_type.clone(),
        created_at: asset.created_at.to_rfc3339(),
        owner_post_id: asset.owner_post_id.as_ref().map(|p| p.to_string()),
        thumbnails: thumbnails_of(&asset),
        metadata,
    }))
}

#[derive(Deserialize)]
pub struct ResizeParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
}

/// Resize an asset's original on demand.
///
/// At least one of `width`/`height` must be given; a missing axis is
/// unconstrained. Nothing is persisted; the rendition exists only in the
/// response body.
pub async fn resize_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Query(params): Query<ResizeParams>,
) -> ApiResult<Response> {
    let bounds = validate_resize_params(&params)?;

    let asset = state
        .assets
        .get(&AssetId::from_string(&asset_id))
        .await?
        .filter(|a| !a.is_deleted())
        .ok_or_else(|| ApiError::not_found(format!("asset {asset_id}")))?;

    let format = ImageFormat::from_mime(&asset.mime_type)
        .ok_or_else(|| ApiError::internal(format!("asset {asset_id} has unknown stored type")))?;
    let source = state.disk.path_for(&asset.original_key)?;

    // An unreadable stored original is our fault, not the client's.
    let bytes = transient_resize(&source, bounds, format, params.quality)
        .await
        .map_err(|e| match e {
            MediaError::DecodeFailed { .. } => {
                ApiError::internal(format!("stored original for asset {asset_id} is unreadable"))
            }
            other => ApiError::from(other),
        })?;
    record_transient_resize();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.mime_type())
        .header(header::CACHE_CONTROL, "no-store")
        .body(bytes.into())
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}

fn validate_resize_params(params: &ResizeParams) -> ApiResult<(u32, u32)> {
    if params.width.is_none() && params.height.is_none() {
        return Err(ApiError::bad_request(
            "at least one of width and height is required",
        ));
    }
    for axis in [params.width, params.height].into_iter().flatten() {
        if axis == 0 || axis > MAX_RESIZE_DIMENSION {
            return Err(ApiError::bad_request(format!(
                "width and height must be between 1 and {MAX_RESIZE_DIMENSION}"
            )));
        }
    }
    if let Some(q) = params.quality {
        if q == 0 || q > 100 {
            return Err(ApiError::bad_request("quality must be between 1 and 100"));
        }
    }
    // A missing axis leaves that dimension unconstrained.
    Ok((
        params.width.unwrap_or(u32::MAX),
        params.height.unwrap_or(u32::MAX),
    ))
}

/// Delete an asset: files first, then tombstone the catalog record.
///
/// The tombstone keeps a replayed delete distinguishable from a
/// never-known id: the replay is a 200, the unknown id a 404.
pub async fn delete_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = AssetId::from_string(&asset_id);
    let asset = state
        .assets
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("asset {asset_id}")))?;

    if asset.is_deleted() {
        return Ok(StatusCode::OK);
    }

    let reap = state.reaper.reap(&asset).await;
    if !reap.is_clean() {
        // Record kept untombstoned so the delete can be retried.
        return Err(ApiError::internal(format!(
            "failed to remove {} asset file(s)",
            reap.failed
        )));
    }

    let mut tombstone = asset;
    tombstone.deleted_at = Some(Utc::now());
    state.assets.put(&tombstone).await?;
    info!(asset_id = %id, "deleted asset");
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ephem_models::Derivative;
    use ephem_storage::DiskStore;
    use ephem_store::{AssetCatalog, MemoryAssetCatalog, MemoryAuthorStore, MemoryPostStore};

    use crate::config::ApiConfig;

    struct Fixture {
        assets: Arc<MemoryAssetCatalog>,
        disk: DiskStore,
        state: AppState,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskStore::open(dir.path()).await.unwrap();
        let assets = Arc::new(MemoryAssetCatalog::new());
        let state = AppState::with_stores(
            ApiConfig::default(),
            disk.clone(),
            Arc::new(MemoryPostStore::new()),
            Arc::new(MemoryAuthorStore::new()),
            assets.clone(),
        );
        Fixture {
            assets,
            disk,
            state,
            _dir: dir,
        }
    }

    async fn seed_asset(fx: &Fixture, asset_id: &str) -> Asset {
        let mut asset = Asset::new(
            AssetId::from_string(asset_id),
            format!("{asset_id}.jpg"),
            ImageFormat::Jpeg,
            64,
        );
        fx.disk
            .write(&format!("{asset_id}.jpg"), b"orig")
            .await
            .unwrap();
        let key = format!("{asset_id}_small.jpg");
        fx.disk.write(&key, b"drv").await.unwrap();
        asset.add_derivative(
            "small",
            Derivative {
                key,
                width: 1,
                height: 1,
            },
        );
        fx.assets.put(&asset).await.unwrap();
        asset
    }

    #[tokio::test]
    async fn test_delete_asset_replay_is_ok() {
        let fx = fixture().await;
        seed_asset(&fx, "asset1").await;

        let status = delete_asset(State(fx.state.clone()), Path("asset1".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(!fx.disk.exists("asset1.jpg").await.unwrap());

        // The record survives as a tombstone, so the replay is a 200 too.
        let record = fx
            .assets
            .get(&AssetId::from_string("asset1"))
            .await
            .unwrap()
            .unwrap();
        assert!(record.is_deleted());

        let status = delete_asset(State(fx.state.clone()), Path("asset1".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_asset_never_known_is_404() {
        let fx = fixture().await;
        let err = delete_asset(State(fx.state.clone()), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_deleted_asset_reads_as_404() {
        let fx = fixture().await;
        seed_asset(&fx, "asset1").await;
        delete_asset(State(fx.state.clone()), Path("asset1".to_string()))
            .await
            .unwrap();

        let err = get_asset(State(fx.state.clone()), Path("asset1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = resize_asset(
            State(fx.state.clone()),
            Path("asset1".to_string()),
            Query(params(Some(10), None, None)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    fn params(width: Option<u32>, height: Option<u32>, quality: Option<u8>) -> ResizeParams {
        ResizeParams {
            width,
            height,
            quality,
        }
    }

    #[test]
    fn test_resize_needs_at_least_one_axis() {
        assert!(validate_resize_params(&params(None, None, None)).is_err());
        assert_eq!(
            validate_resize_params(&params(Some(100), None, None)).unwrap(),
            (100, u32::MAX)
        );
        assert_eq!(
            validate_resize_params(&params(None, Some(50), None)).unwrap(),
            (u32::MAX, 50)
        );
        assert_eq!(
            validate_resize_params(&params(Some(100), Some(50), None)).unwrap(),
            (100, 50)
        );
    }

    #[test]
    fn test_resize_rejects_out_of_range_axes() {
        assert!(validate_resize_params(&params(Some(0), Some(100), None)).is_err());
        assert!(validate_resize_params(&params(Some(100), Some(5000), None)).is_err());
    }

    #[test]
    fn test_resize_quality_range() {
        assert!(validate_resize_params(&params(Some(100), None, Some(85))).is_ok());
        assert!(validate_resize_params(&params(Some(100), None, Some(0))).is_err());
        assert!(validate_resize_params(&params(Some(100), None, Some(101))).is_err());
    }

    #[test]
    fn test_media_urls() {
        assert_eq!(media_url("abc.jpg"), "/media/abc.jpg");
        assert_eq!(media_url("abc_small.jpg"), "/media/abc_small.jpg");
    }
}
