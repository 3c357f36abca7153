//! Post API handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use tracing::info;

use ephem_models::{PostId, PostState};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Explicit user delete: the post skips straight to Purged.
///
/// Asset files and catalog records are removed first; the post record and
/// the author counter are only touched once every asset came back clean,
/// so a failed delete leaves the post intact for a retry. Deleting a post
/// that was already purged (or never existed) is a 404.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = PostId::from_string(&post_id);
    let post = state
        .posts
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("post {post_id}")))?;

    for asset_id in &post.asset_ids {
        if let Some(asset) = state.assets.get(asset_id).await? {
            let reap = state.reaper.reap(&asset).await;
            if !reap.is_clean() {
                // Everything kept so the whole delete can be retried.
                return Err(ApiError::internal(format!(
                    "failed to remove {} file(s) for asset {asset_id}, retry the delete",
                    reap.failed
                )));
            }
            state.assets.delete(asset_id).await?;
        }
    }

    let now = Utc::now();
    let won = state
        .posts
        .transition(&id, post.state, PostState::Purged, now)
        .await?;
    if !won {
        return Err(ApiError::Conflict(format!(
            "post {post_id} changed concurrently, retry"
        )));
    }

    state.posts.delete(&id).await?;

    let count = state.posts.count_active_by_author(&post.author_id).await?;
    state.authors.set_post_count(&post.author_id, count).await?;

    info!(post_id = %id, author_id = %post.author_id, "deleted post");
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ephem_models::{Asset, AssetId, Derivative, ImageFormat, Post};
    use ephem_storage::DiskStore;
    use ephem_store::{
        AssetCatalog, AuthorStore, MemoryAssetCatalog, MemoryAuthorStore, MemoryPostStore,
        PostStore,
    };

    use crate::config::ApiConfig;

    struct Fixture {
        posts: Arc<MemoryPostStore>,
        authors: Arc<MemoryAuthorStore>,
        assets: Arc<MemoryAssetCatalog>,
        disk: DiskStore,
        state: AppState,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskStore::open(dir.path()).await.unwrap();
        let posts = Arc::new(MemoryPostStore::new());
        let authors = Arc::new(MemoryAuthorStore::new());
        let assets = Arc::new(MemoryAssetCatalog::new());
        let state = AppState::with_stores(
            ApiConfig::default(),
            disk.clone(),
            posts.clone(),
            authors.clone(),
            assets.clone(),
        );
        Fixture {
            posts,
            authors,
            assets,
            disk,
            state,
            _dir: dir,
        }
    }

    async fn seed_post_with_asset(fx: &Fixture, author: &str, asset_id: &str) -> Post {
        let mut post = Post::new(author, "content");
        let id = AssetId::from_string(asset_id);
        let mut asset = Asset::new(
            id.clone(),
            format!("{asset_id}.jpg"),
            ImageFormat::Jpeg,
            64,
        )
        .owned_by(post.post_id.clone());
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
        post.asset_ids.push(id);
        fx.posts.create(&post).await.unwrap();
        post
    }

    #[tokio::test]
    async fn test_delete_post_removes_everything() {
        let fx = fixture().await;
        let post = seed_post_with_asset(&fx, "u1", "asset1").await;

        let status = delete_post(State(fx.state.clone()), Path(post.post_id.to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);

        assert!(fx.posts.get(&post.post_id).await.unwrap().is_none());
        assert!(fx
            .assets
            .get(&AssetId::from_string("asset1"))
            .await
            .unwrap()
            .is_none());
        assert!(!fx.disk.exists("asset1.jpg").await.unwrap());
        assert_eq!(fx.authors.get_post_count("u1").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_delete_post_unknown_is_404() {
        let fx = fixture().await;
        let err = delete_post(State(fx.state.clone()), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_dirty_reap_leaves_post_intact() {
        let fx = fixture().await;
        let post = seed_post_with_asset(&fx, "u1", "asset1").await;

        // A directory squatting on a derivative key makes remove_file fail.
        fx.disk.delete("asset1_small.jpg").await.unwrap();
        std::fs::create_dir(fx._dir.path().join("asset1_small.jpg")).unwrap();

        let err = delete_post(State(fx.state.clone()), Path(post.post_id.to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));

        // Post and catalog record both survive for the retry.
        let kept = fx.posts.get(&post.post_id).await.unwrap().unwrap();
        assert_eq!(kept.state, PostState::Active);
        assert!(fx
            .assets
            .get(&AssetId::from_string("asset1"))
            .await
            .unwrap()
            .is_some());

        // Retry succeeds once the obstruction is gone.
        std::fs::remove_dir(fx._dir.path().join("asset1_small.jpg")).unwrap();
        let status = delete_post(State(fx.state.clone()), Path(post.post_id.to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(fx.posts.get(&post.post_id).await.unwrap().is_none());
    }
}
