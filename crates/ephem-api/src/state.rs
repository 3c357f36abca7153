//! Application state.

use std::sync::Arc;

use chrono::Duration;

use ephem_lifecycle::LifecycleSweeper;
use ephem_models::{default_profiles, SizeProfile};
use ephem_storage::{AssetReaper, DiskStore};
use ephem_store::{
    AssetCatalog, AuthorStore, FirestoreAssetCatalog, FirestoreAuthorStore, FirestorePostStore,
    MemoryAssetCatalog, MemoryAuthorStore, MemoryPostStore, PostStore, StoreClient,
};

use crate::config::{ApiConfig, StoreBackend};
use crate::services::AssetIngestor;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub disk: DiskStore,
    pub posts: Arc<dyn PostStore>,
    pub authors: Arc<dyn AuthorStore>,
    pub assets: Arc<dyn AssetCatalog>,
    pub reaper: AssetReaper,
    pub ingestor: AssetIngestor,
    pub sweeper: Arc<LifecycleSweeper>,
    pub profiles: Vec<SizeProfile>,
}

impl AppState {
    /// Create application state, wiring the configured store backend.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let disk = DiskStore::open(config.storage_root.clone()).await?;

        let (posts, authors, assets): (
            Arc<dyn PostStore>,
            Arc<dyn AuthorStore>,
            Arc<dyn AssetCatalog>,
        ) = match config.store_backend {
            StoreBackend::Firestore => {
                let client = StoreClient::from_env().await?;
                (
                    Arc::new(FirestorePostStore::new(client.clone())),
                    Arc::new(FirestoreAuthorStore::new(client.clone())),
                    Arc::new(FirestoreAssetCatalog::new(client)),
                )
            }
            StoreBackend::Memory => (
                Arc::new(MemoryPostStore::new()),
                Arc::new(MemoryAuthorStore::new()),
                Arc::new(MemoryAssetCatalog::new()),
            ),
        };

        Ok(Self::with_stores(config, disk, posts, authors, assets))
    }

    /// Assemble state from already-built stores. Used by tests and by
    /// `new` once the backend is chosen.
    pub fn with_stores(
        config: ApiConfig,
        disk: DiskStore,
        posts: Arc<dyn PostStore>,
        authors: Arc<dyn AuthorStore>,
        assets: Arc<dyn AssetCatalog>,
    ) -> Self {
        let profiles = default_profiles();
        let reaper = AssetReaper::new(disk.clone());
        let ingestor = AssetIngestor::new(
            disk.clone(),
            assets.clone(),
            profiles.clone(),
            config.max_upload_size,
        );
        let sweeper = Arc::new(LifecycleSweeper::new(
            posts.clone(),
            authors.clone(),
            assets.clone(),
            reaper.clone(),
            Duration::hours(1),
        ));

        Self {
            config,
            disk,
            posts,
            authors,
            assets,
            reaper,
            ingestor,
            sweeper,
            profiles,
        }
    }
}
