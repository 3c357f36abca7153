//! In-memory store implementations.
//!
//! Replaces the legacy process-global mutable list behind the same traits
//! the Firestore stores implement. Also the test double for the sweeper
//! and the API handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use ephem_models::{Asset, AssetId, Post, PostId, PostState};

use crate::error::StoreResult;
use crate::repository::{AssetCatalog, AuthorStore, PostStore};

/// In-memory post store.
#[derive(Clone, Default)]
pub struct MemoryPostStore {
    posts: Arc<RwLock<HashMap<PostId, Post>>>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, whatever their state.
    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.posts.read().await.is_empty()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn create(&self, post: &Post) -> StoreResult<()> {
        self.posts
            .write()
            .await
            .insert(post.post_id.clone(), post.clone());
        Ok(())
    }

    async fn get(&self, id: &PostId) -> StoreResult<Option<Post>> {
        Ok(self.posts.read().await.get(id).cloned())
    }

    async fn list_due_for_expiry(&self, now: DateTime<Utc>) -> StoreResult<Vec<Post>> {
        Ok(self
            .posts
            .read()
            .await
            .values()
            .filter(|p| p.is_due_for_expiry(now))
            .cloned()
            .collect())
    }

    async fn list_due_for_purge(&self, now: DateTime<Utc>) -> StoreResult<Vec<Post>> {
        Ok(self
            .posts
            .read()
            .await
            .values()
            .filter(|p| p.is_due_for_purge(now))
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        id: &PostId,
        from: PostState,
        to: PostState,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut posts = self.posts.write().await;
        let Some(post) = posts.get_mut(id) else {
            return Ok(false);
        };
        if post.state != from {
            return Ok(false);
        }
        Ok(post.transition(to, now).is_ok())
    }

    async fn delete(&self, id: &PostId) -> StoreResult<()> {
        self.posts.write().await.remove(id);
        Ok(())
    }

    async fn count_by_state(&self, state: PostState) -> StoreResult<u64> {
        Ok(self
            .posts
            .read()
            .await
            .values()
            .filter(|p| p.state == state)
            .count() as u64)
    }

    async fn count_active_by_author(&self, author_id: &str) -> StoreResult<u64> {
        Ok(self
            .posts
            .read()
            .await
            .values()
            .filter(|p| p.state == PostState::Active && p.author_id == author_id)
            .count() as u64)
    }

    async fn count_expiring_within(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<u64> {
        let cutoff = now + window;
        Ok(self
            .posts
            .read()
            .await
            .values()
            .filter(|p| p.state == PostState::Active && p.expires_at > now && p.expires_at <= cutoff)
            .count() as u64)
    }
}

/// In-memory author counter store.
#[derive(Clone, Default)]
pub struct MemoryAuthorStore {
    counts: Arc<RwLock<HashMap<String, u64>>>,
}

impl MemoryAuthorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorStore for MemoryAuthorStore {
    async fn set_post_count(&self, author_id: &str, count: u64) -> StoreResult<()> {
        self.counts
            .write()
            .await
            .insert(author_id.to_string(), count);
        Ok(())
    }

    async fn get_post_count(&self, author_id: &str) -> StoreResult<Option<u64>> {
        Ok(self.counts.read().await.get(author_id).copied())
    }
}

/// In-memory asset catalog.
#[derive(Clone, Default)]
pub struct MemoryAssetCatalog {
    assets: Arc<RwLock<HashMap<AssetId, Asset>>>,
}

impl MemoryAssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetCatalog for MemoryAssetCatalog {
    async fn put(&self, asset: &Asset) -> StoreResult<()> {
        self.assets
            .write()
            .await
            .insert(asset.asset_id.clone(), asset.clone());
        Ok(())
    }

    async fn get(&self, id: &AssetId) -> StoreResult<Option<Asset>> {
        Ok(self.assets.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &AssetId) -> StoreResult<()> {
        self.assets.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_created_at(author: &str, created_at: DateTime<Utc>) -> Post {
        let mut post = Post::new(author, "content");
        post.created_at = created_at;
        post.expires_at = created_at + ephem_models::post_ttl();
        post
    }

    #[tokio::test]
    async fn test_due_listings_respect_state_and_age() {
        let store = MemoryPostStore::new();
        let now = Utc::now();

        let fresh = post_created_at("a", now - Duration::hours(1));
        let stale = post_created_at("a", now - Duration::hours(25));
        let mut ancient = post_created_at("a", now - Duration::days(8));
        ancient
            .transition(PostState::Expired, now - Duration::days(7))
            .unwrap();

        store.create(&fresh).await.unwrap();
        store.create(&stale).await.unwrap();
        store.create(&ancient).await.unwrap();

        let due_expiry = store.list_due_for_expiry(now).await.unwrap();
        assert_eq!(due_expiry.len(), 1);
        assert_eq!(due_expiry[0].post_id, stale.post_id);

        let due_purge = store.list_due_for_purge(now).await.unwrap();
        assert_eq!(due_purge.len(), 1);
        assert_eq!(due_purge[0].post_id, ancient.post_id);
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = MemoryPostStore::new();
        let now = Utc::now();
        let post = post_created_at("a", now - Duration::hours(25));
        store.create(&post).await.unwrap();

        // First writer wins
        assert!(store
            .transition(&post.post_id, PostState::Active, PostState::Expired, now)
            .await
            .unwrap());
        // Second writer observes the state change and loses
        assert!(!store
            .transition(&post.post_id, PostState::Active, PostState::Expired, now)
            .await
            .unwrap());

        let stored = store.get(&post.post_id).await.unwrap().unwrap();
        assert_eq!(stored.state, PostState::Expired);
        assert_eq!(stored.deleted_at, Some(now));
    }

    #[tokio::test]
    async fn test_transition_missing_post() {
        let store = MemoryPostStore::new();
        assert!(!store
            .transition(
                &PostId::from_string("nope"),
                PostState::Active,
                PostState::Expired,
                Utc::now()
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expiring_within_window() {
        let store = MemoryPostStore::new();
        let now = Utc::now();

        // Expires in 30 minutes
        let soon = post_created_at("a", now - Duration::hours(23) - Duration::minutes(30));
        // Expires in 10 hours
        let later = post_created_at("a", now - Duration::hours(14));
        store.create(&soon).await.unwrap();
        store.create(&later).await.unwrap();

        assert_eq!(
            store
                .count_expiring_within(now, Duration::hours(1))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_author_counts() {
        let authors = MemoryAuthorStore::new();
        assert_eq!(authors.get_post_count("u1").await.unwrap(), None);
        authors.set_post_count("u1", 3).await.unwrap();
        assert_eq!(authors.get_post_count("u1").await.unwrap(), Some(3));
        authors.set_post_count("u1", 0).await.unwrap();
        assert_eq!(authors.get_post_count("u1").await.unwrap(), Some(0));
    }
}
