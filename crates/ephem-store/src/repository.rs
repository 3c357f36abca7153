//! Store traits for posts, author counters and the asset catalog.
//!
//! The lifecycle sweeper and the API handlers work against these traits;
//! production wires the Firestore implementations and tests use the
//! in-memory ones.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use ephem_models::{Asset, AssetId, Post, PostId, PostState};

use crate::error::StoreResult;

/// Post record store.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a new post.
    async fn create(&self, post: &Post) -> StoreResult<()>;

    /// Fetch a post by ID.
    async fn get(&self, id: &PostId) -> StoreResult<Option<Post>>;

    /// Active posts whose expiry threshold has passed.
    async fn list_due_for_expiry(&self, now: DateTime<Utc>) -> StoreResult<Vec<Post>>;

    /// Expired posts whose purge threshold has passed.
    async fn list_due_for_purge(&self, now: DateTime<Utc>) -> StoreResult<Vec<Post>>;

    /// Compare-and-set state transition.
    ///
    /// Succeeds only if the post still is in `from` when the write lands;
    /// returns `false` when the post is missing or another writer got there
    /// first. `deleted_at` is stamped with `now` on the first transition
    /// away from Active.
    async fn transition(
        &self,
        id: &PostId,
        from: PostState,
        to: PostState,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Remove a post record. Absence is not an error.
    async fn delete(&self, id: &PostId) -> StoreResult<()>;

    /// Count posts currently in a state.
    async fn count_by_state(&self, state: PostState) -> StoreResult<u64>;

    /// Count Active posts by a single author.
    async fn count_active_by_author(&self, author_id: &str) -> StoreResult<u64>;

    /// Count Active posts expiring within `window` of `now`.
    async fn count_expiring_within(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<u64>;
}

/// Per-author denormalized counters.
#[async_trait]
pub trait AuthorStore: Send + Sync {
    /// Overwrite an author's active-post counter.
    async fn set_post_count(&self, author_id: &str, count: u64) -> StoreResult<()>;

    /// Read an author's active-post counter, if the author record exists.
    async fn get_post_count(&self, author_id: &str) -> StoreResult<Option<u64>>;
}

/// Asset metadata catalog.
#[async_trait]
pub trait AssetCatalog: Send + Sync {
    /// Insert or replace an asset record.
    async fn put(&self, asset: &Asset) -> StoreResult<()>;

    /// Fetch an asset record by ID.
    async fn get(&self, id: &AssetId) -> StoreResult<Option<Asset>>;

    /// Remove an asset record. Absence is not an error.
    async fn delete(&self, id: &AssetId) -> StoreResult<()>;
}
