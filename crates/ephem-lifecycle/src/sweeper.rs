//! Two-phase post expiration sweep.
//!
//! Phase one soft-deletes: Active posts past their 24-hour horizon become
//! Expired via compare-and-set, so concurrent sweepers expire each post
//! once. Phase two hard-deletes: Expired posts past the 7-day horizon have
//! their asset files reaped and their catalog records removed; only once
//! every asset is fully gone is the post record deleted, so a dirty reap
//! keeps the post visible to the next sweep. Afterwards every affected
//! author's active-post counter is recomputed from scratch.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use ephem_models::{LifecycleStats, Post, PostState, SweepReport};
use ephem_storage::AssetReaper;
use ephem_store::{AssetCatalog, AuthorStore, PostStore, StoreError};

/// Metric names emitted by the sweeper.
pub mod metric_names {
    pub const POSTS_EXPIRED_TOTAL: &str = "ephem_posts_expired_total";
    pub const POSTS_PURGED_TOTAL: &str = "ephem_posts_purged_total";
    pub const AUTHOR_COUNTERS_SYNCED_TOTAL: &str = "ephem_author_counters_synced_total";
    pub const SWEEP_RUNS_TOTAL: &str = "ephem_sweep_runs_total";
}

/// Errors that can abort a sweep pass.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Runs the two-phase sweep against the stores.
pub struct LifecycleSweeper {
    posts: Arc<dyn PostStore>,
    authors: Arc<dyn AuthorStore>,
    assets: Arc<dyn AssetCatalog>,
    reaper: AssetReaper,
    /// Window for the "nearing expiry" statistic.
    expiring_window: Duration,
}

impl LifecycleSweeper {
    pub fn new(
        posts: Arc<dyn PostStore>,
        authors: Arc<dyn AuthorStore>,
        assets: Arc<dyn AssetCatalog>,
        reaper: AssetReaper,
        expiring_window: Duration,
    ) -> Self {
        Self {
            posts,
            authors,
            assets,
            reaper,
            expiring_window,
        }
    }

    /// Run one sweep pass at the current time.
    pub async fn sweep(&self) -> Result<SweepReport, SweepError> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep pass evaluated at `now`.
    ///
    /// Idempotent: running twice at the same instant changes nothing the
    /// second time, and a sweep over an empty or fully current store is a
    /// no-op.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let mut affected_authors: BTreeSet<String> = BTreeSet::new();

        let soft_deleted = self.expire_phase(now, &mut affected_authors).await?;
        let hard_deleted = self.purge_phase(now, &mut affected_authors).await?;
        let users_updated = self.sync_counters(&affected_authors).await?;

        let report = SweepReport {
            soft_deleted,
            hard_deleted,
            users_updated,
        };

        counter!(metric_names::SWEEP_RUNS_TOTAL).increment(1);
        counter!(metric_names::POSTS_EXPIRED_TOTAL).increment(report.soft_deleted);
        counter!(metric_names::POSTS_PURGED_TOTAL).increment(report.hard_deleted);
        counter!(metric_names::AUTHOR_COUNTERS_SYNCED_TOTAL).increment(report.users_updated);

        if report.is_noop() {
            info!("sweep complete: nothing to do");
        } else {
            info!(
                soft_deleted = report.soft_deleted,
                hard_deleted = report.hard_deleted,
                users_updated = report.users_updated,
                "sweep complete"
            );
        }
        Ok(report)
    }

    /// Point-in-time statistics for the admin surface.
    pub async fn stats(&self) -> Result<LifecycleStats, SweepError> {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<LifecycleStats, SweepError> {
        let active_posts = self.posts.count_by_state(PostState::Active).await?;
        let expired_posts = self.posts.count_by_state(PostState::Expired).await?;
        let posts_nearing_expiry = self
            .posts
            .count_expiring_within(now, self.expiring_window)
            .await?;
        let posts_eligible_for_purge = self.posts.list_due_for_purge(now).await?.len() as u64;

        Ok(LifecycleStats {
            active_posts,
            expired_posts,
            posts_nearing_expiry,
            posts_eligible_for_purge,
        })
    }

    async fn expire_phase(
        &self,
        now: DateTime<Utc>,
        affected_authors: &mut BTreeSet<String>,
    ) -> Result<u64, SweepError> {
        let due = self.posts.list_due_for_expiry(now).await?;
        let mut expired = 0u64;

        for post in due {
            let won = self
                .posts
                .transition(&post.post_id, PostState::Active, PostState::Expired, now)
                .await?;
            if won {
                expired += 1;
                affected_authors.insert(post.author_id.clone());
            }
        }
        Ok(expired)
    }

    async fn purge_phase(
        &self,
        now: DateTime<Utc>,
        affected_authors: &mut BTreeSet<String>,
    ) -> Result<u64, SweepError> {
        let due = self.posts.list_due_for_purge(now).await?;
        let mut purged = 0u64;

        for post in due {
            // Files and catalog records go first. The post record is only
            // removed once every asset came back clean; otherwise it stays
            // Expired and the next sweep retries the whole purge.
            if !self.purge_assets(&post).await {
                continue;
            }

            let won = self
                .posts
                .transition(&post.post_id, PostState::Expired, PostState::Purged, now)
                .await?;
            if !won {
                continue;
            }

            self.posts.delete(&post.post_id).await?;
            purged += 1;
            affected_authors.insert(post.author_id.clone());
        }
        Ok(purged)
    }

    /// Remove a post's asset files and catalog records.
    ///
    /// Each asset is handled independently and files already gone from a
    /// previous partial purge are fine. Returns `false` when any asset
    /// could not be fully removed, so the caller keeps the post record.
    async fn purge_assets(&self, post: &Post) -> bool {
        let mut clean = true;
        for asset_id in &post.asset_ids {
            match self.assets.get(asset_id).await {
                Ok(Some(asset)) => {
                    let reap = self.reaper.reap(&asset).await;
                    if !reap.is_clean() {
                        warn!(
                            post_id = %post.post_id,
                            asset_id = %asset_id,
                            failed = reap.failed,
                            "asset files left behind, post kept for retry"
                        );
                        clean = false;
                        continue;
                    }
                    if let Err(e) = self.assets.delete(asset_id).await {
                        warn!(asset_id = %asset_id, error = %e, "failed to delete asset record");
                        clean = false;
                    }
                }
                Ok(None) => {
                    // Already purged, or the asset was deleted directly.
                }
                Err(e) => {
                    warn!(asset_id = %asset_id, error = %e, "failed to load asset for purge");
                    clean = false;
                }
            }
        }
        clean
    }

    /// Recompute the active-post counter for every affected author.
    ///
    /// Full recompute rather than increments: whatever the stored value
    /// was, it converges to the true count.
    async fn sync_counters(&self, affected_authors: &BTreeSet<String>) -> Result<u64, SweepError> {
        let mut updated = 0u64;
        for author_id in affected_authors {
            let count = self.posts.count_active_by_author(author_id).await?;
            self.authors.set_post_count(author_id, count).await?;
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephem_models::{post_ttl, Asset, AssetId, Derivative, ImageFormat, Post};
    use ephem_storage::DiskStore;
    use ephem_store::{MemoryAssetCatalog, MemoryAuthorStore, MemoryPostStore};

    struct Fixture {
        posts: Arc<MemoryPostStore>,
        authors: Arc<MemoryAuthorStore>,
        assets: Arc<MemoryAssetCatalog>,
        disk: DiskStore,
        sweeper: LifecycleSweeper,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskStore::open(dir.path()).await.unwrap();
        let posts = Arc::new(MemoryPostStore::new());
        let authors = Arc::new(MemoryAuthorStore::new());
        let assets = Arc::new(MemoryAssetCatalog::new());
        let sweeper = LifecycleSweeper::new(
            posts.clone(),
            authors.clone(),
            assets.clone(),
            AssetReaper::new(disk.clone()),
            Duration::hours(1),
        );
        Fixture {
            posts,
            authors,
            assets,
            disk,
            sweeper,
            _dir: dir,
        }
    }

    fn post_created_at(author: &str, created_at: DateTime<Utc>) -> Post {
        let mut post = Post::new(author, "content");
        post.created_at = created_at;
        post.expires_at = created_at + post_ttl();
        post
    }

    async fn seed_asset(fx: &Fixture, post: &mut Post, id: &str) {
        let asset_id = AssetId::from_string(id);
        let mut asset = Asset::new(
            asset_id.clone(),
            format!("{id}.jpg"),
            ImageFormat::Jpeg,
            64,
        )
        .owned_by(post.post_id.clone());
        fx.disk.write(&format!("{id}.jpg"), b"orig").await.unwrap();
        for profile in ["small", "medium", "large"] {
            let key = format!("{id}_{profile}.jpg");
            fx.disk.write(&key, b"drv").await.unwrap();
            asset.add_derivative(
                profile,
                Derivative {
                    key,
                    width: 1,
                    height: 1,
                },
            );
        }
        fx.assets.put(&asset).await.unwrap();
        post.asset_ids.push(asset_id);
    }

    #[tokio::test]
    async fn test_sweep_on_empty_store_is_noop() {
        let fx = fixture().await;
        let report = fx.sweeper.sweep_at(Utc::now()).await.unwrap();
        assert!(report.is_noop());
    }

    #[tokio::test]
    async fn test_expiry_respects_threshold_exactly() {
        let fx = fixture().await;
        let now = Utc::now();

        let fresh = post_created_at("u1", now - Duration::hours(23) - Duration::minutes(59));
        let due = post_created_at("u1", now - Duration::hours(24) - Duration::minutes(1));
        fx.posts.create(&fresh).await.unwrap();
        fx.posts.create(&due).await.unwrap();

        let report = fx.sweeper.sweep_at(now).await.unwrap();
        assert_eq!(report.soft_deleted, 1);
        assert_eq!(report.hard_deleted, 0);
        assert_eq!(report.users_updated, 1);

        let fresh_after = fx.posts.get(&fresh.post_id).await.unwrap().unwrap();
        assert_eq!(fresh_after.state, PostState::Active);
        let due_after = fx.posts.get(&due.post_id).await.unwrap().unwrap();
        assert_eq!(due_after.state, PostState::Expired);
        assert!(due_after.deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let fx = fixture().await;
        let now = Utc::now();
        fx.posts
            .create(&post_created_at("u1", now - Duration::hours(30)))
            .await
            .unwrap();

        let first = fx.sweeper.sweep_at(now).await.unwrap();
        assert_eq!(first.soft_deleted, 1);

        let second = fx.sweeper.sweep_at(now).await.unwrap();
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn test_purge_removes_record_files_and_catalog_entries() {
        let fx = fixture().await;
        let now = Utc::now();

        let mut post = post_created_at("u1", now - Duration::days(8));
        seed_asset(&fx, &mut post, "asset1").await;
        post.transition(PostState::Expired, now - Duration::days(7))
            .unwrap();
        fx.posts.create(&post).await.unwrap();

        let report = fx.sweeper.sweep_at(now).await.unwrap();
        assert_eq!(report.hard_deleted, 1);

        assert!(fx.posts.get(&post.post_id).await.unwrap().is_none());
        assert!(fx
            .assets
            .get(&AssetId::from_string("asset1"))
            .await
            .unwrap()
            .is_none());
        assert!(!fx.disk.exists("asset1.jpg").await.unwrap());
        assert!(!fx.disk.exists("asset1_small.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_tolerates_missing_files() {
        let fx = fixture().await;
        let now = Utc::now();

        let mut post = post_created_at("u1", now - Duration::days(8));
        seed_asset(&fx, &mut post, "asset1").await;
        post.transition(PostState::Expired, now - Duration::days(7))
            .unwrap();
        fx.posts.create(&post).await.unwrap();

        // Simulate a crashed earlier purge that removed some files.
        fx.disk.delete("asset1.jpg").await.unwrap();
        fx.disk.delete("asset1_medium.jpg").await.unwrap();

        let report = fx.sweeper.sweep_at(now).await.unwrap();
        assert_eq!(report.hard_deleted, 1);
        assert!(fx.posts.get(&post.post_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dirty_reap_keeps_post_for_retry() {
        let fx = fixture().await;
        let now = Utc::now();

        let mut post = post_created_at("u1", now - Duration::days(8));
        seed_asset(&fx, &mut post, "asset1").await;
        post.transition(PostState::Expired, now - Duration::days(7))
            .unwrap();
        fx.posts.create(&post).await.unwrap();

        // A directory squatting on a derivative key makes remove_file fail.
        fx.disk.delete("asset1_small.jpg").await.unwrap();
        std::fs::create_dir(fx._dir.path().join("asset1_small.jpg")).unwrap();

        let report = fx.sweeper.sweep_at(now).await.unwrap();
        assert_eq!(report.hard_deleted, 0);

        // Post record, catalog record and remaining files all survive.
        let kept = fx.posts.get(&post.post_id).await.unwrap().unwrap();
        assert_eq!(kept.state, PostState::Expired);
        assert!(fx
            .assets
            .get(&AssetId::from_string("asset1"))
            .await
            .unwrap()
            .is_some());

        // With the obstruction gone the next sweep finishes the purge.
        std::fs::remove_dir(fx._dir.path().join("asset1_small.jpg")).unwrap();
        let report = fx.sweeper.sweep_at(now).await.unwrap();
        assert_eq!(report.hard_deleted, 1);
        assert!(fx.posts.get(&post.post_id).await.unwrap().is_none());
        assert!(fx
            .assets
            .get(&AssetId::from_string("asset1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_counter_sync_converges_from_any_value() {
        let fx = fixture().await;
        let now = Utc::now();

        // Author has one post that will expire and one that stays active.
        fx.posts
            .create(&post_created_at("u1", now - Duration::hours(30)))
            .await
            .unwrap();
        fx.posts
            .create(&post_created_at("u1", now - Duration::hours(2)))
            .await
            .unwrap();

        // Drifted counter from some earlier bug.
        fx.authors.set_post_count("u1", 99).await.unwrap();

        fx.sweeper.sweep_at(now).await.unwrap();
        assert_eq!(fx.authors.get_post_count("u1").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_full_lifecycle_scenario() {
        let fx = fixture().await;
        let t0 = Utc::now() - Duration::days(10);

        let mut post = post_created_at("u1", t0);
        seed_asset(&fx, &mut post, "asset1").await;
        fx.posts.create(&post).await.unwrap();

        // Just before expiry: untouched.
        let report = fx
            .sweeper
            .sweep_at(t0 + Duration::hours(23))
            .await
            .unwrap();
        assert!(report.is_noop());

        // Just past 24h: soft-deleted, files still present.
        let report = fx
            .sweeper
            .sweep_at(t0 + Duration::hours(24) + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(report.soft_deleted, 1);
        assert!(fx.disk.exists("asset1.jpg").await.unwrap());
        assert_eq!(
            fx.posts.get(&post.post_id).await.unwrap().unwrap().state,
            PostState::Expired
        );

        // Just past 7 days: hard-deleted, everything gone.
        let report = fx
            .sweeper
            .sweep_at(t0 + Duration::days(7) + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(report.hard_deleted, 1);
        assert!(fx.posts.get(&post.post_id).await.unwrap().is_none());
        assert!(!fx.disk.exists("asset1.jpg").await.unwrap());
        assert_eq!(fx.authors.get_post_count("u1").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let fx = fixture().await;
        let now = Utc::now();

        // Active, far from expiry.
        fx.posts
            .create(&post_created_at("u1", now - Duration::hours(2)))
            .await
            .unwrap();
        // Active, expiring within the hour.
        fx.posts
            .create(&post_created_at("u2", now - Duration::hours(23) - Duration::minutes(40)))
            .await
            .unwrap();
        // Expired, past purge threshold.
        let mut old = post_created_at("u3", now - Duration::days(8));
        old.transition(PostState::Expired, now - Duration::days(7))
            .unwrap();
        fx.posts.create(&old).await.unwrap();

        let stats = fx.sweeper.stats_at(now).await.unwrap();
        assert_eq!(stats.active_posts, 2);
        assert_eq!(stats.expired_posts, 1);
        assert_eq!(stats.posts_nearing_expiry, 1);
        assert_eq!(stats.posts_eligible_for_purge, 1);
    }
}
