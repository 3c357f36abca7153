//! Purge-time file removal.
//!
//! The reaper deletes every file belonging to an asset: the original and
//! one rendition per profile. A file that is already gone counts as removed
//! for idempotency; only an actual filesystem failure marks the reap dirty.

use tracing::{info, warn};

use ephem_models::Asset;

use crate::disk::DiskStore;
use crate::error::StorageResult;

/// Summary of one asset reap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Files removed from disk.
    pub removed: u64,
    /// Files already absent (a previous partial purge, or a crash mid-reap).
    pub already_absent: u64,
    /// Files that could not be removed.
    pub failed: u64,
}

impl ReapReport {
    /// Whether every file is now gone.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn absorb(&mut self, outcome: StorageResult<bool>, key: &str) {
        match outcome {
            Ok(true) => self.removed += 1,
            Ok(false) => self.already_absent += 1,
            Err(e) => {
                warn!(key, error = %e, "failed to remove asset file");
                self.failed += 1;
            }
        }
    }
}

/// Deletes asset files at purge time.
#[derive(Debug, Clone)]
pub struct AssetReaper {
    store: DiskStore,
}

impl AssetReaper {
    pub fn new(store: DiskStore) -> Self {
        Self { store }
    }

    /// Remove the original and every recorded derivative of an asset.
    ///
    /// Never fails as a whole: individual failures are counted and logged
    /// so a later sweep can retry the leftovers.
    pub async fn reap(&self, asset: &Asset) -> ReapReport {
        let mut report = ReapReport::default();

        report.absorb(self.store.delete(&asset.original_key).await, &asset.original_key);
        for derivative in asset.derivatives.values() {
            report.absorb(self.store.delete(&derivative.key).await, &derivative.key);
        }

        info!(
            asset_id = %asset.asset_id,
            removed = report.removed,
            already_absent = report.already_absent,
            failed = report.failed,
            "reaped asset files"
        );
        report
    }
}
