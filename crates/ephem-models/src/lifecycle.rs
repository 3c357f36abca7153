//! Lifecycle sweep reports and statistics.

use serde::{Deserialize, Serialize};

/// Outcome of one sweep pass, returned by the sweeper and the run-now
/// endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Posts transitioned Active -> Expired.
    pub soft_deleted: u64,
    /// Posts transitioned Expired -> Purged (record and files removed).
    pub hard_deleted: u64,
    /// Distinct authors whose post counters were recomputed.
    pub users_updated: u64,
}

impl SweepReport {
    /// Whether the sweep changed anything.
    pub fn is_noop(&self) -> bool {
        self.soft_deleted == 0 && self.hard_deleted == 0 && self.users_updated == 0
    }
}

/// Point-in-time lifecycle statistics for the admin surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleStats {
    /// Posts currently Active.
    pub active_posts: u64,
    /// Posts currently Expired and awaiting purge.
    pub expired_posts: u64,
    /// Active posts whose expiry falls within the next sweep interval.
    pub posts_nearing_expiry: u64,
    /// Expired posts already past the purge threshold.
    pub posts_eligible_for_purge: u64,
}
