//! Post models and the expiration state machine.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::asset::AssetId;

/// Seconds a post stays Active before the sweep expires it (24 hours).
pub const POST_TTL_SECS: i64 = 24 * 60 * 60;

/// Age in seconds (from creation) after which an Expired post is permanently
/// purged (7 days).
pub const PURGE_AFTER_SECS: i64 = 7 * 24 * 60 * 60;

/// Time a post stays Active before the sweep expires it.
pub fn post_ttl() -> Duration {
    Duration::seconds(POST_TTL_SECS)
}

/// Age (from creation) after which an Expired post is permanently purged.
pub fn purge_after() -> Duration {
    Duration::seconds(PURGE_AFTER_SECS)
}

/// Unique identifier for a post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    /// Generate a new random post ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PostId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Post lifecycle state.
///
/// Transitions are monotonic: Active → Expired → Purged, with the single
/// shortcut Active → Purged for an explicit user delete. The source system
/// encoded this implicitly as `isActive` + nullable `deletedAt`; here the
/// three states are explicit so a reverse transition cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostState {
    /// Visible in the feed
    #[default]
    Active,
    /// Soft-deleted: record and files retained, hidden from the feed
    Expired,
    /// Hard-deleted: record and files permanently removed
    Purged,
}

impl PostState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostState::Active => "active",
            PostState::Expired => "expired",
            PostState::Purged => "purged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PostState::Active),
            "expired" => Some(PostState::Expired),
            "purged" => Some(PostState::Purged),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `to` is legal.
    pub fn can_transition(&self, to: PostState) -> bool {
        matches!(
            (self, to),
            (PostState::Active, PostState::Expired)
                | (PostState::Active, PostState::Purged)
                | (PostState::Expired, PostState::Purged)
        )
    }

    /// No further transitions leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostState::Purged)
    }
}

impl fmt::Display for PostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempted illegal state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal post transition {from} -> {to}")]
pub struct TransitionError {
    pub from: PostState,
    pub to: PostState,
}

/// A feed post with a fixed expiry horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Unique post ID
    pub post_id: PostId,

    /// Author (user ID)
    pub author_id: String,

    /// Text content
    pub content: String,

    /// Lifecycle state
    #[serde(default)]
    pub state: PostState,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Fixed at creation: `created_at + 24h`
    pub expires_at: DateTime<Utc>,

    /// Set on the first non-Active transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    /// Assets owned by this post
    #[serde(default)]
    pub asset_ids: Vec<AssetId>,
}

impl Post {
    /// Create a new Active post.
    pub fn new(author_id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            post_id: PostId::new(),
            author_id: author_id.into(),
            content: content.into(),
            state: PostState::Active,
            created_at: now,
            expires_at: now + post_ttl(),
            deleted_at: None,
            asset_ids: Vec::new(),
        }
    }

    /// Attach owned assets.
    pub fn with_assets(mut self, asset_ids: Vec<AssetId>) -> Self {
        self.asset_ids = asset_ids;
        self
    }

    /// Apply a state transition, stamping `deleted_at` on the first
    /// non-Active transition.
    pub fn transition(&mut self, to: PostState, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.state.can_transition(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
        }
        Ok(())
    }

    /// Whether the expiry threshold has passed for a still-Active post.
    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        self.state == PostState::Active && now - self.created_at >= post_ttl()
    }

    /// Whether an Expired post has reached the purge threshold.
    ///
    /// Measured from `created_at`: a post created at T0 expires at T0+24h
    /// and is purged at T0+7d.
    pub fn is_due_for_purge(&self, now: DateTime<Utc>) -> bool {
        self.state == PostState::Expired && now - self.created_at >= purge_after()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_created_at(created_at: DateTime<Utc>) -> Post {
        let mut post = Post::new("author-1", "hello");
        post.created_at = created_at;
        post.expires_at = created_at + post_ttl();
        post
    }

    #[test]
    fn test_expires_at_fixed_at_creation() {
        let post = Post::new("author-1", "hello");
        assert_eq!(post.expires_at, post.created_at + Duration::hours(24));
    }

    #[test]
    fn test_legal_transitions() {
        assert!(PostState::Active.can_transition(PostState::Expired));
        assert!(PostState::Active.can_transition(PostState::Purged));
        assert!(PostState::Expired.can_transition(PostState::Purged));
    }

    #[test]
    fn test_reverse_transitions_rejected() {
        assert!(!PostState::Expired.can_transition(PostState::Active));
        assert!(!PostState::Purged.can_transition(PostState::Active));
        assert!(!PostState::Purged.can_transition(PostState::Expired));
        assert!(!PostState::Active.can_transition(PostState::Active));
    }

    #[test]
    fn test_transition_stamps_deleted_at_once() {
        let mut post = Post::new("author-1", "hello");
        let t1 = Utc::now();
        post.transition(PostState::Expired, t1).unwrap();
        assert_eq!(post.deleted_at, Some(t1));

        let t2 = t1 + Duration::days(6);
        post.transition(PostState::Purged, t2).unwrap();
        // First stamp wins
        assert_eq!(post.deleted_at, Some(t1));
    }

    #[test]
    fn test_illegal_transition_errors() {
        let mut post = Post::new("author-1", "hello");
        let now = Utc::now();
        post.transition(PostState::Purged, now).unwrap();
        let err = post.transition(PostState::Expired, now).unwrap_err();
        assert_eq!(err.from, PostState::Purged);
        assert_eq!(err.to, PostState::Expired);
    }

    #[test]
    fn test_expiry_threshold_boundaries() {
        let now = Utc::now();

        let fresh = post_created_at(now - Duration::hours(23) - Duration::minutes(59));
        assert!(!fresh.is_due_for_expiry(now));

        let due = post_created_at(now - Duration::hours(24) - Duration::minutes(1));
        assert!(due.is_due_for_expiry(now));

        let exact = post_created_at(now - Duration::hours(24));
        assert!(exact.is_due_for_expiry(now));
    }

    #[test]
    fn test_purge_threshold_measured_from_creation() {
        let now = Utc::now();
        let mut post = post_created_at(now - Duration::days(7) - Duration::minutes(1));
        post.transition(PostState::Expired, now - Duration::days(6)).unwrap();
        assert!(post.is_due_for_purge(now));

        let mut young = post_created_at(now - Duration::days(6));
        young.transition(PostState::Expired, now - Duration::days(5)).unwrap();
        assert!(!young.is_due_for_purge(now));
    }

    #[test]
    fn test_active_posts_never_purge_eligible() {
        let now = Utc::now();
        let post = post_created_at(now - Duration::days(30));
        assert!(!post.is_due_for_purge(now));
    }
}
