//! Shared data models for the ephem backend.
//!
//! This crate provides Serde-serializable types for:
//! - Assets and their derived renditions
//! - Posts and the Active/Expired/Purged state machine
//! - Size profiles for derivative generation
//! - Lifecycle sweep reports and statistics

pub mod asset;
pub mod lifecycle;
pub mod post;
pub mod profile;

// Re-export common types
pub use asset::{Asset, AssetId, Derivative, ImageFormat};
pub use lifecycle::{LifecycleStats, SweepReport};
pub use post::{Post, PostId, PostState, TransitionError, POST_TTL_SECS, PURGE_AFTER_SECS};
pub use post::{post_ttl, purge_after};
pub use profile::{default_profiles, SizeProfile};
