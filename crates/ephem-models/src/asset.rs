//! Asset metadata models.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::post::PostId;

/// Unique identifier for an uploaded asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    /// Generate a new random asset ID.
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

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AssetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Image formats accepted for ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageFormat {
    /// Parse a declared mime type. Returns `None` for anything outside the
    /// accepted set.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/gif" => Some(ImageFormat::Gif),
            "image/webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    /// File extension including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => ".jpg",
            ImageFormat::Png => ".png",
            ImageFormat::Gif => ".gif",
            ImageFormat::WebP => ".webp",
        }
    }

    /// Canonical mime type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
        }
    }

    /// Whether the encoding is lossy (quality applies on re-encode).
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageFormat::Jpeg | ImageFormat::WebP)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One derived rendition of an asset, produced for a named size profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivative {
    /// Storage key of the rendition file.
    pub key: String,
    /// Actual output width in pixels.
    pub width: u32,
    /// Actual output height in pixels.
    pub height: u32,
}

/// An uploaded image plus all of its derived renditions.
///
/// Invariant: while the asset is live, `original_key` is non-empty and
/// `derivatives` holds exactly one entry per configured profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Unique asset ID
    pub asset_id: AssetId,

    /// Post that owns this asset, if any (standalone uploads have none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_post_id: Option<PostId>,

    /// Storage key of the original file
    pub original_key: String,

    /// Declared mime type of the original
    pub mime_type: String,

    /// Size of the original in bytes
    pub size_bytes: u64,

    /// Upload timestamp
    pub created_at: DateTime<Utc>,

    /// Tombstone: when a direct delete completed. The record outlives the
    /// files so a replayed delete is distinguishable from a never-known id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    /// Derived renditions keyed by profile name
    #[serde(default)]
    pub derivatives: HashMap<String, Derivative>,
}

impl Asset {
    /// Create a new asset record for a freshly persisted original.
    pub fn new(
        asset_id: AssetId,
        original_key: impl Into<String>,
        format: ImageFormat,
        size_bytes: u64,
    ) -> Self {
        Self {
            asset_id,
            owner_post_id: None,
            original_key: original_key.into(),
            mime_type: format.mime_type().to_string(),
            size_bytes,
            created_at: Utc::now(),
            deleted_at: None,
            derivatives: HashMap::new(),
        }
    }

    /// Whether a direct delete already completed for this asset.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Attach an owner post.
    pub fn owned_by(mut self, post_id: PostId) -> Self {
        self.owner_post_id = Some(post_id);
        self
    }

    /// Record a generated derivative for a profile.
    pub fn add_derivative(&mut self, profile: impl Into<String>, derivative: Derivative) {
        self.derivatives.insert(profile.into(), derivative);
    }

    /// Check the live-asset invariant against a profile set.
    pub fn is_complete(&self, profiles: &[crate::profile::SizeProfile]) -> bool {
        !self.original_key.is_empty()
            && profiles.iter().all(|p| self.derivatives.contains_key(&p.name))
    }
}
