//! Size profiles for derivative generation.

use serde::{Deserialize, Serialize};

use crate::asset::{AssetId, ImageFormat};

/// A named bounding box for derivative generation.
///
/// Derivatives fit inside `max_width` x `max_height` while preserving the
/// source aspect ratio, and are never upscaled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeProfile {
    /// Profile name, used in storage keys and registry lookups.
    pub name: String,
    /// Maximum output width in pixels.
    pub max_width: u32,
    /// Maximum output height in pixels.
    pub max_height: u32,
}

impl SizeProfile {
    pub fn new(name: impl Into<String>, max_width: u32, max_height: u32) -> Self {
        Self {
            name: name.into(),
            max_width,
            max_height,
        }
    }

    /// Storage key of this profile's rendition for an asset:
    /// `<asset_id>_<profile><ext>`.
    pub fn derivative_key(&self, asset_id: &AssetId, format: ImageFormat) -> String {
        format!("{}_{}{}", asset_id, self.name, format.extension())
    }
}

/// Storage key of an asset's original file: `<asset_id><ext>`.
pub fn original_key(asset_id: &AssetId, format: ImageFormat) -> String {
    format!("{}{}", asset_id, format.extension())
}

/// The standard profile set generated on every ingestion.
pub fn default_profiles() -> Vec<SizeProfile> {
    vec![
        SizeProfile::new("small", 150, 150),
        SizeProfile::new("medium", 400, 400),
        SizeProfile::new("large", 800, 600),
    ]
}
