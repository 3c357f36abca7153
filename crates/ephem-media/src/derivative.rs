//! Derivative rendition generation.

use std::path::{Path, PathBuf};

use tracing::debug;

use ephem_models::{Derivative, ImageFormat, SizeProfile};

use crate::error::{MediaError, MediaResult};
use crate::resize::{decode, encode, encode_with_quality, resize_to_fit};

/// Generate one derivative rendition from an original on disk.
///
/// Decodes the source, fits it inside the profile's bounding box and writes
/// the re-encoded result to `output_path`, overwriting any previous file at
/// that path. Returns the recorded derivative (key is the output file name).
pub async fn generate_derivative(
    source_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    profile: &SizeProfile,
    format: ImageFormat,
) -> MediaResult<Derivative> {
    let source_path = source_path.as_ref().to_path_buf();
    let output_path = output_path.as_ref().to_path_buf();
    let bounds = (profile.max_width, profile.max_height);

    if !source_path.exists() {
        return Err(MediaError::FileNotFound(source_path));
    }

    let key = file_name(&output_path)?;
    let (width, height) = tokio::task::spawn_blocking(move || {
        let bytes = std::fs::read(&source_path)?;
        let img = resize_to_fit(decode(&bytes)?, bounds);
        let encoded = encode(&img, format)?;
        std::fs::write(&output_path, encoded)?;
        Ok::<_, MediaError>((img.width(), img.height()))
    })
    .await
    .map_err(|e| MediaError::internal(format!("resize task panicked: {e}")))??;

    debug!(profile = %profile.name, width, height, "generated derivative");
    Ok(Derivative { key, width, height })
}

/// Resize an original into bytes without persisting anything.
///
/// Backs the on-demand resize endpoint: the output exists only for the
/// duration of the response. `quality` falls back to [`crate::JPEG_QUALITY`]
/// and only affects lossy output.
pub async fn transient_resize(
    source_path: impl AsRef<Path>,
    bounds: (u32, u32),
    format: ImageFormat,
    quality: Option<u8>,
) -> MediaResult<Vec<u8>> {
    let source_path = source_path.as_ref().to_path_buf();
    let quality = quality.unwrap_or(crate::resize::JPEG_QUALITY);

    if !source_path.exists() {
        return Err(MediaError::FileNotFound(source_path));
    }

    tokio::task::spawn_blocking(move || {
        let bytes = std::fs::read(&source_path)?;
        let img = resize_to_fit(decode(&bytes)?, bounds);
        encode_with_quality(&img, format, quality)
    })
    .await
    .map_err(|e| MediaError::internal(format!("resize task panicked: {e}")))?
}

fn file_name(path: &PathBuf) -> MediaResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| MediaError::internal(format!("invalid output path: {}", path.display())))
}
