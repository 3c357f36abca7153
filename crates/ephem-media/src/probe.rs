//! Image file probing.
//!
//! Probes read the file on every call; nothing here is cached, so the
//! result always reflects the current state on disk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ephem_models::ImageFormat;

use crate::error::{MediaError, MediaResult};

/// Image file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Detected format (from content, not extension)
    pub format: ImageFormat,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified_at: DateTime<Utc>,
}

/// Probe an image file for dimensions, format and file metadata.
pub async fn probe_image(path: impl AsRef<Path>) -> MediaResult<ImageInfo> {
    let path = path.as_ref().to_path_buf();

    let meta = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::FileNotFound(path));
        }
        Err(e) => return Err(e.into()),
    };
    let size = meta.len();
    let modified_at = meta.modified().map(DateTime::<Utc>::from)?;

    let (width, height, format) = tokio::task::spawn_blocking(move || probe_blocking(&path))
        .await
        .map_err(|e| MediaError::internal(format!("probe task panicked: {e}")))??;

    Ok(ImageInfo {
        width,
        height,
        format,
        size,
        modified_at,
    })
}

fn probe_blocking(path: &PathBuf) -> MediaResult<(u32, u32, ImageFormat)> {
    let reader = image::io::Reader::open(path)?
        .with_guessed_format()
        .map_err(|e| MediaError::decode_failed(e.to_string()))?;

    let format = match reader.format() {
        Some(image::ImageFormat::Jpeg) => ImageFormat::Jpeg,
        Some(image::ImageFormat::Png) => ImageFormat::Png,
        Some(image::ImageFormat::Gif) => ImageFormat::Gif,
        Some(image::ImageFormat::WebP) => ImageFormat::WebP,
        Some(other) => return Err(MediaError::UnsupportedFormat(format!("{other:?}"))),
        None => return Err(MediaError::UnsupportedFormat("unknown".to_string())),
    };

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| MediaError::decode_failed(e.to_string()))?;

    Ok((width, height, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use std::io::Cursor;

    fn write_test_jpeg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buf = Vec::new();
        img.write_to(
            &mut Cursor::new(&mut buf),
            image::ImageOutputFormat::Jpeg(85),
        )
        .unwrap();
        let path = dir.join(name);
        std::fs::write(&path, buf).unwrap();
        path
    }

    #[tokio::test]
    async fn test_probe_reports_dimensions_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_jpeg(dir.path(), "a.jpg", 64, 48);

        let info = probe_image(&path).await.unwrap();
        assert_eq!(info.width, 64);
        assert_eq!(info.height, 48);
        assert_eq!(info.format, ImageFormat::Jpeg);
        assert!(info.size > 0);
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = probe_image(dir.path().join("nope.jpg")).await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_probe_reflects_replacement() {
        // No caching: probing after an overwrite sees the new file.
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_jpeg(dir.path(), "a.jpg", 64, 48);
        let first = probe_image(&path).await.unwrap();
        assert_eq!((first.width, first.height), (64, 48));

        write_test_jpeg(dir.path(), "a.jpg", 128, 96);
        let second = probe_image(&path).await.unwrap();
        assert_eq!((second.width, second.height), (128, 96));
    }
}
