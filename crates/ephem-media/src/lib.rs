//! Image processing for the ephem backend.
//!
//! Decoding, resizing and re-encoding run on blocking threads via
//! `spawn_blocking`; the async surface is thin wrappers around them.

pub mod derivative;
pub mod error;
pub mod probe;
pub mod resize;

pub use derivative::{generate_derivative, transient_resize};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_image, ImageInfo};
pub use resize::{decode, encode, encode_with_quality, fit_dimensions, resize_to_fit, JPEG_QUALITY};
