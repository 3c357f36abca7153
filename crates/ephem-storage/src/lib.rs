//! Asset file storage for the ephem backend.

pub mod disk;
pub mod error;
pub mod reaper;

pub use disk::DiskStore;
pub use error::{StorageError, StorageResult};
pub use reaper::{AssetReaper, ReapReport};
