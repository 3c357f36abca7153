//! Metadata stores for the ephem backend.
//!
//! Three store traits (posts, author counters, asset catalog) with two
//! families of implementations: Firestore REST for production and
//! in-memory for tests and local development.

pub mod client;
pub mod error;
pub mod firestore;
pub mod memory;
pub mod repository;
pub mod token_cache;
pub mod types;

pub use client::{StoreClient, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use firestore::{FirestoreAssetCatalog, FirestoreAuthorStore, FirestorePostStore};
pub use memory::{MemoryAssetCatalog, MemoryAuthorStore, MemoryPostStore};
pub use repository::{AssetCatalog, AuthorStore, PostStore};
