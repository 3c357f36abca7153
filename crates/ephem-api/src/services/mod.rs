//! Application services.

pub mod ingestor;

pub use ingestor::AssetIngestor;
