//! HTTP handlers.

pub mod assets;
pub mod health;
pub mod lifecycle;
pub mod posts;

pub use health::{health, ready};
