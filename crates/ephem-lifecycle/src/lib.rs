//! Post lifecycle management: the two-phase expiration sweep and its
//! scheduler.

pub mod scheduler;
pub mod sweeper;

pub use scheduler::{LifecycleScheduler, DEFAULT_STARTUP_DELAY, DEFAULT_SWEEP_INTERVAL};
pub use sweeper::{LifecycleSweeper, SweepError};
