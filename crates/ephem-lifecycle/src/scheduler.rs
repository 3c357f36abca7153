//! Background scheduling of the lifecycle sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use ephem_models::SweepReport;

use crate::sweeper::{LifecycleSweeper, SweepError};

/// Default time between sweep passes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default delay before the first pass after startup, so a crash-looping
/// process does not hammer the store.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(30);

/// Periodic driver for the [`LifecycleSweeper`].
pub struct LifecycleScheduler {
    sweeper: Arc<LifecycleSweeper>,
    sweep_interval: Duration,
    startup_delay: Duration,
    enabled: bool,
}

impl LifecycleScheduler {
    /// Create a scheduler with settings from the environment.
    ///
    /// `LIFECYCLE_SWEEP_INTERVAL_SECS` and `LIFECYCLE_STARTUP_DELAY_SECS`
    /// override the defaults; `ENABLE_LIFECYCLE_SWEEP=false` disables the
    /// loop entirely (the run-now endpoint still works).
    pub fn from_env(sweeper: Arc<LifecycleSweeper>) -> Self {
        let sweep_interval = env_secs("LIFECYCLE_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL);
        let startup_delay = env_secs("LIFECYCLE_STARTUP_DELAY_SECS", DEFAULT_STARTUP_DELAY);
        let enabled = std::env::var("ENABLE_LIFECYCLE_SWEEP")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Self {
            sweeper,
            sweep_interval,
            startup_delay,
            enabled,
        }
    }

    pub fn new(
        sweeper: Arc<LifecycleSweeper>,
        sweep_interval: Duration,
        startup_delay: Duration,
    ) -> Self {
        Self {
            sweeper,
            sweep_interval,
            startup_delay,
            enabled: true,
        }
    }

    /// Start the background sweep loop.
    ///
    /// Runs indefinitely and should be spawned as a background task. A
    /// failed pass is logged and the loop keeps going; the next tick
    /// retries from scratch.
    pub async fn run(&self) {
        if !self.enabled {
            info!("lifecycle sweep loop is disabled");
            return;
        }

        info!(
            interval_secs = self.sweep_interval.as_secs(),
            startup_delay_secs = self.startup_delay.as_secs(),
            "starting lifecycle scheduler"
        );

        tokio::time::sleep(self.startup_delay).await;

        let mut ticker = interval(self.sweep_interval);
        // A long pass must not cause a burst of back-to-back sweeps.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.sweeper.sweep().await {
                error!("lifecycle sweep failed: {e}");
            }
        }
    }

    /// Run a single pass immediately, outside the schedule.
    pub async fn run_once(&self) -> Result<SweepReport, SweepError> {
        self.sweeper.sweep().await
    }
}

fn env_secs(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_SWEEP_INTERVAL, Duration::from_secs(3600));
        assert_eq!(DEFAULT_STARTUP_DELAY, Duration::from_secs(30));
    }
}
