//! Fixed-period job scheduling.
//!
//! A `Schedule` runs a job once per period until shutdown is triggered.
//! The first run happens one full period after start, never immediately, and
//! a slow job delays the next tick instead of causing a burst of catch-up runs.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};

use crate::lifecycle::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    period: Duration,
}

impl Schedule {
    /// Run every `period`.
    pub fn every(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run `job` once per period until `shutdown` is triggered.
    pub async fn run<F, Fut>(self, mut job: F, mut shutdown: ShutdownSignal)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => job().await,
                _ = shutdown.wait() => break,
            }
        }
    }
}
