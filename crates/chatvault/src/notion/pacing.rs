use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(350);
const POLL_SLICE: Duration = Duration::from_millis(25);

/// Raised the first time a sync run observes the stop flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStopped;

impl std::fmt::Display for SyncStopped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sync stopped by user")
    }
}

impl std::error::Error for SyncStopped {}

/// Cooperative cancellation and rate-limit pacing for one sync run.
#[derive(Debug, Clone, Copy)]
pub struct Pacer<'a> {
    stop: &'a AtomicBool,
    delay: Duration,
}

impl<'a> Pacer<'a> {
    #[must_use]
    pub const fn new(stop: &'a AtomicBool, delay: Duration) -> Self {
        Self { stop, delay }
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn checkpoint(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(SyncStopped.into());
        }
        Ok(())
    }

    /// Sleeps for the configured delay, polling the stop flag throughout.
    pub fn pause(&self) -> Result<()> {
        self.checkpoint()?;
        let deadline = Instant::now() + self.delay;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(POLL_SLICE.min(deadline - now));
            self.checkpoint()?;
        }
        self.checkpoint()
    }
}
