//! Liveness watchdog and reconnect backoff.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::{Result, WatchdogConfig};

/// Software stand-in for a hardware watchdog. The monitor runs on its own OS
/// thread so it keeps ticking even when the async runtime is wedged.
#[derive(Debug, Clone)]
pub struct Watchdog {
    epoch: Instant,
    last_feed_ms: Arc<AtomicU64>,
    timeout: Duration,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_feed_ms: Arc::new(AtomicU64::new(0)),
            timeout,
        }
    }

    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self::new(Duration::from_millis(config.timeout_ms))
    }

    pub fn feed(&self) {
        self.feed_at(Instant::now());
    }

    pub fn feed_at(&self, now: Instant) {
        let ms = now.saturating_duration_since(self.epoch).as_millis() as u64;
        self.last_feed_ms.fetch_max(ms, Ordering::Relaxed);
    }

    /// Time since the last feed.
    pub fn starvation(&self, now: Instant) -> Duration {
        let last = Duration::from_millis(self.last_feed_ms.load(Ordering::Relaxed));
        now.saturating_duration_since(self.epoch).saturating_sub(last)
    }

    pub fn is_starved(&self, now: Instant) -> bool {
        self.starvation(now) > self.timeout
    }

    /// Starts the monitor thread. `on_starved` runs once when the feeder has
    /// been silent for longer than the timeout; the thread exits afterwards.
    pub fn spawn_monitor<F>(&self, on_starved: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce(Duration) + Send + 'static,
    {
        let watchdog = self.clone();
        let period = (self.timeout / 4).max(Duration::from_millis(10));
        let handle = thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || loop {
                thread::sleep(period);
                let now = Instant::now();
                if watchdog.is_starved(now) {
                    on_starved(watchdog.starvation(now));
                    return;
                }
            })?;
        Ok(handle)
    }
}

/// Exponential reconnect delay, doubling from `initial` up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
