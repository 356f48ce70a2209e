//! Rate-limited sequential iteration.
//!
//! The remote service throttles clients that fire detail requests back to
//! back, so pending items are handed out one at a time with a delay between
//! consecutive items. Keeping the delay policy here, rather than as sleeps in
//! the sync loop, lets the ordering and timing be tested on their own.

use std::time::Duration;

use rand::Rng as _;

/// Delay between consecutive items: `delay + random(0..=jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub delay: Duration,
    pub jitter: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
            jitter: Duration::from_millis(500),
        }
    }
}

impl PacingConfig {
    /// No delay at all.
    pub fn none() -> Self {
        Self {
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        self.delay + jitter
    }
}

/// Wraps an iterator so that every item after the first is delayed.
///
/// There is no delay before the first item and none after the last.
#[derive(Debug)]
pub struct Paced<I> {
    inner: I,
    config: PacingConfig,
    yielded: bool,
}

impl<I: Iterator> Paced<I> {
    pub fn new(inner: I, config: PacingConfig) -> Self {
        Self {
            inner,
            config,
            yielded: false,
        }
    }

    pub async fn next(&mut self) -> Option<I::Item> {
        let item = self.inner.next()?;
        if self.yielded {
            let delay = self.config.next_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        self.yielded = true;
        Some(item)
    }
}
