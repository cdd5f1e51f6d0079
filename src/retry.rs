//! Reconnect delay with exponential backoff and jitter.

use reqwest::Url;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for automatic reconnection.
///
/// Defaults: unlimited reconnects, 1s initial delay, 2x backoff, 30s max delay.
/// Use `RetryConfig::none()` to stop after the first disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum consecutive failed attempts before giving up (`None` = never).
    pub max_retries: Option<usize>,
    /// Initial delay before the first reconnect (milliseconds).
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
    /// Maximum delay between reconnects (milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// No reconnects: the first disconnect ends the loop.
    pub fn none() -> Self {
        Self {
            max_retries: Some(0),
            ..Default::default()
        }
    }

    /// Whether another attempt is allowed after `attempt` failures (1-indexed).
    pub fn allows(&self, attempt: usize) -> bool {
        self.max_retries.map_or(true, |max| attempt <= max)
    }

    /// Calculate the delay for a given attempt (1-indexed).
    /// Uses exponential backoff with ±20% jitter.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let base_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped_ms = base_ms.min(self.max_delay_ms as f64);

        // Jitter: ±20% (multiply by 0.8–1.2)
        let jitter = 0.8 + rand::random::<f64>() * 0.4;
        Duration::from_millis((capped_ms * jitter) as u64)
    }

    /// Delay before the next attempt. A server `retry` hint replaces the
    /// backoff schedule.
    pub fn next_delay(&self, attempt: usize, server_hint: Option<Duration>) -> Duration {
        server_hint.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

/// Log a reconnect attempt.
pub(crate) fn log_reconnect(attempt: usize, max: Option<usize>, delay: &Duration, url: &Url) {
    match max {
        Some(max) => info!(
            "Disconnected (attempt {}/{}), reconnecting to {} in {:.1}s",
            attempt,
            max,
            url,
            delay.as_secs_f64()
        ),
        None => info!(
            "Disconnected (attempt {}), reconnecting to {} in {:.1}s",
            attempt,
            url,
            delay.as_secs_f64()
        ),
    }
}

/// Log that the retry budget ran out.
pub(crate) fn log_give_up(attempt: usize, url: &Url) {
    warn!(
        "Giving up on {} after {} failed attempt(s)",
        url,
        attempt.saturating_sub(1)
    );
}
