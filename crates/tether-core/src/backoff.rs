//! Reconnect backoff policy and delay calculation.
//!
//! - [`BackoffPolicy`]: retry parameters (base delay, cap, jitter, max retries)
//! - [`calculate_backoff_delay`]: exponential backoff with bounded jitter
//!
//! Jitter only ever pulls a delay *down*, and never below the previous
//! attempt's exponential value. Every delay for attempt `n` therefore lies in
//! `[exp(n - 1), exp(n)]`, which makes the sequence non-decreasing for any
//! random draw and keeps it at or under the cap.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum reconnect attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 8;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Reconnect backoff parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// Maximum number of reconnect attempts (default: 8).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms (default: 500).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl BackoffPolicy {
    /// Whether another attempt is allowed after `attempts` failed ones.
    #[must_use]
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_retries
    }

    /// Delay before zero-based `attempt`, drawing jitter from the thread RNG.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_random(attempt, rand::random::<f64>())
    }

    /// Delay before zero-based `attempt` with an explicit random value in `[0, 1)`.
    #[must_use]
    pub fn delay_with_random(&self, attempt: u32, random: f64) -> Duration {
        Duration::from_millis(calculate_backoff_delay(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential value for `attempt`: `min(max_delay, base_delay * 2^attempt)`.
#[must_use]
pub fn exponential_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    base_delay_ms
        .saturating_mul(1u64 << attempt.min(31))
        .min(max_delay_ms)
}

/// Calculate a jittered backoff delay in milliseconds.
///
/// The result is `exp(n) - random * jitter * (exp(n) - floor)` where `floor`
/// is `exp(n - 1)` (or half of `exp(0)` for the first attempt). `random` is
/// clamped to `[0, 1]` and `jitter_factor` to `[0, 1]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let upper = exponential_delay(attempt, base_delay_ms, max_delay_ms);
    let floor = if attempt == 0 {
        upper / 2
    } else {
        exponential_delay(attempt - 1, base_delay_ms, max_delay_ms)
    };

    let spread = (upper - floor) as f64;
    let pull = (spread * random.clamp(0.0, 1.0) * jitter_factor.clamp(0.0, 1.0)).round() as u64;

    upper.saturating_sub(pull).max(floor)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
