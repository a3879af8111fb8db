//! Backoff policies for delivery retries
//!
//! Both policies add a random jitter of up to [`MAX_JITTER`] so that many
//! reporters failing at the same moment do not retry in lockstep.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Constant delay used by [`linear_backoff`]
pub const LINEAR_BASE: Duration = Duration::from_millis(100);

/// Delay of the first retry under [`geometric_backoff`]
pub const GEOMETRIC_BASE: Duration = Duration::from_millis(100);

/// Upper bound of the random jitter added to every delay
pub const MAX_JITTER: Duration = Duration::from_millis(50);

/// A backoff policy maps a 1-based attempt number to a delay
pub type BackoffFn = fn(u32) -> Duration;

/// Constant base delay plus jitter
pub fn linear_backoff(_attempt: u32) -> Duration {
    LINEAR_BASE + jitter()
}

/// `GEOMETRIC_BASE * 2^(attempt - 1)` plus jitter.
///
/// Growth is uncapped; the retry attempt budget bounds the total wait. Huge
/// attempt numbers saturate at `Duration::MAX` instead of overflowing.
pub fn geometric_backoff(attempt: u32) -> Duration {
    geometric_delay(attempt).saturating_add(jitter())
}

fn geometric_delay(attempt: u32) -> Duration {
    let exponent = attempt.max(1) - 1;
    2u32.checked_pow(exponent)
        .and_then(|factor| GEOMETRIC_BASE.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

fn jitter() -> Duration {
    let max = MAX_JITTER.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=max))
}

/// Configurable choice of backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    #[default]
    Linear,
    Geometric,
}

impl BackoffStrategy {
    pub fn policy(self) -> BackoffFn {
        match self {
            BackoffStrategy::Linear => linear_backoff,
            BackoffStrategy::Geometric => geometric_backoff,
        }
    }

    pub fn delay(self, attempt: u32) -> Duration {
        (self.policy())(attempt)
    }
}

impl std::fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffStrategy::Linear => write!(f, "linear"),
            BackoffStrategy::Geometric => write!(f, "geometric"),
        }
    }
}

impl std::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(BackoffStrategy::Linear),
            "geometric" | "exponential" => Ok(BackoffStrategy::Geometric),
            other => Err(format!("unknown backoff strategy: {}", other)),
        }
    }
}
