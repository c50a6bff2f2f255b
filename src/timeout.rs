//! Poll timing and deadlines
//!
//! Status polling against the control plane is host-driven:
//! - `poll_interval_ms`: delay between two fetches
//! - `max_poll_interval_ms`: backoff cap (equal to the interval means no backoff)
//! - `evaluation_timeout_seconds` / `allocation_timeout_seconds`: optional upper
//!   bound for each wait; unset waits until a terminal status is observed
//! - `connect_timeout_seconds`: SSH connection and tunnel readiness timeout

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Timing configuration for a deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Delay between polls (default: 1000)
    pub poll_interval_ms: u64,

    /// Upper bound of the exponential backoff (default: same as interval)
    pub max_poll_interval_ms: u64,

    /// Maximum wait for the evaluation to settle (default: unbounded)
    pub evaluation_timeout_seconds: Option<u64>,

    /// Maximum wait for each allocation to settle (default: unbounded)
    pub allocation_timeout_seconds: Option<u64>,

    /// SSH connection timeout (default: 30)
    pub connect_timeout_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_poll_interval_ms: 1000,
            evaluation_timeout_seconds: None,
            allocation_timeout_seconds: None,
            connect_timeout_seconds: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn validate(&self) -> Result<(), TimeoutValidationError> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 60_000 {
            return Err(TimeoutValidationError::IntervalOutOfBounds {
                value: self.poll_interval_ms,
            });
        }

        if self.max_poll_interval_ms < self.poll_interval_ms {
            return Err(TimeoutValidationError::MaxIntervalBelowInterval {
                value: self.max_poll_interval_ms,
                min: self.poll_interval_ms,
            });
        }

        for (name, value) in [
            ("evaluation_timeout_seconds", self.evaluation_timeout_seconds),
            ("allocation_timeout_seconds", self.allocation_timeout_seconds),
        ] {
            if let Some(v) = value {
                if v == 0 || v > 86_400 {
                    return Err(TimeoutValidationError::WaitOutOfBounds { name, value: v });
                }
            }
        }

        if self.connect_timeout_seconds == 0 || self.connect_timeout_seconds > 300 {
            return Err(TimeoutValidationError::ConnectOutOfBounds {
                value: self.connect_timeout_seconds,
            });
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms)
    }

    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_seconds.map(Duration::from_secs)
    }

    pub fn allocation_timeout(&self) -> Option<Duration> {
        self.allocation_timeout_seconds.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Timeout validation errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutValidationError {
    #[error("poll_interval_ms must be in (0, 60000], got {value}")]
    IntervalOutOfBounds { value: u64 },

    #[error("max_poll_interval_ms must be >= {min}, got {value}")]
    MaxIntervalBelowInterval { value: u64, min: u64 },

    #[error("{name} must be in (0, 86400], got {value}")]
    WaitOutOfBounds { name: &'static str, value: u64 },

    #[error("connect_timeout_seconds must be in (0, 300], got {value}")]
    ConnectOutOfBounds { value: u64 },
}

/// Optional wall-clock limit measured from creation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    /// A deadline that never expires
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn is_expired(&self) -> bool {
        match self.limit {
            Some(limit) => self.start.elapsed() >= limit,
            None => false,
        }
    }

    /// Time left, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.limit.map(|limit| limit.saturating_sub(self.start.elapsed()))
    }
}

/// Exponential backoff delay for the given 1-based attempt, capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
    base.saturating_mul(factor).min(max.max(base))
}
