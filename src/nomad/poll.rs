//! Poll-until loop
//!
//! Each iteration issues exactly one fetch, then checks the success
//! predicate before the failure predicate. Between iterations the loop
//! sleeps on the cancel token, so an interrupt ends the wait promptly.

use std::time::Duration;

use crate::signal::CancelToken;
use crate::timeout::{backoff_delay, Deadline};

/// How often and for how long to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Delay after the first unsettled fetch
    pub interval: Duration,
    /// Backoff cap; equal to `interval` for a fixed delay
    pub max_interval: Duration,
    /// Wall-clock limit for the whole wait; `None` waits forever
    pub timeout: Option<Duration>,
    /// Fetch limit; `None` for no limit
    pub max_attempts: Option<u32>,
}

impl PollOptions {
    /// Fixed-interval polling with no limit
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            timeout: None,
            max_attempts: None,
        }
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    fn delay(&self, attempt: u32) -> Duration {
        backoff_delay(self.interval, self.max_interval, attempt)
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::every(Duration::from_secs(1))
    }
}

/// Result of a poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// The success predicate held for this state
    Succeeded(T),
    /// The failure predicate held for this state
    Failed(T),
    /// The deadline or attempt limit ran out; carries the last state seen
    TimedOut { attempts: u32, last: Option<T> },
    /// The cancel token fired
    Cancelled { attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Succeeded(_))
    }
}

/// Repeatedly fetch until `success` or `failure` holds.
///
/// A fetch error ends the poll and is returned as-is.
pub fn poll_until<T, E, F, S, X>(
    mut fetch: F,
    success: S,
    failure: X,
    options: &PollOptions,
    cancel: &CancelToken,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Result<T, E>,
    S: Fn(&T) -> bool,
    X: Fn(&T) -> bool,
{
    let deadline = Deadline::new(options.timeout);
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled { attempts });
        }

        let state = fetch()?;
        attempts += 1;

        if success(&state) {
            return Ok(PollOutcome::Succeeded(state));
        }
        if failure(&state) {
            return Ok(PollOutcome::Failed(state));
        }

        let attempts_exhausted = options.max_attempts.is_some_and(|max| attempts >= max);
        if attempts_exhausted || deadline.is_expired() {
            return Ok(PollOutcome::TimedOut {
                attempts,
                last: Some(state),
            });
        }

        let mut delay = options.delay(attempts);
        if let Some(remaining) = deadline.remaining() {
            delay = delay.min(remaining);
        }
        tracing::debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "waiting");
        if cancel.sleep(delay) {
            return Ok(PollOutcome::Cancelled { attempts });
        }
    }
}
