//! Explicit retry policy for connection failure transitions.
//!
//! The state machines call [`Retry::next_delay`] when an attempt fails and
//! sleep for the returned duration themselves. Nothing here reads a clock, so
//! the sequence of delays is deterministic and can be driven from tests with a
//! paused tokio clock.

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::{Backoff, Constant};

const EXPONENTIAL_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDelay {
    Fixed(Duration),
    Exponential { initial: Duration, max: Duration },
}

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; `None` retries forever.
    pub max_attempts: Option<u32>,
    pub delay: RetryDelay,
}

impl RetryPolicy {
    /// Unbounded retries with a constant delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            delay: RetryDelay::Fixed(delay),
        }
    }

    /// Unbounded retries, doubling from `initial` up to `max`.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts: None,
            delay: RetryDelay::Exponential { initial, max },
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn start(&self) -> Retry {
        Retry {
            max_attempts: self.max_attempts,
            failures: 0,
            backoff: build_backoff(&self.delay),
        }
    }
}

fn build_backoff(delay: &RetryDelay) -> Box<dyn Backoff + Send> {
    match delay {
        RetryDelay::Fixed(delay) => Box::new(Constant::new(*delay)),
        RetryDelay::Exponential { initial, max } => Box::new(ExponentialBackoff {
            current_interval: *initial,
            initial_interval: *initial,
            randomization_factor: 0.0,
            multiplier: EXPONENTIAL_MULTIPLIER,
            max_interval: *max,
            max_elapsed_time: None,
            ..Default::default()
        }),
    }
}

/// Progress through one run of a [`RetryPolicy`].
pub struct Retry {
    max_attempts: Option<u32>,
    failures: u32,
    backoff: Box<dyn Backoff + Send>,
}

impl Retry {
    /// Record a failed attempt.
    ///
    /// Returns the delay before the next attempt, or `None` once the policy's
    /// attempts are used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);

        if let Some(max) = self.max_attempts {
            if self.failures >= max {
                return None;
            }
        }

        self.backoff.next_backoff()
    }

    /// Failed attempts recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Start over after a success.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.backoff.reset();
    }
}
