//! Reconnect backoff with a retry ceiling

use std::time::Duration;

/// How aggressively the supervisor retries after a failure
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up (0 = never give up)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

/// Exponential backoff state. Reset after every successful connection.
#[derive(Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Consecutive failures recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failure and return the delay before the next try, or `None`
    /// once the ceiling is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.policy.max_attempts != 0 && self.attempts >= self.policy.max_attempts {
            return None;
        }

        let exponent = self.attempts.min(16);
        self.attempts += 1;

        let delay = self
            .policy
            .initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.policy.max_delay);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
