// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Retry policies for session reconnects.
//!
//! A [`RetryPolicy`] yields the nominal delay for an attempt number;
//! [`ReconnectBackoff`] tracks the attempt counter across failures and adds
//! jitter on top.

use std::time::Duration;

use rand::Rng;

/// Policy for retrying failed connection attempts.
pub trait RetryPolicy: Send + Sync {
    /// Determine if another attempt should be made after `attempt` failures.
    fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts().map(|max| attempt < max).unwrap_or(true)
    }

    /// Get the delay before the next attempt.
    fn delay(&self, attempt: u32) -> Duration;

    /// Get the maximum number of attempts allowed; `None` retries forever.
    fn max_attempts(&self) -> Option<u32>;
}

/// Exponential backoff retry policy.
///
/// Delays double with each attempt, up to a configured maximum delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: Option<u32>,
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Defaults suited to a coordinator on the local network.
    pub fn default_session() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::default_session()
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(multiplier);
        delay.min(self.max_delay)
    }

    fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

/// One scheduled reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStep {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Delay before jitter.
    pub nominal: Duration,
    /// Delay to actually wait.
    pub delay: Duration,
}

/// Reconnect scheduler: a retry policy plus attempt tracking and jitter.
///
/// Jitter only shortens the nominal delay, by a random fraction in
/// `[0, jitter]`, so the wait never exceeds the policy's cap.
pub struct ReconnectBackoff {
    policy: Box<dyn RetryPolicy>,
    jitter: f64,
    attempts: u32,
    last_delay: Duration,
}

impl ReconnectBackoff {
    pub fn new(policy: impl RetryPolicy + 'static, jitter: f64) -> Self {
        Self {
            policy: Box::new(policy),
            jitter: if jitter.is_finite() {
                jitter.clamp(0.0, 1.0)
            } else {
                0.0
            },
            attempts: 0,
            last_delay: Duration::ZERO,
        }
    }

    /// Schedule the next attempt, or `None` once the policy gives up.
    pub fn next(&mut self) -> Option<BackoffStep> {
        if !self.policy.should_retry(self.attempts) {
            return None;
        }
        let nominal = self.policy.delay(self.attempts);
        self.attempts += 1;
        let delay = if self.jitter > 0.0 {
            let cut = rand::thread_rng().gen_range(0.0..=self.jitter);
            nominal.mul_f64(1.0 - cut)
        } else {
            nominal
        };
        // never shorter than the previous wait; nominal is capped, so is this
        let delay = delay.max(self.last_delay);
        self.last_delay = delay;
        Some(BackoffStep {
            attempt: self.attempts,
            nominal,
            delay,
        })
    }

    /// Forget past failures; called once a connection is established.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_delay = Duration::ZERO;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(ExponentialBackoff::default(), 0.2)
    }
}
