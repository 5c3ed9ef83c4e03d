// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry schedules for external calls.
//!
//! Provider HTTP calls back off exponentially with jitter inside a time budget
//! and stop at the first permanent error. Domain verification backs off
//! linearly: attempt `i` waits `i × step` before looking at DNS.

use rand::random;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Total time a provider call may spend retrying (2 minutes)
pub const PROVIDER_RETRY_BUDGET_SECS: u64 = 120;

/// Shape of an exponential schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// First delay
    pub initial: Duration,
    /// Ceiling for any single delay
    pub max_interval: Duration,
    /// Growth factor between delays
    pub multiplier: u32,
    /// Jitter band around each delay, in percent
    pub jitter_percent: u32,
}

/// Provider API schedule: 50ms, 100ms, 200ms ... capped at 10s, ±10%.
pub const PROVIDER_BACKOFF: BackoffPolicy = BackoffPolicy {
    initial: Duration::from_millis(50),
    max_interval: Duration::from_secs(10),
    multiplier: 2,
    jitter_percent: 10,
};

/// Stateful iterator over the delays of a [`BackoffPolicy`].
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    next: Duration,
    deadline: Instant,
}

impl Backoff {
    /// Start a schedule that gives up once `budget` has elapsed.
    #[must_use]
    pub fn new(policy: BackoffPolicy, budget: Duration) -> Self {
        Self {
            policy,
            next: policy.initial,
            deadline: Instant::now() + budget,
        }
    }

    #[must_use]
    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Next delay to sleep, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if Instant::now() >= self.deadline {
            return None;
        }
        let base = self.next;
        self.next = base
            .saturating_mul(self.policy.multiplier)
            .min(self.policy.max_interval);
        Some(jitter(base, self.policy.jitter_percent))
    }
}

/// Spread `base` uniformly over `±percent`.
fn jitter(base: Duration, percent: u32) -> Duration {
    if percent == 0 {
        return base;
    }
    let spread = base.as_secs_f64() * f64::from(percent) / 100.0;
    let offset = spread * (2.0 * random::<f64>() - 1.0);
    Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.0))
}

/// Provider API backoff bounded by `budget`.
#[must_use]
pub fn http_backoff(budget: Duration) -> Backoff {
    Backoff::new(PROVIDER_BACKOFF, budget)
}

/// Run `operation` until it succeeds, fails permanently or `backoff` runs out.
///
/// The last error is returned unchanged.
///
/// # Errors
///
/// Returns the operation's error when `is_retryable` rejects it or no delay is left.
pub async fn retry_with_backoff<T, E, F, Fut>(
    operation_name: &str,
    mut backoff: Backoff,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let mut attempt: u32 = 1;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, elapsed = ?started.elapsed(), "Succeeded after retries");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            warn!(operation = operation_name, error = %err, "Permanent error, not retrying");
            return Err(err);
        }
        let Some(delay) = backoff.next_delay() else {
            warn!(
                operation = operation_name,
                attempt,
                elapsed = ?started.elapsed(),
                error = %err,
                "Retry budget exhausted"
            );
            return Err(err);
        };

        debug!(operation = operation_name, attempt, delay = ?delay, error = %err, "Transient error, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Delay before verification attempt `attempt` (1-based): `attempt × step`.
#[must_use]
pub fn verification_delay(attempt: u32, step: Duration) -> Duration {
    step.saturating_mul(attempt)
}

/// Full verification schedule: one delay per attempt.
///
/// ```rust
/// use glinr_edge::reconcilers::retry::verification_schedule;
/// use std::time::Duration;
///
/// let schedule = verification_schedule(5, Duration::from_secs(10));
/// let total: Duration = schedule.iter().sum();
/// assert_eq!(total, Duration::from_secs(150));
/// ```
#[must_use]
pub fn verification_schedule(attempts: u32, step: Duration) -> Vec<Duration> {
    (1..=attempts)
        .map(|attempt| verification_delay(attempt, step))
        .collect()
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
