//! Bounded polling with a fixed delay.
//!
//! Every blocking point in the harness is the same shape: try something,
//! sleep a fixed interval, try again, give up after a capped attempt
//! count. VM-readiness waits, screenshot capture and observation capture
//! all share the [`poll_until`] combinator instead of hand-rolling the
//! loop at each call site.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// A capped attempt count with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least 1).
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a new retry policy.
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A single attempt with no delay.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Polls `attempt` until it yields `Some`, up to the policy's attempt cap.
///
/// Sleeps the fixed delay between attempts; the final failed attempt does
/// not sleep. Exhausting the cap returns `None`; the caller decides
/// whether a degraded result is acceptable.
pub async fn poll_until<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let attempts = policy.attempts.max(1);
    for i in 0..attempts {
        if let Some(value) = attempt().await {
            return Some(value);
        }
        if i + 1 < attempts {
            debug!(attempt = i + 1, max = attempts, "poll attempt failed, retrying");
            tokio::time::sleep(policy.delay).await;
        }
    }
    None
}
