//! Bounded polling with an injectable sleep.

use std::future::Future;
use std::time::Duration;

/// Fixed-interval, attempt-bounded polling policy.
///
/// The delay is taken before every attempt, including the first one, so a freshly created
/// custodian transaction gets a full interval before its status is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_INTERVAL)
    }
}

/// Source of delays between poll attempts.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Result of a single poll attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Ready(T),
    Pending,
}

/// Runs `attempt` until it is ready, fails, or the policy's attempt budget runs out.
///
/// Returns `Ok(None)` when every attempt came back pending. Attempts run strictly one after
/// another; an error ends polling immediately.
pub async fn poll_until<T, E, F, Fut>(
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    mut attempt: F,
) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
{
    for n in 1..=policy.max_attempts {
        sleeper.sleep(policy.interval).await;
        if let PollStatus::Ready(value) = attempt(n).await? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}
