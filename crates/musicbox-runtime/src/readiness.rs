use std::future::Future;
use std::time::Duration;

use musicbox_core::ReadinessConfig;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub settle: Duration,
}

impl ReadinessPolicy {
    fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_factor.is_nan() || self.backoff_factor <= 1.0 {
            return current;
        }
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .map(|next| next.min(self.max_interval))
            .unwrap_or(self.max_interval)
    }
}

impl From<&ReadinessConfig> for ReadinessPolicy {
    fn from(cfg: &ReadinessConfig) -> Self {
        Self {
            interval: cfg.poll_interval(),
            max_attempts: cfg.max_attempts,
            backoff_factor: cfg.backoff_factor,
            max_interval: cfg.max_interval(),
            settle: cfg.settle(),
        }
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::from(&ReadinessConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
    Cancelled,
}

/// Sleeps one interval, then checks; repeats up to `max_attempts` times.
pub async fn poll_until<F, Fut>(
    policy: &ReadinessPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut interval = policy.interval;
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(interval) => {}
        }
        if check().await {
            return PollOutcome::Ready { attempts: attempt };
        }
        interval = policy.next_interval(interval);
    }
    PollOutcome::TimedOut {
        attempts: policy.max_attempts,
    }
}

/// Returns `false` if cancelled before `duration` elapsed.
pub async fn settle(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
