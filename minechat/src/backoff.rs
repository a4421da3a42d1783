use std::{future::Future, time::Duration};

use rand::Rng;

use crate::config::BackoffPolicy;

/// Suspends the retrying task between attempts.
///
/// Injected so tests can observe the delays without waiting for them.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry bookkeeping for one reconnecting session.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    last_delay: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_delay: Duration::ZERO,
        }
    }

    /// Failed attempts since the last success.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_delay(&self) -> Duration {
        self.last_delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_delay = Duration::ZERO;
    }

    /// Records a failed attempt and returns how long to wait before the next one.
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    pub fn next_delay_with<R>(&mut self, rng: &mut R) -> Duration
    where
        R: Rng + ?Sized,
    {
        let delay = self.capped_exponential() + self.jitter(rng);
        self.attempt = self.attempt.saturating_add(1);
        self.last_delay = delay;
        delay
    }

    fn capped_exponential(&self) -> Duration {
        let factor = 2u32.checked_pow(self.attempt).unwrap_or(u32::MAX);
        self.policy
            .base
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.policy.max_delay)
    }

    fn jitter<R>(&self, rng: &mut R) -> Duration
    where
        R: Rng + ?Sized,
    {
        if self.policy.jitter.is_zero() {
            return Duration::ZERO;
        }
        rng.gen_range(Duration::ZERO..self.policy.jitter)
    }
}
