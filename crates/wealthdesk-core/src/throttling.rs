//! Per-provider request budgets backed by `governor` token buckets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::RateLimiter as GovernorLimiter;
use tokio::time::Instant;

use crate::provider_policy::ProviderPolicy;
use crate::ProviderId;

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared limiter handle. Cloning shares the underlying buckets.
#[derive(Clone)]
pub struct RateLimiter {
    limiters: Arc<HashMap<ProviderId, DirectLimiter>>,
    clock: DefaultClock,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers = self.limiters.keys().copied().collect::<Vec<_>>();
        providers.sort();
        f.debug_struct("RateLimiter")
            .field("providers", &providers)
            .finish()
    }
}

impl RateLimiter {
    pub fn new<'a>(policies: impl IntoIterator<Item = &'a ProviderPolicy>) -> Self {
        let limiters = policies
            .into_iter()
            .map(|policy| {
                (policy.provider_id, GovernorLimiter::direct(policy.quota.to_governor()))
            })
            .collect();
        Self {
            limiters: Arc::new(limiters),
            clock: DefaultClock::default(),
        }
    }

    pub fn from_defaults() -> Self {
        Self::new(ProviderPolicy::defaults().iter())
    }

    /// No provider is throttled.
    pub fn unlimited() -> Self {
        Self {
            limiters: Arc::new(HashMap::new()),
            clock: DefaultClock::default(),
        }
    }

    /// Takes one unit of budget, or returns how long to wait before asking again.
    ///
    /// A zero duration means the call may go out immediately.
    pub fn acquire(&self, provider: ProviderId) -> Duration {
        let Some(limiter) = self.limiters.get(&provider) else {
            return Duration::ZERO;
        };
        match limiter.check() {
            Ok(()) => Duration::ZERO,
            Err(not_until) => not_until.wait_time_from(self.clock.now()),
        }
    }

    /// Sleeps until budget is available. Gives up with the pending wait when
    /// waiting would exceed `max_wait`.
    pub async fn until_ready(&self, provider: ProviderId, max_wait: Duration) -> Result<(), Duration> {
        let started = Instant::now();
        loop {
            let wait = self.acquire(provider);
            if wait.is_zero() {
                return Ok(());
            }
            if started.elapsed() + wait > max_wait {
                return Err(wait);
            }
            tracing::debug!(
                provider = %provider,
                wait_ms = wait.as_millis() as u64,
                "waiting for rate budget"
            );
            tokio::time::sleep(wait).await;
        }
    }
}
