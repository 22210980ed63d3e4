use std::num::NonZeroU32;
use std::time::Duration;

use governor::Quota;

use crate::retry::RetryPolicy;
use crate::ProviderId;

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(86_400);

/// `requests` calls per `per`, all of which may be spent at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestQuota {
    pub requests: u32,
    pub per: Duration,
}

impl RequestQuota {
    pub const fn per_minute(requests: u32) -> Self {
        Self { requests, per: MINUTE }
    }

    pub const fn per_day(requests: u32) -> Self {
        Self { requests, per: DAY }
    }

    /// Time for one spent request to come back.
    pub fn replenish_interval(self) -> Duration {
        let requests = self.requests.max(1);
        (self.per / requests).max(Duration::from_millis(1))
    }

    /// Token bucket with burst `requests`, refilled one cell per interval.
    pub fn to_governor(self) -> Quota {
        let burst = NonZeroU32::new(self.requests).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(self.replenish_interval())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

/// How the fallback executor treats one provider: budget, retries, deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub quota: RequestQuota,
    pub retry: RetryPolicy,
    /// Upper bound on one provider's share of a routed call, retries included.
    pub call_timeout: Duration,
}

impl ProviderPolicy {
    pub fn new(provider_id: ProviderId, quota: RequestQuota) -> Self {
        Self {
            provider_id,
            quota,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Free-tier allowances as published by each vendor.
    pub fn default_for(provider_id: ProviderId) -> Self {
        let quota = match provider_id {
            ProviderId::Polygon | ProviderId::Alphavantage => RequestQuota::per_minute(5),
            ProviderId::Yahoo | ProviderId::Finnhub => RequestQuota::per_minute(60),
            ProviderId::Fred => RequestQuota::per_minute(120),
            ProviderId::Newsapi => RequestQuota::per_day(100),
        };
        Self::new(provider_id, quota)
    }

    pub fn defaults() -> Vec<Self> {
        ProviderId::ALL.into_iter().map(Self::default_for).collect()
    }
}
