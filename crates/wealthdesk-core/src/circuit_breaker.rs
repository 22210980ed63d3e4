use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive transport failures that open the circuit.
    pub failure_threshold: u32,
    /// Time an open circuit rejects calls before admitting a trial call.
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant, failures: u32 },
    HalfOpen { failures: u32 },
}

impl Phase {
    const fn failures(self) -> u32 {
        match self {
            Self::Closed { failures } | Self::Open { failures, .. } | Self::HalfOpen { failures } => {
                failures
            }
        }
    }
}

/// Breaker in front of one live provider.
///
/// Only transport failures and 5xx answers count. A 404 or an empty result is
/// a healthy reply and closes the circuit.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: ProviderId,
    config: CircuitBreakerConfig,
    phase: Mutex<Phase>,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderId, config: CircuitBreakerConfig) -> Self {
        Self {
            provider,
            config,
            phase: Mutex::new(Phase::Closed { failures: 0 }),
        }
    }

    pub fn for_provider(provider: ProviderId) -> Self {
        Self::new(provider, CircuitBreakerConfig::default())
    }

    fn update<R>(&self, f: impl FnOnce(&mut Phase) -> R) -> R {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut phase)
    }

    /// False while open. Once the cool-down has passed the circuit turns
    /// half-open and calls go out again until one of them is recorded.
    pub fn allow_request(&self) -> bool {
        let cool_down = self.config.cool_down;
        self.update(|phase| match *phase {
            Phase::Closed { .. } | Phase::HalfOpen { .. } => true,
            Phase::Open { since, failures } if since.elapsed() >= cool_down => {
                *phase = Phase::HalfOpen { failures };
                true
            }
            Phase::Open { .. } => false,
        })
    }

    pub fn record_success(&self) {
        let previous = self.update(|phase| std::mem::replace(phase, Phase::Closed { failures: 0 }));
        if !matches!(previous, Phase::Closed { .. }) {
            tracing::info!(provider = %self.provider, "circuit closed");
        }
    }

    pub fn record_failure(&self) {
        let threshold = self.config.failure_threshold;
        let opened = self.update(|phase| {
            let failures = phase.failures().saturating_add(1);
            let (next, opened) = match *phase {
                Phase::HalfOpen { .. } => (Phase::Open { since: Instant::now(), failures }, true),
                Phase::Closed { .. } if failures >= threshold => {
                    (Phase::Open { since: Instant::now(), failures }, true)
                }
                Phase::Closed { .. } => (Phase::Closed { failures }, false),
                Phase::Open { since, .. } => (Phase::Open { since, failures }, false),
            };
            *phase = next;
            opened.then_some(failures)
        });
        if let Some(failures) = opened {
            tracing::warn!(provider = %self.provider, failures, "circuit opened");
        }
    }

    pub fn state(&self) -> CircuitState {
        self.update(|phase| match phase {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        })
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.update(|phase| phase.failures())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, cool_down_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            ProviderId::Alphavantage,
            CircuitBreakerConfig {
                failure_threshold,
                cool_down: Duration::from_secs(cool_down_secs),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn trips_on_threshold_and_rejects_until_cool_down() {
        let breaker = breaker(2, 30);

        breaker.record_failure();
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!breaker.allow_request());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_call_reopens_immediately() {
        let breaker = breaker(3, 5);
        for _ in 0..3 {
            breaker.record_failure();
        }
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(breaker.allow_request());

        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.consecutive_failures(), 4);
        assert!(!breaker.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_reply_closes_and_clears_count() {
        let breaker = breaker(3, 5);
        breaker.record_failure();
        breaker.record_failure();

        breaker.record_success();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }
}
