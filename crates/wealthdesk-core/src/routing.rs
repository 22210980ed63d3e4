//! Provider registry and the generic fallback loop.
//!
//! A fallback chain is a plain priority list of [`ProviderId`]s. One loop,
//! [`FallbackExecutor::execute`], walks any chain for any endpoint: skipped
//! providers, throttled retries, timeouts and fall-through are all handled there.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::adapters::{
    AlphaVantageAdapter, FinnhubAdapter, FredAdapter, NewsApiAdapter, PolygonAdapter,
    YahooAdapter,
};
use crate::data_source::{
    BarsRequest, CapabilitySet, DataSource, Endpoint, FxRequest, HealthState, HealthStatus,
    IndicatorRequest, NewsBatch, NewsRequest, QuoteBatch, QuoteRequest, SourceError, SourceFuture,
};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::RateLimiter;
use crate::{BarSeries, EconomicIndicator, FxRate, ProviderId};

/// One failed or skipped provider attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptError {
    pub provider: ProviderId,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl AttemptError {
    pub fn from_source(provider: ProviderId, error: &SourceError) -> Self {
        Self {
            provider,
            code: error.code().to_owned(),
            message: error.message().to_owned(),
            retryable: error.retryable(),
        }
    }

    fn not_registered(provider: ProviderId) -> Self {
        Self {
            provider,
            code: String::from("source.not_registered"),
            message: format!("provider '{provider}' is not registered"),
            retryable: false,
        }
    }
}

/// Successful routed call.
#[derive(Debug, Clone)]
pub struct RouteSuccess<T> {
    pub data: T,
    pub selected_source: ProviderId,
    /// Providers tried, in order, ending with `selected_source`.
    pub source_chain: Vec<ProviderId>,
    pub warnings: Vec<String>,
    pub errors: Vec<AttemptError>,
    pub latency_ms: u64,
}

impl<T> RouteSuccess<T> {
    /// Whether an earlier provider in the chain was passed over.
    pub fn used_fallback(&self) -> bool {
        self.source_chain.first() != Some(&self.selected_source)
    }
}

/// Every provider in the chain failed or was skipped.
#[derive(Debug, Clone)]
pub struct RouteFailure {
    pub source_chain: Vec<ProviderId>,
    pub warnings: Vec<String>,
    pub errors: Vec<AttemptError>,
    pub latency_ms: u64,
}

pub type RouteResult<T> = Result<RouteSuccess<T>, RouteFailure>;

/// Source state reported by the `sources` command.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SourceSnapshot {
    pub id: ProviderId,
    pub capabilities: CapabilitySet,
    pub health: HealthStatus,
    pub freshness_secs: u64,
}

impl SourceSnapshot {
    pub fn available(self) -> bool {
        self.health.state != HealthState::Unhealthy
    }

    pub fn status_label(self) -> &'static str {
        if !self.health.rate_available {
            return "rate_limited";
        }

        match self.health.state {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

/// Registered provider clients keyed by id.
pub struct ProviderRegistry {
    sources: HashMap<ProviderId, Arc<dyn DataSource>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

impl ProviderRegistry {
    /// Later sources replace earlier ones with the same id.
    pub fn new(sources: Vec<Arc<dyn DataSource>>) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| (source.id(), source))
            .collect();
        Self { sources }
    }

    /// Every provider in offline mode.
    pub fn offline() -> Self {
        ProviderRegistryBuilder::new().with_mock_mode().build()
    }

    pub fn get(&self, provider: ProviderId) -> Option<&Arc<dyn DataSource>> {
        self.sources.get(&provider)
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        let mut providers = self.sources.keys().copied().collect::<Vec<_>>();
        providers.sort();
        providers
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub async fn snapshot(&self, provider: ProviderId) -> Option<SourceSnapshot> {
        let source = self.sources.get(&provider)?;
        Some(SourceSnapshot {
            id: provider,
            capabilities: source.capabilities(),
            health: source.health().await,
            freshness_secs: source.freshness().as_secs(),
        })
    }

    pub async fn snapshots(&self) -> Vec<SourceSnapshot> {
        let mut output = Vec::with_capacity(self.sources.len());
        for provider in self.providers() {
            if let Some(snapshot) = self.snapshot(provider).await {
                output.push(snapshot);
            }
        }
        output
    }
}

/// Builds a [`ProviderRegistry`] with live or offline adapters.
///
/// # Environment Variables
///
/// | Provider | Primary Env Var | Fallback Env Var |
/// |----------|-----------------|------------------|
/// | Polygon | `WEALTHDESK_POLYGON_API_KEY` | `POLYGON_API_KEY` |
/// | Alpha Vantage | `WEALTHDESK_ALPHAVANTAGE_API_KEY` | `ALPHAVANTAGE_API_KEY` |
/// | Finnhub | `WEALTHDESK_FINNHUB_API_KEY` | `FINNHUB_API_KEY` |
/// | NewsAPI | `WEALTHDESK_NEWSAPI_API_KEY` | `NEWSAPI_API_KEY` |
/// | FRED | `WEALTHDESK_FRED_API_KEY` | `FRED_API_KEY` |
/// | Yahoo | (no key required) | - |
///
/// A keyed provider without credentials runs offline.
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    use_mock: bool,
    keys: HashMap<ProviderId, String>,
    disabled: BTreeSet<ProviderId>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl ProviderRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every adapter serves deterministic offline data.
    pub fn with_mock_mode(mut self) -> Self {
        self.use_mock = true;
        self
    }

    /// Reads credentials from the environment.
    pub fn with_env_keys(mut self) -> Self {
        for provider in ProviderId::ALL {
            if let Some(key) = provider.resolve_key(|name| env::var(name).ok()) {
                self.keys.insert(provider, key);
            }
        }
        self
    }

    pub fn with_key(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        self.keys.insert(provider, key.into());
        self
    }

    pub fn with_enabled(mut self, provider: ProviderId, enabled: bool) -> Self {
        if enabled {
            self.disabled.remove(&provider);
        } else {
            self.disabled.insert(provider);
        }
        self
    }

    /// Transport shared by live adapters. Defaults to reqwest.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn build(self) -> ProviderRegistry {
        let http_client = if self.use_mock {
            None
        } else {
            Some(
                self.http_client
                    .clone()
                    .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new())),
            )
        };

        let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();
        for provider in ProviderId::ALL {
            if self.disabled.contains(&provider) {
                continue;
            }
            let live = http_client.as_ref().and_then(|client| {
                if provider == ProviderId::Yahoo {
                    return Some((client.clone(), String::new()));
                }
                match self.keys.get(&provider) {
                    Some(key) => Some((client.clone(), key.clone())),
                    None => {
                        tracing::info!(provider = %provider, "no credentials found; provider runs offline");
                        None
                    }
                }
            });
            sources.push(build_source(provider, live));
        }

        ProviderRegistry::new(sources)
    }
}

fn build_source(provider: ProviderId, live: Option<(Arc<dyn HttpClient>, String)>) -> Arc<dyn DataSource> {
    match (provider, live) {
        (ProviderId::Yahoo, Some((client, _))) => Arc::new(YahooAdapter::with_http_client(client)),
        (ProviderId::Yahoo, None) => Arc::new(YahooAdapter::default()),
        (ProviderId::Polygon, Some((client, key))) => {
            Arc::new(PolygonAdapter::with_http_client(client, key))
        }
        (ProviderId::Polygon, None) => Arc::new(PolygonAdapter::default()),
        (ProviderId::Alphavantage, Some((client, key))) => {
            Arc::new(AlphaVantageAdapter::with_http_client(client, key))
        }
        (ProviderId::Alphavantage, None) => Arc::new(AlphaVantageAdapter::default()),
        (ProviderId::Finnhub, Some((client, key))) => {
            Arc::new(FinnhubAdapter::with_http_client(client, key))
        }
        (ProviderId::Finnhub, None) => Arc::new(FinnhubAdapter::default()),
        (ProviderId::Newsapi, Some((client, key))) => {
            Arc::new(NewsApiAdapter::with_http_client(client, key))
        }
        (ProviderId::Newsapi, None) => Arc::new(NewsApiAdapter::default()),
        (ProviderId::Fred, Some((client, key))) => Arc::new(FredAdapter::with_http_client(client, key)),
        (ProviderId::Fred, None) => Arc::new(FredAdapter::default()),
    }
}

/// Walks a provider priority list under rate limits, retries and call timeouts.
#[derive(Debug, Clone)]
pub struct FallbackExecutor {
    registry: Arc<ProviderRegistry>,
    limiter: RateLimiter,
    policies: HashMap<ProviderId, ProviderPolicy>,
}

impl FallbackExecutor {
    pub fn new(registry: Arc<ProviderRegistry>, limiter: RateLimiter) -> Self {
        let policies = ProviderPolicy::defaults()
            .into_iter()
            .map(|policy| (policy.provider_id, policy))
            .collect();
        Self {
            registry,
            limiter,
            policies,
        }
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.policies.insert(policy.provider_id, policy);
        self
    }

    /// Applies one call timeout to every provider.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        for policy in self.policies.values_mut() {
            policy.call_timeout = call_timeout;
        }
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn policy(&self, provider: ProviderId) -> ProviderPolicy {
        self.policies
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| ProviderPolicy::default_for(provider))
    }

    pub async fn execute<T, F>(&self, endpoint: Endpoint, chain: &[ProviderId], mut invoke: F) -> RouteResult<T>
    where
        F: for<'a> FnMut(&'a dyn DataSource) -> SourceFuture<'a, T>,
    {
        let started = Instant::now();
        let planned_chain = dedupe_chain(chain);
        let mut source_chain = Vec::with_capacity(planned_chain.len());
        let mut errors = Vec::new();

        for provider in planned_chain {
            source_chain.push(provider);
            let Some(source) = self.registry.get(provider) else {
                errors.push(AttemptError::not_registered(provider));
                continue;
            };

            if !source.capabilities().supports(endpoint) {
                errors.push(AttemptError::from_source(
                    provider,
                    &SourceError::unsupported_endpoint(endpoint),
                ));
                continue;
            }

            if source.health().await.state == HealthState::Unhealthy {
                errors.push(AttemptError::from_source(
                    provider,
                    &SourceError::unavailable("source health check reported unhealthy"),
                ));
                continue;
            }

            match self.call_with_retry(provider, endpoint, source.as_ref(), &mut invoke).await {
                Ok(data) => {
                    let mut warnings = Vec::new();
                    if !errors.is_empty() {
                        warnings.push(format!(
                            "{endpoint} served by '{provider}' after {} failed attempt(s)",
                            errors.len()
                        ));
                        tracing::info!(
                            provider = %provider,
                            endpoint = %endpoint,
                            failed_attempts = errors.len(),
                            "fallback succeeded"
                        );
                    }
                    return Ok(RouteSuccess {
                        data,
                        selected_source: provider,
                        source_chain,
                        warnings,
                        errors,
                        latency_ms: elapsed_ms(started),
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        provider = %provider,
                        endpoint = %endpoint,
                        code = error.code(),
                        "provider call failed: {}",
                        error.message()
                    );
                    errors.push(AttemptError::from_source(provider, &error));
                }
            }
        }

        if errors.is_empty() {
            errors.push(AttemptError {
                provider: ProviderId::Yahoo,
                code: String::from("source.no_candidate"),
                message: format!("no providers configured for endpoint '{endpoint}'"),
                retryable: false,
            });
        }

        Err(RouteFailure {
            source_chain,
            warnings: vec![format!("all providers failed for endpoint '{endpoint}'")],
            errors,
            latency_ms: elapsed_ms(started),
        })
    }

    async fn call_with_retry<T, F>(
        &self,
        provider: ProviderId,
        endpoint: Endpoint,
        source: &dyn DataSource,
        invoke: &mut F,
    ) -> Result<T, SourceError>
    where
        F: for<'a> FnMut(&'a dyn DataSource) -> SourceFuture<'a, T>,
    {
        let policy = self.policy(provider);
        let provider_started = Instant::now();
        let mut attempt = 0_u32;

        loop {
            if let Err(wait) = self.limiter.until_ready(provider, policy.call_timeout).await {
                return Err(SourceError::rate_limited(format!(
                    "{provider} rate budget exhausted; next slot in {:.2}s",
                    wait.as_secs_f64()
                )));
            }

            tracing::debug!(provider = %provider, endpoint = %endpoint, attempt, "calling provider");
            let error = match tokio::time::timeout(policy.call_timeout, invoke(source)).await {
                Ok(Ok(data)) => return Ok(data),
                Ok(Err(error)) => error,
                Err(_) => SourceError::unavailable(format!(
                    "{provider} did not answer within {}ms",
                    policy.call_timeout.as_millis()
                )),
            };

            if !policy.retry.should_retry(error.kind(), attempt) {
                return Err(error);
            }
            let delay = policy.retry.delay_for_attempt(attempt);
            if provider_started.elapsed() + delay > policy.call_timeout {
                return Err(error);
            }
            tracing::debug!(
                provider = %provider,
                delay_ms = delay.as_millis() as u64,
                "throttled by provider; backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    pub async fn route_quote(&self, chain: &[ProviderId], req: &QuoteRequest) -> RouteResult<QuoteBatch> {
        let req = req.clone();
        self.execute(Endpoint::Quote, chain, move |source| source.quote(req.clone()))
            .await
    }

    pub async fn route_bars(&self, chain: &[ProviderId], req: &BarsRequest) -> RouteResult<BarSeries> {
        let req = req.clone();
        self.execute(Endpoint::Bars, chain, move |source| source.bars(req.clone()))
            .await
    }

    pub async fn route_news(&self, chain: &[ProviderId], req: &NewsRequest) -> RouteResult<NewsBatch> {
        let req = req.clone();
        self.execute(Endpoint::News, chain, move |source| source.news(req.clone()))
            .await
    }

    pub async fn route_indicator(
        &self,
        chain: &[ProviderId],
        req: &IndicatorRequest,
    ) -> RouteResult<EconomicIndicator> {
        let req = req.clone();
        self.execute(Endpoint::Indicator, chain, move |source| {
            source.indicator(req.clone())
        })
        .await
    }

    pub async fn route_fx(&self, chain: &[ProviderId], req: &FxRequest) -> RouteResult<FxRate> {
        let req = req.clone();
        self.execute(Endpoint::Fx, chain, move |source| source.fx_rate(req.clone()))
            .await
    }
}

fn dedupe_chain(chain: &[ProviderId]) -> Vec<ProviderId> {
    let mut seen = HashSet::new();
    let mut output = Vec::with_capacity(chain.len());

    for provider in chain {
        if seen.insert(*provider) {
            output.push(*provider);
        }
    }

    output
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
