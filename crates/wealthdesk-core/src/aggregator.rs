//! Market data aggregator.
//!
//! One [`MarketDataAggregator::aggregate`] call fans out every provider request
//! for a run onto a [`JoinSet`], waits for all of them (or the aggregation
//! deadline) and merges the results into a [`MarketDataSnapshot`]. Provider
//! errors never escape: exhausted symbols are recorded as failed entries.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::cache::{CacheKey, CacheStore, CacheTtlByKind, CachedValue};
use crate::calendar::{MarketCalendar, MarketSession};
use crate::data_source::{
    BarsRequest, Endpoint, FxRequest, IndicatorRequest, NewsRequest, NewsScope, QuoteRequest,
};
use crate::indicators::TechnicalIndicators;
use crate::routing::{AttemptError, FallbackExecutor, ProviderRegistry, RouteFailure, RouteSuccess};
use crate::sentiment::{score_unscored, SentimentSummary};
use crate::snapshot::{
    MarketDataSnapshot, ProviderTally, QuoteStatus, SnapshotVersion, SymbolData,
};
use crate::throttling::RateLimiter;
use crate::{
    BarSeries, ClientProfile, CurrencyPair, EconomicIndicator, FxRate, Interval, NewsItem,
    PriceQuote, ProviderId, Symbol, UtcDateTime,
};

/// Attempt codes that mean "not tried" rather than "tried and failed".
const SKIP_CODES: [&str; 3] = [
    "source.not_registered",
    "source.unsupported_endpoint",
    "source.no_candidate",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("aggregation requires at least one symbol")]
    EmptySymbolSet,
}

/// Provider priority lists, one per data kind. The first entry is the primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderChains {
    pub quote: Vec<ProviderId>,
    pub bars: Vec<ProviderId>,
    /// Market-wide headlines.
    pub news: Vec<ProviderId>,
    pub company_news: Vec<ProviderId>,
    pub indicator: Vec<ProviderId>,
    pub fx: Vec<ProviderId>,
}

impl Default for ProviderChains {
    fn default() -> Self {
        Self {
            quote: vec![ProviderId::Yahoo, ProviderId::Polygon, ProviderId::Alphavantage],
            bars: vec![ProviderId::Yahoo, ProviderId::Polygon],
            news: vec![ProviderId::Newsapi],
            company_news: vec![ProviderId::Finnhub, ProviderId::Newsapi],
            indicator: vec![ProviderId::Fred],
            fx: vec![ProviderId::Yahoo, ProviderId::Alphavantage],
        }
    }
}

/// Per-run aggregation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub chains: ProviderChains,
    /// Bound on the whole fan-out.
    pub aggregation_timeout: Duration,
    /// Bound on each provider call, retries included.
    pub provider_timeout: Duration,
    pub economic_series: Vec<String>,
    /// Daily bars requested per symbol.
    pub history_days: usize,
    pub news_lookback_days: u32,
    pub news_limit: usize,
    pub market_news_topic: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            chains: ProviderChains::default(),
            aggregation_timeout: Duration::from_secs(60),
            provider_timeout: Duration::from_secs(10),
            economic_series: ["CPIAUCSL", "UNRATE", "GDP", "FEDFUNDS", "GS10"]
                .into_iter()
                .map(String::from)
                .collect(),
            history_days: 250,
            news_lookback_days: 7,
            news_limit: 20,
            market_news_topic: String::from("business"),
        }
    }
}

/// Shared handles injected into the aggregator. Clones share cache and limiter state.
#[derive(Debug, Clone)]
pub struct AggregatorContext {
    pub registry: Arc<ProviderRegistry>,
    pub cache: CacheStore,
    pub limiter: RateLimiter,
    pub calendar: MarketCalendar,
    pub ttls: CacheTtlByKind,
}

impl AggregatorContext {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            cache: CacheStore::new(),
            limiter: RateLimiter::from_defaults(),
            calendar: MarketCalendar::default(),
            ttls: CacheTtlByKind::default(),
        }
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_calendar(mut self, calendar: MarketCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_ttls(mut self, ttls: CacheTtlByKind) -> Self {
        self.ttls = ttls;
        self
    }
}

struct Shared {
    executor: FallbackExecutor,
    cache: CacheStore,
    calendar: MarketCalendar,
    ttls: CacheTtlByKind,
    config: AggregatorConfig,
}

/// Builds one snapshot per call. Cheap to clone.
#[derive(Clone)]
pub struct MarketDataAggregator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MarketDataAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataAggregator")
            .field("providers", &self.shared.executor.registry().providers())
            .field("config", &self.shared.config)
            .finish()
    }
}

/// Identifies a spawned task so unfinished work can be reported after a timeout.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum TaskLabel {
    Symbol(Symbol),
    CompanyNews(Symbol),
    MarketNews,
    Indicator(String),
    Fx(CurrencyPair),
}

impl std::fmt::Display for TaskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Symbol(symbol) => write!(f, "quote for {symbol}"),
            Self::CompanyNews(symbol) => write!(f, "news for {symbol}"),
            Self::MarketNews => f.write_str("market news"),
            Self::Indicator(series) => write!(f, "indicator {series}"),
            Self::Fx(pair) => write!(f, "fx rate {pair}"),
        }
    }
}

enum TaskOutput {
    Symbol(Symbol, SymbolData),
    News(Vec<NewsItem>),
    Indicator(Option<EconomicIndicator>),
    Fx(Option<FxRate>),
}

struct TaskReport {
    label: TaskLabel,
    output: TaskOutput,
    calls: Vec<(ProviderId, bool)>,
    warnings: Vec<String>,
}

impl TaskReport {
    fn new(label: TaskLabel, output: TaskOutput) -> Self {
        Self {
            label,
            output,
            calls: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Routed outcome with its call tally, before it is folded into a [`TaskReport`].
struct Fetched<T> {
    value: Option<T>,
    status: QuoteStatus,
    source_chain: Vec<ProviderId>,
    errors: Vec<AttemptError>,
    calls: Vec<(ProviderId, bool)>,
    warnings: Vec<String>,
}

impl<T> Fetched<T> {
    fn cached(provider: ProviderId, value: T) -> Self {
        Self {
            value: Some(value),
            status: QuoteStatus::Cached,
            source_chain: vec![provider],
            errors: Vec::new(),
            calls: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn routed(result: Result<RouteSuccess<T>, RouteFailure>) -> Self {
        match result {
            Ok(success) => {
                let mut calls = attempted(&success.errors);
                calls.push((success.selected_source, true));
                Self {
                    status: if success.used_fallback() {
                        QuoteStatus::Fallback
                    } else {
                        QuoteStatus::Ok
                    },
                    value: Some(success.data),
                    source_chain: success.source_chain,
                    errors: success.errors,
                    calls,
                    warnings: success.warnings,
                }
            }
            Err(failure) => Self {
                value: None,
                status: QuoteStatus::Failed,
                calls: attempted(&failure.errors),
                source_chain: failure.source_chain,
                errors: failure.errors,
                warnings: failure.warnings,
            },
        }
    }

    fn skipped(warning: String) -> Self {
        Self {
            value: None,
            status: QuoteStatus::Failed,
            source_chain: Vec::new(),
            errors: Vec::new(),
            calls: Vec::new(),
            warnings: vec![warning],
        }
    }

    fn selected(&self) -> Option<ProviderId> {
        self.value.as_ref()?;
        self.source_chain.last().copied()
    }
}

fn attempted(errors: &[AttemptError]) -> Vec<(ProviderId, bool)> {
    errors
        .iter()
        .filter(|error| !SKIP_CODES.contains(&error.code.as_str()))
        .map(|error| (error.provider, false))
        .collect()
}

impl<T> Fetched<Option<T>> {
    /// A provider answered but had nothing usable.
    fn flatten(self) -> Fetched<T> {
        let status = if self.value.as_ref().is_some_and(Option::is_some) {
            self.status
        } else {
            QuoteStatus::Failed
        };
        Fetched {
            value: self.value.flatten(),
            status,
            source_chain: self.source_chain,
            errors: self.errors,
            calls: self.calls,
            warnings: self.warnings,
        }
    }
}

impl MarketDataAggregator {
    pub fn new(context: AggregatorContext, config: AggregatorConfig) -> Self {
        let executor = FallbackExecutor::new(context.registry, context.limiter)
            .with_call_timeout(config.provider_timeout);
        Self {
            shared: Arc::new(Shared {
                executor,
                cache: context.cache,
                calendar: context.calendar,
                ttls: context.ttls,
                config,
            }),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        self.shared.executor.registry()
    }

    pub fn calendar(&self) -> &MarketCalendar {
        &self.shared.calendar
    }

    pub async fn aggregate(
        &self,
        symbols: &[Symbol],
        profile: &ClientProfile,
    ) -> Result<MarketDataSnapshot, AggregationError> {
        self.aggregate_at(symbols, profile, UtcDateTime::now()).await
    }

    /// Like [`MarketDataAggregator::aggregate`] but never waits past `budget`,
    /// even when the configured aggregation timeout is longer.
    pub async fn aggregate_within(
        &self,
        symbols: &[Symbol],
        profile: &ClientProfile,
        budget: Duration,
    ) -> Result<MarketDataSnapshot, AggregationError> {
        let budget = budget.min(self.shared.config.aggregation_timeout);
        self.aggregate_bounded(symbols, profile, UtcDateTime::now(), budget).await
    }

    /// Aggregates as if the wall clock read `now`; session state and cache buckets follow it.
    pub async fn aggregate_at(
        &self,
        symbols: &[Symbol],
        profile: &ClientProfile,
        now: UtcDateTime,
    ) -> Result<MarketDataSnapshot, AggregationError> {
        self.aggregate_bounded(symbols, profile, now, self.shared.config.aggregation_timeout)
            .await
    }

    async fn aggregate_bounded(
        &self,
        symbols: &[Symbol],
        profile: &ClientProfile,
        now: UtcDateTime,
        budget: Duration,
    ) -> Result<MarketDataSnapshot, AggregationError> {
        let requested = symbols.iter().cloned().collect::<BTreeSet<_>>();
        if requested.is_empty() {
            return Err(AggregationError::EmptySymbolSet);
        }

        let started = Instant::now();
        let deadline = started + budget;
        let session = self.shared.calendar.session(now);
        tracing::info!(
            symbols = requested.len(),
            market_open = session.is_open,
            "aggregation started"
        );

        let mut warnings = Vec::new();
        let mut tasks = JoinSet::new();
        let mut pending = BTreeSet::new();

        for symbol in &requested {
            let this = self.clone();
            let task_symbol = symbol.clone();
            pending.insert(TaskLabel::Symbol(symbol.clone()));
            tasks.spawn(async move { this.fetch_symbol(task_symbol, session, now).await });

            let this = self.clone();
            let scope = NewsScope::Company {
                symbol: symbol.clone(),
            };
            let label = TaskLabel::CompanyNews(symbol.clone());
            pending.insert(label.clone());
            tasks.spawn(async move { this.fetch_news(label, scope, session, now).await });
        }

        let this = self.clone();
        let scope = NewsScope::Market {
            topic: self.shared.config.market_news_topic.clone(),
        };
        pending.insert(TaskLabel::MarketNews);
        tasks.spawn(async move { this.fetch_news(TaskLabel::MarketNews, scope, session, now).await });

        for series in &self.shared.config.economic_series {
            let this = self.clone();
            let series = series.clone();
            pending.insert(TaskLabel::Indicator(series.clone()));
            tasks.spawn(async move { this.fetch_indicator(series, session, now).await });
        }

        if !profile.base_currency.eq_ignore_ascii_case("USD") {
            match CurrencyPair::new("USD", &profile.base_currency) {
                Ok(pair) => {
                    let this = self.clone();
                    pending.insert(TaskLabel::Fx(pair.clone()));
                    tasks.spawn(async move { this.fetch_fx(pair, session, now).await });
                }
                Err(error) => warnings.push(format!("fx rate skipped: {error}")),
            }
        }

        let mut symbol_data = BTreeMap::new();
        let mut news = Vec::new();
        let mut indicators = Vec::new();
        let mut fx_rates = Vec::new();
        let mut tallies: BTreeMap<ProviderId, ProviderTally> = BTreeMap::new();
        let mut timed_out = false;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(report))) => {
                    pending.remove(&report.label);
                    for (provider, ok) in report.calls {
                        tallies.entry(provider).or_default().record(ok);
                    }
                    warnings.extend(report.warnings);
                    match report.output {
                        TaskOutput::Symbol(symbol, data) => {
                            symbol_data.insert(symbol, data);
                        }
                        TaskOutput::News(items) => news.extend(items),
                        TaskOutput::Indicator(indicator) => indicators.extend(indicator),
                        TaskOutput::Fx(rate) => fx_rates.extend(rate),
                    }
                }
                Ok(Some(Err(join_error))) => {
                    tracing::warn!(error = %join_error, "aggregation task did not complete");
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        let unfinished_reason = if timed_out {
            format!("aggregation timed out after {}ms", budget.as_millis())
        } else {
            String::from("aggregation task aborted")
        };
        for label in pending {
            tracing::warn!(task = %label, reason = %unfinished_reason, "task unfinished");
            warnings.push(format!("{label}: {unfinished_reason}"));
            if let TaskLabel::Symbol(symbol) = label {
                let error = AttemptError {
                    provider: self
                        .shared
                        .config
                        .chains
                        .quote
                        .first()
                        .copied()
                        .unwrap_or(ProviderId::Yahoo),
                    code: String::from("aggregation.timeout"),
                    message: unfinished_reason.clone(),
                    retryable: true,
                };
                symbol_data.insert(
                    symbol,
                    SymbolData::failed(self.shared.config.chains.quote.clone(), vec![error]),
                );
            }
        }

        let mut news = dedupe_news(news);
        score_unscored(&mut news);
        let sentiment_summary = SentimentSummary::from_items(&news);
        let series_order = &self.shared.config.economic_series;
        indicators.sort_by_key(|indicator: &EconomicIndicator| {
            series_order
                .iter()
                .position(|series| series.eq_ignore_ascii_case(&indicator.series_id))
                .unwrap_or(usize::MAX)
        });

        let snapshot = MarketDataSnapshot {
            version: SnapshotVersion::new(),
            as_of: now,
            market_session: session,
            symbols: symbol_data,
            news,
            indicators,
            fx_rates,
            sentiment_summary,
            provider_status: tallies
                .into_iter()
                .filter_map(|(provider, tally)| tally.status().map(|status| (provider, status)))
                .collect(),
            warnings,
            timed_out,
        };

        tracing::info!(
            version = %snapshot.version,
            symbols = snapshot.symbols.len(),
            failed = snapshot.failed_symbols().len(),
            news = snapshot.news.len(),
            timed_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregation finished"
        );
        Ok(snapshot)
    }

    async fn fetch_symbol(&self, symbol: Symbol, session: MarketSession, now: UtcDateTime) -> TaskReport {
        let quote = self.fetch_quote(&symbol, &session, now).await;
        let bars = self.fetch_bars(&symbol, &session, now).await;

        let mut calls = quote.calls;
        calls.extend(bars.calls);
        let mut warnings = quote.warnings;

        let technicals = match &bars.value {
            Some(series) => {
                let technicals = TechnicalIndicators::from_series(series);
                if technicals.is_none() {
                    warnings.push(format!(
                        "{symbol}: {} bars are too few for technical indicators",
                        series.bars.len()
                    ));
                }
                technicals
            }
            None => {
                warnings.push(format!("{symbol}: no price history available"));
                None
            }
        };

        let quote_value = quote.value.map(|quote| {
            if !session.is_open || quote.as_of < session.last_close {
                quote.into_stale(session.last_close)
            } else {
                quote
            }
        });
        let data = SymbolData {
            status: if quote_value.is_some() {
                quote.status
            } else {
                QuoteStatus::Failed
            },
            quote: quote_value,
            technicals,
            source_chain: quote.source_chain,
            errors: quote.errors,
        };

        tracing::debug!(symbol = %symbol, status = ?data.status, "symbol fetched");
        TaskReport {
            label: TaskLabel::Symbol(symbol.clone()),
            output: TaskOutput::Symbol(symbol, data),
            calls,
            warnings,
        }
    }

    async fn fetch_quote(&self, symbol: &Symbol, session: &MarketSession, now: UtcDateTime) -> Fetched<PriceQuote> {
        let chain = &self.shared.config.chains.quote;
        let resource = symbol.as_str();

        if let Some((provider, CachedValue::Quote(quote), age)) =
            self.cache_lookup(Endpoint::Quote, chain, resource, session, now).await
        {
            let quote = if age > self.freshness(provider) {
                quote.into_stale(session.last_close)
            } else {
                quote
            };
            tracing::debug!(symbol = %symbol, provider = %provider, "quote served from cache");
            return Fetched::cached(provider, quote);
        }

        let request = QuoteRequest::single(symbol.clone());
        let routed = self
            .shared
            .executor
            .route_quote(chain, &request)
            .await
            .map(|success| map_success(success, |batch| pick_quote(batch.quotes, symbol)));
        let mut fetched = Fetched::routed(routed).flatten();
        if fetched.value.is_none() && fetched.errors.is_empty() {
            fetched.warnings.push(format!("{symbol}: provider returned no quote"));
        }

        if let (Some(provider), Some(quote)) = (fetched.selected(), &fetched.value) {
            self.cache_store(provider, Endpoint::Quote, resource, CachedValue::Quote(quote.clone()), session, now)
                .await;
        }
        fetched
    }

    async fn fetch_bars(&self, symbol: &Symbol, session: &MarketSession, now: UtcDateTime) -> Fetched<BarSeries> {
        let chain = &self.shared.config.chains.bars;
        let limit = self.shared.config.history_days.max(1);
        let resource = format!("{symbol}:{}:{limit}", Interval::OneDay);

        if let Some((provider, CachedValue::Bars(series), _)) =
            self.cache_lookup(Endpoint::Bars, chain, &resource, session, now).await
        {
            return Fetched::cached(provider, series);
        }

        let request = match BarsRequest::new(symbol.clone(), Interval::OneDay, limit) {
            Ok(request) => request,
            Err(error) => return Fetched::skipped(format!("{symbol}: {}", error.message())),
        };
        let fetched = Fetched::routed(self.shared.executor.route_bars(chain, &request).await);
        if let (Some(provider), Some(series)) = (fetched.selected(), &fetched.value) {
            self.cache_store(provider, Endpoint::Bars, &resource, CachedValue::Bars(series.clone()), session, now)
                .await;
        }
        fetched
    }

    async fn fetch_news(&self, label: TaskLabel, scope: NewsScope, session: MarketSession, now: UtcDateTime) -> TaskReport {
        let config = &self.shared.config;
        let chain = match &scope {
            NewsScope::Market { .. } => &config.chains.news,
            NewsScope::Company { .. } => &config.chains.company_news,
        };
        let resource = scope.resource_id();

        if let Some((_, CachedValue::News(items), _)) =
            self.cache_lookup(Endpoint::News, chain, &resource, &session, now).await
        {
            return TaskReport::new(label, TaskOutput::News(items));
        }

        let from = now
            .checked_sub(time::Duration::days(i64::from(config.news_lookback_days)))
            .unwrap_or(now);
        let request = match NewsRequest::new(scope, from, now, config.news_limit.max(1)) {
            Ok(request) => request,
            Err(error) => {
                let mut report = TaskReport::new(label, TaskOutput::News(Vec::new()));
                report.warnings.push(error.message().to_owned());
                return report;
            }
        };

        let fetched = Fetched::routed(self.shared.executor.route_news(chain, &request).await);
        if let (Some(provider), Some(batch)) = (fetched.selected(), &fetched.value) {
            self.cache_store(provider, Endpoint::News, &resource, CachedValue::News(batch.items.clone()), &session, now)
                .await;
        }
        let items = fetched.value.map(|batch| batch.items).unwrap_or_default();
        TaskReport {
            label,
            output: TaskOutput::News(items),
            calls: fetched.calls,
            warnings: fetched.warnings,
        }
    }

    async fn fetch_indicator(&self, series: String, session: MarketSession, now: UtcDateTime) -> TaskReport {
        let label = TaskLabel::Indicator(series.clone());
        let chain = &self.shared.config.chains.indicator;
        let request = match IndicatorRequest::new(&series) {
            Ok(request) => request,
            Err(error) => {
                let mut report = TaskReport::new(label, TaskOutput::Indicator(None));
                report.warnings.push(error.message().to_owned());
                return report;
            }
        };

        if let Some((_, CachedValue::Indicator(indicator), _)) =
            self.cache_lookup(Endpoint::Indicator, chain, &request.series_id, &session, now).await
        {
            return TaskReport::new(label, TaskOutput::Indicator(Some(indicator)));
        }

        let fetched = Fetched::routed(self.shared.executor.route_indicator(chain, &request).await);
        if let (Some(provider), Some(indicator)) = (fetched.selected(), &fetched.value) {
            self.cache_store(
                provider,
                Endpoint::Indicator,
                &request.series_id,
                CachedValue::Indicator(indicator.clone()),
                &session,
                now,
            )
            .await;
        }
        TaskReport {
            label,
            output: TaskOutput::Indicator(fetched.value),
            calls: fetched.calls,
            warnings: fetched.warnings,
        }
    }

    async fn fetch_fx(&self, pair: CurrencyPair, session: MarketSession, now: UtcDateTime) -> TaskReport {
        let label = TaskLabel::Fx(pair.clone());
        let chain = &self.shared.config.chains.fx;
        let resource = pair.to_string();

        if let Some((_, CachedValue::Fx(rate), _)) =
            self.cache_lookup(Endpoint::Fx, chain, &resource, &session, now).await
        {
            return TaskReport::new(label, TaskOutput::Fx(Some(rate)));
        }

        let fetched = Fetched::routed(self.shared.executor.route_fx(chain, &FxRequest { pair }).await);
        if let (Some(provider), Some(rate)) = (fetched.selected(), &fetched.value) {
            self.cache_store(provider, Endpoint::Fx, &resource, CachedValue::Fx(rate.clone()), &session, now)
                .await;
        }
        TaskReport {
            label,
            output: TaskOutput::Fx(fetched.value),
            calls: fetched.calls,
            warnings: fetched.warnings,
        }
    }

    fn freshness(&self, provider: ProviderId) -> Duration {
        self.registry()
            .get(provider)
            .map(|source| source.freshness())
            .unwrap_or_default()
    }

    /// First cached entry along `chain`, in priority order.
    async fn cache_lookup(
        &self,
        endpoint: Endpoint,
        chain: &[ProviderId],
        resource: &str,
        session: &MarketSession,
        now: UtcDateTime,
    ) -> Option<(ProviderId, CachedValue, Duration)> {
        let mut seen = HashSet::new();
        for provider in chain.iter().copied().filter(|provider| seen.insert(*provider)) {
            if self.registry().get(provider).is_none() {
                continue;
            }
            let key = CacheKey::at(provider, endpoint, resource, self.freshness(provider), session, now);
            if let Some(hit) = self.shared.cache.get(&key).await {
                return Some((provider, hit.value, hit.age));
            }
        }
        None
    }

    async fn cache_store(
        &self,
        provider: ProviderId,
        endpoint: Endpoint,
        resource: &str,
        value: CachedValue,
        session: &MarketSession,
        now: UtcDateTime,
    ) {
        let key = CacheKey::at(provider, endpoint, resource, self.freshness(provider), session, now);
        let ttl = self.shared.ttls.effective_ttl(endpoint, session, now);
        self.shared.cache.put(key, value, ttl).await;
    }
}

fn map_success<T, U>(success: RouteSuccess<T>, map: impl FnOnce(T) -> Option<U>) -> RouteSuccess<Option<U>> {
    RouteSuccess {
        data: map(success.data),
        selected_source: success.selected_source,
        source_chain: success.source_chain,
        warnings: success.warnings,
        errors: success.errors,
        latency_ms: success.latency_ms,
    }
}

/// Quote for exactly `symbol`; a batch answering for other tickers yields nothing.
fn pick_quote(quotes: Vec<PriceQuote>, symbol: &Symbol) -> Option<PriceQuote> {
    quotes.into_iter().find(|quote| &quote.symbol == symbol)
}

/// De-duplicates by `(headline, url)` and orders newest first.
fn dedupe_news(mut items: Vec<NewsItem>) -> Vec<NewsItem> {
    items.sort_by(|left, right| right.published_at.cmp(&left.published_at));
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.dedupe_key()));
    items
}
