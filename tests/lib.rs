// Shared fakes and fixtures for the behavior suites.
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use wealthdesk_agent::{AgentId, LanguageModel, ModelError, ModelFuture, ModelRequest};
pub use wealthdesk_core::{
    AggregatorConfig, AggregatorContext, CapabilitySet, ClientProfile, DataSource, EconomicIndicator,
    Endpoint, HealthStatus, Holding, IndicatorRequest, MarketDataAggregator, NewsBatch, NewsItem,
    NewsRequest, NewsScope, Portfolio, PriceQuote, ProviderChains, ProviderId, ProviderRegistry,
    QuoteBatch, QuoteRequest, RateLimiter, RiskTolerance, SourceError, SourceFuture, Symbol,
    UtcDateTime,
};

/// Quote-only provider with per-symbol failures and hangs.
pub struct ScriptedQuotes {
    id: ProviderId,
    price: f64,
    fail: Vec<String>,
    hang: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedQuotes {
    pub fn new(id: ProviderId, price: f64) -> Self {
        Self {
            id,
            price,
            fail: Vec::new(),
            hang: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(mut self, symbols: &[&str]) -> Self {
        self.fail.extend(symbols.iter().map(|s| s.to_string()));
        self
    }

    pub fn hanging(mut self, symbols: &[&str]) -> Self {
        self.hang.extend(symbols.iter().map(|s| s.to_string()));
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl DataSource for ScriptedQuotes {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none().with(Endpoint::Quote)
    }

    fn freshness(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, QuoteBatch> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let symbol = req.symbols[0].clone();
            if self.hang.iter().any(|s| s == symbol.as_str()) {
                std::future::pending::<()>().await;
            }
            if self.fail.iter().any(|s| s == symbol.as_str()) {
                return Err(SourceError::unavailable("scripted outage"));
            }
            let quote = PriceQuote::new(symbol, self.price, "USD", UtcDateTime::now(), self.id)
                .map_err(|error| SourceError::malformed(error.to_string()))?;
            Ok(QuoteBatch { quotes: vec![quote] })
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async { HealthStatus::healthy() })
    }
}

/// News provider with nothing to say.
pub struct QuietNews;

impl DataSource for QuietNews {
    fn id(&self) -> ProviderId {
        ProviderId::Newsapi
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none().with(Endpoint::News)
    }

    fn freshness(&self) -> Duration {
        Duration::from_secs(900)
    }

    fn news<'a>(&'a self, _req: NewsRequest) -> SourceFuture<'a, NewsBatch> {
        Box::pin(async { Ok(NewsBatch { items: Vec::new() }) })
    }
}

/// Finnhub stand-in: one headline per company request, one market headline.
pub struct HeadlineNews;

impl DataSource for HeadlineNews {
    fn id(&self) -> ProviderId {
        ProviderId::Finnhub
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none().with(Endpoint::News)
    }

    fn freshness(&self) -> Duration {
        Duration::from_secs(900)
    }

    fn news<'a>(&'a self, req: NewsRequest) -> SourceFuture<'a, NewsBatch> {
        Box::pin(async move {
            let item = match req.scope {
                NewsScope::Company { symbol } => {
                    NewsItem::new(format!("{symbol} beats estimates"), "Wire", req.to, self.id())
                        .with_url(Some(format!("https://news.test/{symbol}")))
                        .with_symbols(vec![symbol])
                }
                NewsScope::Market { .. } => NewsItem::new("Fed holds rates steady", "Wire", req.to, self.id())
                    .with_url(Some(String::from("https://news.test/fed"))),
            };
            Ok(NewsBatch { items: vec![item] })
        })
    }
}

/// FRED stand-in answering every series with the same value.
pub struct FixedSeries(pub f64);

impl DataSource for FixedSeries {
    fn id(&self) -> ProviderId {
        ProviderId::Fred
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none().with(Endpoint::Indicator)
    }

    fn freshness(&self) -> Duration {
        Duration::from_secs(3_600)
    }

    fn indicator<'a>(&'a self, req: IndicatorRequest) -> SourceFuture<'a, EconomicIndicator> {
        Box::pin(async move {
            EconomicIndicator::new(req.series_id, self.0, session_open(), self.id())
                .map_err(|error| SourceError::malformed(error.to_string()))
        })
    }
}

/// Quotes from Yahoo then Polygon, market news only, no bars or macro series.
pub fn quotes_only_config() -> AggregatorConfig {
    AggregatorConfig {
        chains: ProviderChains {
            quote: vec![ProviderId::Yahoo, ProviderId::Polygon],
            bars: Vec::new(),
            news: vec![ProviderId::Newsapi],
            company_news: Vec::new(),
            indicator: Vec::new(),
            fx: Vec::new(),
        },
        economic_series: Vec::new(),
        ..AggregatorConfig::default()
    }
}

pub fn scripted_aggregator(
    sources: Vec<Arc<dyn DataSource>>,
    config: AggregatorConfig,
) -> MarketDataAggregator {
    MarketDataAggregator::new(scripted_context(sources), config)
}

pub fn scripted_context(sources: Vec<Arc<dyn DataSource>>) -> AggregatorContext {
    AggregatorContext::new(Arc::new(ProviderRegistry::new(sources)))
        .with_limiter(RateLimiter::unlimited())
}

pub fn offline_context() -> AggregatorContext {
    AggregatorContext::new(Arc::new(ProviderRegistry::offline())).with_limiter(RateLimiter::unlimited())
}

pub fn symbols(raw: &[&str]) -> Vec<Symbol> {
    raw.iter()
        .map(|raw| Symbol::parse(raw).expect("valid symbol"))
        .collect()
}

pub fn client(base_currency: &str) -> ClientProfile {
    ClientProfile {
        client_id: String::from("client-42"),
        name: String::from("Jordan Example"),
        age: 52,
        risk_tolerance: RiskTolerance::Moderate,
        time_horizon_years: 13,
        goals: vec![String::from("retire at 65"), String::from("fund education")],
        constraints: vec![String::from("no tobacco")],
        annual_income: Some(145_000.0),
        tax_bracket: Some(0.33),
        province: Some(String::from("ON")),
        retirement_age: Some(65),
        base_currency: base_currency.to_owned(),
    }
}

pub fn holdings(raw: &[&str]) -> Portfolio {
    let holdings = symbols(raw)
        .into_iter()
        .map(|symbol| Holding::new(symbol, 25.0, 4_000.0).expect("valid holding"))
        .collect();
    let mut portfolio = Portfolio::new("client-42", holdings);
    portfolio.cash = 2_500.0;
    portfolio
}

/// Wednesday, mid-session in New York.
pub fn session_open() -> UtcDateTime {
    UtcDateTime::parse("2024-06-05T15:00:00Z").expect("timestamp")
}

#[derive(Debug, Clone)]
pub enum Reply {
    Json(&'static str),
    Fail,
    Hang,
}

/// Model whose reply depends on the agent asking.
pub struct ScriptedModel {
    replies: HashMap<AgentId, Reply>,
    fallback: Reply,
    seen: Arc<std::sync::Mutex<Vec<AgentId>>>,
}

impl ScriptedModel {
    pub fn new(fallback: Reply) -> Self {
        Self {
            replies: HashMap::new(),
            fallback,
            seen: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn reply(mut self, agent: AgentId, reply: Reply) -> Self {
        self.replies.insert(agent, reply);
        self
    }

    /// Agents in the order they called the model.
    pub fn seen(&self) -> Arc<std::sync::Mutex<Vec<AgentId>>> {
        Arc::clone(&self.seen)
    }
}

impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate<'a>(&'a self, request: ModelRequest) -> ModelFuture<'a> {
        self.seen.lock().expect("lock").push(request.agent);
        let reply = self
            .replies
            .get(&request.agent)
            .unwrap_or(&self.fallback)
            .clone();
        Box::pin(async move {
            match reply {
                Reply::Json(text) => Ok(text.to_owned()),
                Reply::Fail => Err(ModelError::Transport(String::from("connection refused"))),
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}
