//! # Wealthdesk Core
//!
//! Market data aggregation for the wealthdesk advisory pipeline.
//!
//! ## Overview
//!
//! - **Domain models** for quotes, bars, news, economic series and client inputs
//! - **Provider adapters** behind one capability-uniform [`DataSource`] trait
//! - **Rate limiting and backoff** per provider
//! - **Cache** keyed by provider, resource and freshness bucket, aware of market hours
//! - **Fallback executor** walking declarative provider priority lists
//! - **Aggregator** producing one [`MarketDataSnapshot`] per run
//! - **Technical indicators and keyword sentiment**, computed locally
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo, Polygon, Alpha Vantage, Finnhub, NewsAPI, FRED |
//! | [`aggregator`] | Concurrent fan-out and snapshot assembly |
//! | [`cache`] | Process-local TTL cache |
//! | [`calendar`] | Trading sessions and freshness boundary |
//! | [`circuit_breaker`] | Circuit breaker for live upstream calls |
//! | [`data_source`] | Data source trait, requests and error taxonomy |
//! | [`domain`] | Domain models |
//! | [`error`] | Validation and core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`indicators`] | RSI, MACD, Bollinger and friends |
//! | [`provider_policy`] | Per-provider quota, retry and timeout |
//! | [`retry`] | Backoff schedules |
//! | [`routing`] | Provider registry and fallback executor |
//! | [`sentiment`] | Keyword sentiment scoring |
//! | [`snapshot`] | The aggregated market view |
//! | [`source`] | Provider identifiers |
//! | [`throttling`] | Rate limiting |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wealthdesk_core::aggregator::{AggregatorConfig, AggregatorContext, MarketDataAggregator};
//! use wealthdesk_core::routing::ProviderRegistry;
//!
//! let context = AggregatorContext::new(Arc::new(ProviderRegistry::offline()));
//! let aggregator = MarketDataAggregator::new(context, AggregatorConfig::default());
//! let snapshot = aggregator.aggregate(&symbols, &profile).await?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Aggregator    │──────────────┐
//! └────────┬────────┘              ▼
//!          │              ┌──────────────────┐
//!          │              │ Cache / Calendar │
//!          ▼              └──────────────────┘
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Fallback        │────▶│ Rate Limiter     │
//! │ Executor        │     └──────────────────┘
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Data Source     │────▶│ HTTP Client      │
//! │ (Adapter Trait) │     │ + Circuit Breaker│
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Security
//!
//! - API keys are read from environment variables only and never logged
//! - Input validation on all domain types

pub mod adapters;
pub mod aggregator;
pub mod cache;
pub mod calendar;
pub mod circuit_breaker;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod indicators;
pub mod provider_policy;
pub mod retry;
pub mod routing;
pub mod sentiment;
pub mod snapshot;
pub mod source;
pub mod throttling;

pub use adapters::{
    AlphaVantageAdapter, FinnhubAdapter, FredAdapter, NewsApiAdapter, PolygonAdapter, YahooAdapter,
};

pub use aggregator::{
    AggregationError, AggregatorConfig, AggregatorContext, MarketDataAggregator, ProviderChains,
};

pub use cache::{CacheKey, CacheStore, CacheTtlByKind, CachedValue};

pub use calendar::{MarketCalendar, MarketSession};

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use data_source::{
    BarsRequest, CapabilitySet, DataSource, Endpoint, FxRequest, HealthState, HealthStatus,
    IndicatorRequest, NewsBatch, NewsRequest, NewsScope, QuoteBatch, QuoteRequest, SourceError,
    SourceErrorKind, SourceFuture,
};

pub use domain::{
    series_title, validate_currency_code, AccountType, AssetClass, Bar, BarSeries, ClientProfile,
    CurrencyPair, EconomicIndicator, FxRate, Holding, Interval, NewsItem, Portfolio, PriceQuote,
    RiskTolerance, Symbol, UtcDateTime,
};

pub use error::ValidationError;

pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpFuture, HttpMethod, HttpRequest, HttpResponse,
    NoopHttpClient, ReqwestHttpClient, StatusClass,
};

pub use indicators::TechnicalIndicators;

pub use provider_policy::{ProviderPolicy, RequestQuota};

pub use retry::{Backoff, RetryPolicy};

pub use routing::{
    AttemptError, FallbackExecutor, ProviderRegistry, ProviderRegistryBuilder, RouteFailure,
    RouteResult, RouteSuccess, SourceSnapshot,
};

pub use sentiment::{SentimentLabel, SentimentSummary};

pub use snapshot::{
    MarketDataSnapshot, ProviderStatus, QuoteStatus, SnapshotVersion, SymbolData,
};

pub use source::ProviderId;

pub use throttling::RateLimiter;
