//! Provider client contract and request/response types.
//!
//! Every external data source is wrapped behind [`DataSource`]. Adapters translate
//! the upstream response, or its failure, into the shared schema. Business
//! conditions such as a closed market or a quiet news day are empty successes,
//! never errors.
//!
//! # Endpoints
//!
//! | Endpoint | Request | Response |
//! |----------|---------|----------|
//! | Quote | [`QuoteRequest`] | [`QuoteBatch`] |
//! | Bars | [`BarsRequest`] | [`BarSeries`] |
//! | News | [`NewsRequest`] | [`NewsBatch`] |
//! | Indicator | [`IndicatorRequest`] | [`EconomicIndicator`] |
//! | Fx | [`FxRequest`] | [`FxRate`] |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    BarSeries, CurrencyPair, EconomicIndicator, FxRate, Interval, NewsItem, PriceQuote,
    ProviderId, Symbol, UtcDateTime,
};

/// Data endpoint, also used as the cache resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Quote,
    Bars,
    News,
    Indicator,
    Fx,
}

impl Endpoint {
    pub const ALL: [Self; 5] = [Self::Quote, Self::Bars, Self::News, Self::Indicator, Self::Fx];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Bars => "bars",
            Self::News => "news",
            Self::Indicator => "indicator",
            Self::Fx => "fx",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported endpoint matrix for a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub quote: bool,
    pub bars: bool,
    pub news: bool,
    pub indicator: bool,
    pub fx: bool,
}

impl CapabilitySet {
    pub const fn none() -> Self {
        Self {
            quote: false,
            bars: false,
            news: false,
            indicator: false,
            fx: false,
        }
    }

    pub fn with(self, endpoint: Endpoint) -> Self {
        let mut next = self;
        match endpoint {
            Endpoint::Quote => next.quote = true,
            Endpoint::Bars => next.bars = true,
            Endpoint::News => next.news = true,
            Endpoint::Indicator => next.indicator = true,
            Endpoint::Fx => next.fx = true,
        }
        next
    }

    pub const fn supports(self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::Quote => self.quote,
            Endpoint::Bars => self.bars,
            Endpoint::News => self.news,
            Endpoint::Indicator => self.indicator,
            Endpoint::Fx => self.fx,
        }
    }

    pub fn supported_endpoints(self) -> Vec<&'static str> {
        Endpoint::ALL
            .into_iter()
            .filter(|endpoint| self.supports(*endpoint))
            .map(Endpoint::as_str)
            .collect()
    }
}

/// Health state reported by `sources` and used to skip unhealthy providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Runtime source health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub rate_available: bool,
}

impl HealthStatus {
    pub const fn new(state: HealthState, rate_available: bool) -> Self {
        Self {
            state,
            rate_available,
        }
    }

    pub const fn healthy() -> Self {
        Self::new(HealthState::Healthy, true)
    }
}

/// Provider-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    RateLimited,
    Unavailable,
    NotFound,
    MalformedResponse,
    UnsupportedEndpoint,
    InvalidRequest,
}

/// Structured provider error consumed by the fallback executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::MalformedResponse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unsupported_endpoint(endpoint: Endpoint) -> Self {
        Self {
            kind: SourceErrorKind::UnsupportedEndpoint,
            message: format!("endpoint '{endpoint}' is not supported by this source"),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::MalformedResponse => "source.malformed_response",
            SourceErrorKind::UnsupportedEndpoint => "source.unsupported_endpoint",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub symbols: Vec<Symbol>,
}

impl QuoteRequest {
    pub fn new(symbols: Vec<Symbol>) -> Result<Self, SourceError> {
        if symbols.is_empty() {
            return Err(SourceError::invalid_request(
                "quote request must include at least one symbol",
            ));
        }
        Ok(Self { symbols })
    }

    pub fn single(symbol: Symbol) -> Self {
        Self {
            symbols: vec![symbol],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarsRequest {
    pub symbol: Symbol,
    pub interval: Interval,
    pub limit: usize,
}

impl BarsRequest {
    pub fn new(symbol: Symbol, interval: Interval, limit: usize) -> Result<Self, SourceError> {
        if limit == 0 {
            return Err(SourceError::invalid_request(
                "bars request limit must be greater than zero",
            ));
        }
        Ok(Self {
            symbol,
            interval,
            limit,
        })
    }
}

/// What a news request is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NewsScope {
    /// Broad market or macro headlines for a topic such as `business`.
    Market { topic: String },
    Company { symbol: Symbol },
}

impl NewsScope {
    /// Cache resource id for this scope.
    pub fn resource_id(&self) -> String {
        match self {
            Self::Market { topic } => format!("market:{}", topic.to_ascii_lowercase()),
            Self::Company { symbol } => format!("company:{symbol}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsRequest {
    pub scope: NewsScope,
    pub from: UtcDateTime,
    pub to: UtcDateTime,
    pub limit: usize,
}

impl NewsRequest {
    pub fn new(
        scope: NewsScope,
        from: UtcDateTime,
        to: UtcDateTime,
        limit: usize,
    ) -> Result<Self, SourceError> {
        if from > to {
            return Err(SourceError::invalid_request(
                "news window start must not be after its end",
            ));
        }
        if limit == 0 {
            return Err(SourceError::invalid_request(
                "news request limit must be greater than zero",
            ));
        }
        Ok(Self {
            scope,
            from,
            to,
            limit,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorRequest {
    pub series_id: String,
}

impl IndicatorRequest {
    pub fn new(series_id: impl AsRef<str>) -> Result<Self, SourceError> {
        let series_id = series_id.as_ref().trim().to_ascii_uppercase();
        if series_id.is_empty() {
            return Err(SourceError::invalid_request("series id must not be empty"));
        }
        Ok(Self { series_id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FxRequest {
    pub pair: CurrencyPair,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteBatch {
    pub quotes: Vec<PriceQuote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsBatch {
    pub items: Vec<NewsItem>,
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Provider client contract.
///
/// Endpoints a provider does not serve keep the default implementation, which
/// reports [`SourceErrorKind::UnsupportedEndpoint`]. Implementations must be
/// `Send + Sync`; the aggregator shares them across concurrent fetch tasks.
pub trait DataSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> CapabilitySet;

    /// How long a value from this provider stays fresh.
    fn freshness(&self) -> Duration;

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, QuoteBatch> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported_endpoint(Endpoint::Quote)) })
    }

    fn bars<'a>(&'a self, req: BarsRequest) -> SourceFuture<'a, BarSeries> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported_endpoint(Endpoint::Bars)) })
    }

    fn news<'a>(&'a self, req: NewsRequest) -> SourceFuture<'a, NewsBatch> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported_endpoint(Endpoint::News)) })
    }

    /// Latest observation of an economic series.
    fn indicator<'a>(&'a self, req: IndicatorRequest) -> SourceFuture<'a, EconomicIndicator> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported_endpoint(Endpoint::Indicator)) })
    }

    fn fx_rate<'a>(&'a self, req: FxRequest) -> SourceFuture<'a, FxRate> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported_endpoint(Endpoint::Fx)) })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async { HealthStatus::healthy() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_builder_marks_endpoints() {
        let caps = CapabilitySet::none()
            .with(Endpoint::Quote)
            .with(Endpoint::Fx);

        assert!(caps.supports(Endpoint::Quote));
        assert!(!caps.supports(Endpoint::News));
        assert_eq!(caps.supported_endpoints(), vec!["quote", "fx"]);
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(SourceError::rate_limited("x").code(), "source.rate_limited");
        assert_eq!(SourceError::malformed("x").code(), "source.malformed_response");
        assert!(SourceError::unavailable("x").retryable());
        assert!(!SourceError::not_found("x").retryable());
    }

    #[test]
    fn news_request_rejects_inverted_window() {
        let from = UtcDateTime::parse("2024-06-08T00:00:00Z").expect("ts");
        let to = UtcDateTime::parse("2024-06-01T00:00:00Z").expect("ts");
        let scope = NewsScope::Market {
            topic: String::from("business"),
        };

        let error = NewsRequest::new(scope, from, to, 10).expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
    }

    #[test]
    fn indicator_request_normalizes_series() {
        let request = IndicatorRequest::new(" unrate ").expect("valid");
        assert_eq!(request.series_id, "UNRATE");
        assert!(IndicatorRequest::new("  ").is_err());
    }
}
