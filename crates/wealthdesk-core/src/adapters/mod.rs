//! Provider adapters.
//!
//! Each adapter runs live over an [`HttpClient`] or, when handed the offline
//! transport, serves deterministic synthetic data derived from the request.

mod alphavantage;
mod finnhub;
mod fred;
mod newsapi;
mod polygon;
mod yahoo;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use time::macros::format_description;
use time::PrimitiveDateTime;

pub use alphavantage::AlphaVantageAdapter;
pub use finnhub::FinnhubAdapter;
pub use fred::FredAdapter;
pub use newsapi::NewsApiAdapter;
pub use polygon::PolygonAdapter;
pub use yahoo::YahooAdapter;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::data_source::{HealthState, HealthStatus, SourceError};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, NoopHttpClient, StatusClass};
use crate::{
    Bar, BarSeries, CurrencyPair, FxRate, Interval, ProviderId, Symbol, UtcDateTime,
    ValidationError,
};

const UPSTREAM_TIMEOUT_MS: u64 = 8_000;

/// Transport, credentials and breaker for one provider.
#[derive(Clone)]
pub(crate) struct Upstream {
    provider: ProviderId,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl Upstream {
    pub(crate) fn new(provider: ProviderId, http_client: Arc<dyn HttpClient>, auth: HttpAuth) -> Self {
        Self {
            provider,
            http_client,
            auth,
            circuit_breaker: Arc::new(CircuitBreaker::for_provider(provider)),
        }
    }

    pub(crate) fn offline(provider: ProviderId) -> Self {
        Self::new(provider, Arc::new(NoopHttpClient), HttpAuth::None)
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.http_client.is_mock()
    }

    pub(crate) fn health(&self) -> HealthStatus {
        if !self.is_live() {
            return HealthStatus::healthy();
        }
        match self.circuit_breaker.state() {
            CircuitState::Closed => HealthStatus::healthy(),
            CircuitState::HalfOpen => HealthStatus::new(HealthState::Degraded, true),
            CircuitState::Open => HealthStatus::new(HealthState::Unhealthy, true),
        }
    }

    /// GETs `url` and decodes the JSON body.
    ///
    /// 429 maps to `RateLimited` and 404 to `NotFound`; neither counts against the breaker.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let provider = self.provider;
        if !self.circuit_breaker.allow_request() {
            return Err(SourceError::unavailable(format!(
                "{provider} circuit breaker is open; skipping upstream call"
            )));
        }

        let request = HttpRequest::get(url)
            .with_auth(&self.auth)
            .with_timeout_ms(UPSTREAM_TIMEOUT_MS);
        let response = self.http_client.execute(request).await.map_err(|error| {
            self.circuit_breaker.record_failure();
            SourceError::unavailable(format!("{provider} transport error: {error}"))
        })?;

        match response.class() {
            StatusClass::Success => {}
            StatusClass::RateLimited => {
                return Err(SourceError::rate_limited(format!(
                    "{provider} returned 429 Too Many Requests"
                )));
            }
            StatusClass::NotFound => {
                self.circuit_breaker.record_success();
                return Err(SourceError::not_found(format!("{provider} returned 404")));
            }
            StatusClass::Failure => {
                self.circuit_breaker.record_failure();
                return Err(SourceError::unavailable(format!(
                    "{provider} upstream returned status {}",
                    response.status
                )));
            }
        }

        self.circuit_breaker.record_success();
        serde_json::from_str(&response.body).map_err(|error| {
            SourceError::malformed(format!("failed to parse {provider} response: {error}"))
        })
    }
}

pub(crate) fn validation_to_error(error: ValidationError) -> SourceError {
    SourceError::malformed(error.to_string())
}

/// Stable per-symbol seed for offline data.
pub(crate) fn symbol_seed(symbol: &Symbol) -> u64 {
    symbol
        .as_str()
        .bytes()
        .fold(7_u64, |seed, byte| seed.wrapping_mul(31).wrapping_add(u64::from(byte)))
}

/// Offline price level for a symbol.
pub(crate) fn mock_price(symbol: &Symbol) -> f64 {
    40.0 + (symbol_seed(symbol) % 4_600) as f64 / 10.0
}

/// Parses `YYYY-MM-DD HH:MM:SS` as UTC.
pub(crate) fn parse_naive_utc(raw: &str) -> Result<UtcDateTime, SourceError> {
    let parsed = PrimitiveDateTime::parse(
        raw.trim(),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .map_err(|error| SourceError::malformed(format!("invalid timestamp '{raw}': {error}")))?;
    Ok(UtcDateTime::from_any_offset(parsed.assume_utc()))
}

/// Parses numeric strings such as `"189.84"` or `"-1.2%"`.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Deterministic series ending at the last completed interval boundary.
pub(crate) fn mock_bars(
    symbol: &Symbol,
    interval: Interval,
    limit: usize,
    source: ProviderId,
) -> Result<BarSeries, SourceError> {
    let seed = symbol_seed(symbol);
    let step = interval.step();
    let step_secs = step.whole_seconds().max(1);
    let now = UtcDateTime::now().unix_seconds();
    let end = UtcDateTime::from_unix_seconds(now - now.rem_euclid(step_secs)).map_err(validation_to_error)?;
    let base = mock_price(symbol);
    let phase = (seed % 17) as f64;

    let mut bars = Vec::with_capacity(limit);
    let mut previous_close = base;
    for index in 0..limit {
        let back = i32::try_from(limit - index - 1).unwrap_or(i32::MAX);
        let ts = end
            .checked_sub(step * back)
            .ok_or_else(|| SourceError::invalid_request("bars window out of range"))?;
        let position = index as f64;
        let close = base * (1.0 + 0.04 * (position * 0.3 + phase).sin() + 0.0005 * position);
        let open = previous_close;
        let high = open.max(close) * 1.006;
        let low = open.min(close) * 0.994;
        let volume = 900_000 + (seed % 50_000) + index as u64 * 1_500;
        bars.push(Bar::new(ts, open, high, low, close, Some(volume)).map_err(validation_to_error)?);
        previous_close = close;
    }

    Ok(BarSeries::new(symbol.clone(), interval, bars, source))
}

/// Units of each currency per US dollar, used offline.
fn units_per_usd(code: &str) -> Option<f64> {
    match code {
        "USD" => Some(1.0),
        "CAD" => Some(1.37),
        "EUR" => Some(0.92),
        "GBP" => Some(0.79),
        "JPY" => Some(156.8),
        "CHF" => Some(0.90),
        "AUD" => Some(1.51),
        _ => None,
    }
}

pub(crate) fn mock_fx_rate(pair: &CurrencyPair, source: ProviderId) -> Result<FxRate, SourceError> {
    let (Some(base), Some(quote)) = (units_per_usd(&pair.base), units_per_usd(&pair.quote)) else {
        return Err(SourceError::not_found(format!("no offline rate for {pair}")));
    };
    FxRate::new(pair.clone(), quote / base, UtcDateTime::now(), source).map_err(validation_to_error)
}
