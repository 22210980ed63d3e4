use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{mock_bars, mock_price, symbol_seed, validation_to_error, Upstream};
use crate::data_source::{
    BarsRequest, CapabilitySet, DataSource, Endpoint, HealthStatus, QuoteBatch, QuoteRequest,
    SourceError, SourceFuture,
};
use crate::http_client::{HttpAuth, HttpClient};
use crate::{Bar, BarSeries, Interval, PriceQuote, ProviderId, Symbol, UtcDateTime};

const BASE_URL: &str = "https://api.polygon.io";

/// Polygon.io aggregates API: previous-session quotes and historical bars.
#[derive(Clone)]
pub struct PolygonAdapter {
    upstream: Upstream,
}

impl Default for PolygonAdapter {
    fn default() -> Self {
        Self {
            upstream: Upstream::offline(ProviderId::Polygon),
        }
    }
}

impl PolygonAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            upstream: Upstream::new(
                ProviderId::Polygon,
                http_client,
                HttpAuth::BearerToken(api_key.into()),
            ),
        }
    }

    async fn fetch_real_quotes(&self, req: &QuoteRequest) -> Result<QuoteBatch, SourceError> {
        let mut quotes = Vec::with_capacity(req.symbols.len());
        for symbol in &req.symbols {
            let url = format!(
                "{BASE_URL}/v2/aggs/ticker/{}/prev?adjusted=true",
                urlencoding::encode(symbol.as_str())
            );
            let response: AggsResponse = self.upstream.get_json(&url).await?;
            let Some(latest) = response.results.into_iter().last() else {
                return Err(SourceError::not_found(format!("polygon has no aggregates for {symbol}")));
            };
            quotes.push(normalize_quote(symbol, &latest)?);
        }
        Ok(QuoteBatch { quotes })
    }

    async fn fetch_real_bars(&self, req: &BarsRequest) -> Result<BarSeries, SourceError> {
        let (multiplier, timespan) = polygon_timespan(req.interval);
        let to = UtcDateTime::now();
        let from = lookback_start(to, req.interval, req.limit)?;
        let url = format!(
            "{BASE_URL}/v2/aggs/ticker/{}/range/{multiplier}/{timespan}/{}/{}?adjusted=true&sort=asc&limit=50000",
            urlencoding::encode(req.symbol.as_str()),
            from.format_date(),
            to.format_date()
        );
        let response: AggsResponse = self.upstream.get_json(&url).await?;

        let bars = response
            .results
            .iter()
            .map(normalize_bar)
            .collect::<Result<Vec<_>, _>>()?;
        let skip = bars.len().saturating_sub(req.limit);
        Ok(BarSeries::new(
            req.symbol.clone(),
            req.interval,
            bars.into_iter().skip(skip).collect(),
            ProviderId::Polygon,
        ))
    }

    fn mock_quotes(req: &QuoteRequest) -> Result<QuoteBatch, SourceError> {
        let as_of = UtcDateTime::now();
        let quotes = req
            .symbols
            .iter()
            .map(|symbol| {
                let change = ((symbol_seed(symbol) % 300) as f64 - 150.0) / 100.0;
                PriceQuote::new(
                    symbol.clone(),
                    mock_price(symbol) * 1.0005,
                    "USD",
                    as_of,
                    ProviderId::Polygon,
                )
                .map(|quote| quote.with_change_percent(Some(change)))
                .map_err(validation_to_error)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QuoteBatch { quotes })
    }
}

impl DataSource for PolygonAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Polygon
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none().with(Endpoint::Quote).with(Endpoint::Bars)
    }

    fn freshness(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, QuoteBatch> {
        Box::pin(async move {
            if self.upstream.is_live() {
                self.fetch_real_quotes(&req).await
            } else {
                Self::mock_quotes(&req)
            }
        })
    }

    fn bars<'a>(&'a self, req: BarsRequest) -> SourceFuture<'a, BarSeries> {
        Box::pin(async move {
            if self.upstream.is_live() {
                self.fetch_real_bars(&req).await
            } else {
                mock_bars(&req.symbol, req.interval, req.limit, ProviderId::Polygon)
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

fn polygon_timespan(interval: Interval) -> (u32, &'static str) {
    match interval {
        Interval::OneMinute => (1, "minute"),
        Interval::FiveMinutes => (5, "minute"),
        Interval::FifteenMinutes => (15, "minute"),
        Interval::OneHour => (1, "hour"),
        Interval::OneDay => (1, "day"),
    }
}

/// Calendar start wide enough to cover `limit` trading intervals.
fn lookback_start(to: UtcDateTime, interval: Interval, limit: usize) -> Result<UtcDateTime, SourceError> {
    let periods = i32::try_from(limit.saturating_mul(3) / 2 + 5).unwrap_or(i32::MAX);
    let span = if interval.is_intraday() {
        // Intraday aggregates only exist during the session; widen to whole days.
        time::Duration::days(i64::from(periods) / interval.bars_per_session() + 5)
    } else {
        interval.step() * periods
    };
    to.checked_sub(span)
        .ok_or_else(|| SourceError::invalid_request("polygon lookback window out of range"))
}

fn timestamp_from_millis(millis: i64) -> Result<UtcDateTime, SourceError> {
    UtcDateTime::from_unix_seconds(millis.div_euclid(1_000)).map_err(validation_to_error)
}

fn normalize_quote(symbol: &Symbol, agg: &Aggregate) -> Result<PriceQuote, SourceError> {
    let change_percent = (agg.open > 0.0).then(|| (agg.close - agg.open) / agg.open * 100.0);
    PriceQuote::new(
        symbol.clone(),
        agg.close,
        "USD",
        timestamp_from_millis(agg.timestamp)?,
        ProviderId::Polygon,
    )
    .map(|quote| {
        quote
            .with_change_percent(change_percent)
            .with_volume(agg.volume.map(|volume| volume.max(0.0) as u64))
    })
    .map_err(validation_to_error)
}

fn normalize_bar(agg: &Aggregate) -> Result<Bar, SourceError> {
    Bar::new(
        timestamp_from_millis(agg.timestamp)?,
        agg.open,
        agg.high,
        agg.low,
        agg.close,
        agg.volume.map(|volume| volume.max(0.0) as u64),
    )
    .map_err(validation_to_error)
}

#[derive(Debug, Deserialize)]
struct AggsResponse {
    #[serde(default)]
    results: Vec<Aggregate>,
}

#[derive(Debug, Deserialize)]
struct Aggregate {
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: Option<f64>,
    #[serde(rename = "t")]
    timestamp: i64,
}
