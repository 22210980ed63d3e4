use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{mock_bars, mock_fx_rate, mock_price, validation_to_error, Upstream};
use crate::data_source::{
    BarsRequest, CapabilitySet, DataSource, Endpoint, FxRequest, HealthStatus, QuoteBatch,
    QuoteRequest, SourceError, SourceErrorKind, SourceFuture,
};
use crate::http_client::{HttpAuth, HttpClient};
use crate::{Bar, BarSeries, CurrencyPair, FxRate, Interval, PriceQuote, ProviderId, Symbol, UtcDateTime};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance chart API. No credentials; quotes, history and FX.
#[derive(Clone)]
pub struct YahooAdapter {
    upstream: Upstream,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self {
            upstream: Upstream::offline(ProviderId::Yahoo),
        }
    }
}

impl YahooAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            upstream: Upstream::new(ProviderId::Yahoo, http_client, HttpAuth::None),
        }
    }

    async fn fetch_chart(&self, ticker: &str, interval: Interval, range: &str) -> Result<ChartResult, SourceError> {
        let url = format!(
            "{CHART_URL}/{}?interval={}&range={range}",
            urlencoding::encode(ticker),
            yahoo_interval(interval)
        );
        let response: ChartResponse = self.upstream.get_json(&url).await?;
        if let Some(error) = response.chart.error {
            return Err(SourceError::not_found(format!("yahoo chart error for {ticker}: {error}")));
        }
        response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| SourceError::not_found(format!("yahoo returned no chart for {ticker}")))
    }

    async fn fetch_real_quotes(&self, req: &QuoteRequest) -> Result<QuoteBatch, SourceError> {
        let mut quotes = Vec::with_capacity(req.symbols.len());
        for symbol in &req.symbols {
            let chart = match self.fetch_chart(symbol.as_str(), Interval::OneDay, "5d").await {
                Ok(chart) => chart,
                Err(error) if error.kind() == SourceErrorKind::NotFound => {
                    tracing::debug!(provider = "yahoo", symbol = %symbol, "symbol not found");
                    continue;
                }
                Err(error) => return Err(error),
            };
            quotes.push(normalize_quote(symbol, &chart.meta)?);
        }

        if quotes.is_empty() {
            return Err(SourceError::not_found("yahoo returned no quotes for the request"));
        }
        Ok(QuoteBatch { quotes })
    }

    async fn fetch_real_bars(&self, req: &BarsRequest) -> Result<BarSeries, SourceError> {
        let chart = self
            .fetch_chart(req.symbol.as_str(), req.interval, history_range(req.interval, req.limit))
            .await?;
        let bars = normalize_bars(&chart)?;
        let skip = bars.len().saturating_sub(req.limit);
        Ok(BarSeries::new(
            req.symbol.clone(),
            req.interval,
            bars.into_iter().skip(skip).collect(),
            ProviderId::Yahoo,
        ))
    }

    async fn fetch_real_fx(&self, pair: &CurrencyPair) -> Result<FxRate, SourceError> {
        let ticker = format!("{}{}=X", pair.base, pair.quote);
        let chart = self.fetch_chart(&ticker, Interval::OneDay, "5d").await?;
        let rate = chart
            .meta
            .regular_market_price
            .ok_or_else(|| SourceError::malformed(format!("yahoo chart for {ticker} has no price")))?;
        let as_of = market_time(&chart.meta)?;
        FxRate::new(pair.clone(), rate, as_of, ProviderId::Yahoo).map_err(validation_to_error)
    }

    fn mock_quotes(req: &QuoteRequest) -> Result<QuoteBatch, SourceError> {
        let as_of = UtcDateTime::now();
        let quotes = req
            .symbols
            .iter()
            .map(|symbol| {
                let change = ((super::symbol_seed(symbol) % 400) as f64 - 200.0) / 100.0;
                PriceQuote::new(symbol.clone(), mock_price(symbol), "USD", as_of, ProviderId::Yahoo)
                    .map(|quote| {
                        quote
                            .with_change_percent(Some(change))
                            .with_volume(Some(1_200_000 + super::symbol_seed(symbol) % 90_000))
                    })
                    .map_err(validation_to_error)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QuoteBatch { quotes })
    }
}

impl DataSource for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none()
            .with(Endpoint::Quote)
            .with(Endpoint::Bars)
            .with(Endpoint::Fx)
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
                mock_bars(&req.symbol, req.interval, req.limit, ProviderId::Yahoo)
            }
        })
    }

    fn fx_rate<'a>(&'a self, req: FxRequest) -> SourceFuture<'a, FxRate> {
        Box::pin(async move {
            if self.upstream.is_live() {
                self.fetch_real_fx(&req.pair).await
            } else {
                mock_fx_rate(&req.pair, ProviderId::Yahoo)
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

fn yahoo_interval(interval: Interval) -> &'static str {
    match interval {
        Interval::OneMinute => "1m",
        Interval::FiveMinutes => "5m",
        Interval::FifteenMinutes => "15m",
        Interval::OneHour => "60m",
        Interval::OneDay => "1d",
    }
}

/// Smallest chart range covering `limit` bars of `interval`.
fn history_range(interval: Interval, limit: usize) -> &'static str {
    if interval.is_intraday() {
        return match interval {
            Interval::OneMinute if limit <= 390 => "1d",
            Interval::OneMinute => "5d",
            Interval::OneHour => "3mo",
            _ => "1mo",
        };
    }
    match limit {
        0..=5 => "5d",
        6..=21 => "1mo",
        22..=63 => "3mo",
        64..=126 => "6mo",
        127..=252 => "1y",
        253..=504 => "2y",
        _ => "5y",
    }
}

fn market_time(meta: &ChartMeta) -> Result<UtcDateTime, SourceError> {
    match meta.regular_market_time {
        Some(seconds) => UtcDateTime::from_unix_seconds(seconds).map_err(validation_to_error),
        None => Ok(UtcDateTime::now()),
    }
}

fn normalize_quote(symbol: &Symbol, meta: &ChartMeta) -> Result<PriceQuote, SourceError> {
    let price = meta
        .regular_market_price
        .ok_or_else(|| SourceError::malformed(format!("yahoo chart for {symbol} has no price")))?;
    let change_percent = meta
        .chart_previous_close
        .filter(|previous| *previous > 0.0)
        .map(|previous| (price - previous) / previous * 100.0);

    PriceQuote::new(
        symbol.clone(),
        price,
        meta.currency.as_deref().unwrap_or("USD"),
        market_time(meta)?,
        ProviderId::Yahoo,
    )
    .map(|quote| {
        quote
            .with_change_percent(change_percent)
            .with_volume(meta.regular_market_volume)
    })
    .map_err(validation_to_error)
}

/// Rows with missing values are dropped; Yahoo pads halted sessions with nulls.
fn normalize_bars(chart: &ChartResult) -> Result<Vec<Bar>, SourceError> {
    let Some(timestamps) = &chart.timestamp else {
        return Ok(Vec::new());
    };
    let Some(quote) = chart.indicators.quote.first() else {
        return Ok(Vec::new());
    };

    let mut bars = Vec::with_capacity(timestamps.len());
    for (index, seconds) in timestamps.iter().enumerate() {
        let value = |column: &[Option<f64>]| column.get(index).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close)) = (
            value(&quote.open),
            value(&quote.high),
            value(&quote.low),
            value(&quote.close),
        ) else {
            continue;
        };
        let ts = UtcDateTime::from_unix_seconds(*seconds).map_err(validation_to_error)?;
        let volume = quote.volume.get(index).copied().flatten();
        if let Ok(bar) = Bar::new(ts, open, high, low, close, volume) {
            bars.push(bar);
        }
    }
    Ok(bars)
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    currency: Option<String>,
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(rename = "chartPreviousClose")]
    chart_previous_close: Option<f64>,
    #[serde(rename = "regularMarketTime")]
    regular_market_time: Option<i64>,
    #[serde(rename = "regularMarketVolume")]
    regular_market_volume: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}
