use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{mock_fx_rate, mock_price, parse_naive_utc, parse_number, validation_to_error, Upstream};
use crate::data_source::{
    CapabilitySet, DataSource, Endpoint, FxRequest, HealthStatus, QuoteBatch, QuoteRequest,
    SourceError, SourceFuture,
};
use crate::http_client::{HttpAuth, HttpClient};
use crate::{CurrencyPair, FxRate, PriceQuote, ProviderId, Symbol, UtcDateTime};

const QUERY_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage: global quotes and realtime FX. The free tier allows five calls a minute.
#[derive(Clone)]
pub struct AlphaVantageAdapter {
    upstream: Upstream,
}

impl Default for AlphaVantageAdapter {
    fn default() -> Self {
        Self {
            upstream: Upstream::offline(ProviderId::Alphavantage),
        }
    }
}

impl AlphaVantageAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            upstream: Upstream::new(
                ProviderId::Alphavantage,
                http_client,
                HttpAuth::QueryParam {
                    name: String::from("apikey"),
                    value: api_key.into(),
                },
            ),
        }
    }

    async fn fetch_real_quotes(&self, req: &QuoteRequest) -> Result<QuoteBatch, SourceError> {
        let mut quotes = Vec::with_capacity(req.symbols.len());
        for symbol in &req.symbols {
            let url = format!(
                "{QUERY_URL}?function=GLOBAL_QUOTE&symbol={}",
                urlencoding::encode(symbol.as_str())
            );
            let response: QuoteResponse = self.upstream.get_json(&url).await?;
            check_notices(&response.notices)?;
            let quote = response
                .global_quote
                .filter(|fields| !fields.is_empty())
                .ok_or_else(|| SourceError::not_found(format!("alphavantage has no quote for {symbol}")))?;
            quotes.push(normalize_quote(symbol, &quote)?);
        }
        Ok(QuoteBatch { quotes })
    }

    async fn fetch_real_fx(&self, pair: &CurrencyPair) -> Result<FxRate, SourceError> {
        let url = format!(
            "{QUERY_URL}?function=CURRENCY_EXCHANGE_RATE&from_currency={}&to_currency={}",
            pair.base, pair.quote
        );
        let response: FxResponse = self.upstream.get_json(&url).await?;
        check_notices(&response.notices)?;
        let fields = response
            .rate
            .ok_or_else(|| SourceError::not_found(format!("alphavantage has no rate for {pair}")))?;

        let rate = fields
            .get("5. Exchange Rate")
            .and_then(|raw| parse_number(raw))
            .ok_or_else(|| SourceError::malformed("alphavantage exchange rate is missing"))?;
        let as_of = match fields.get("6. Last Refreshed") {
            Some(raw) => parse_naive_utc(raw)?,
            None => UtcDateTime::now(),
        };
        FxRate::new(pair.clone(), rate, as_of, ProviderId::Alphavantage).map_err(validation_to_error)
    }

    fn mock_quotes(req: &QuoteRequest) -> Result<QuoteBatch, SourceError> {
        let as_of = UtcDateTime::now();
        let quotes = req
            .symbols
            .iter()
            .map(|symbol| {
                PriceQuote::new(
                    symbol.clone(),
                    mock_price(symbol) * 0.9995,
                    "USD",
                    as_of,
                    ProviderId::Alphavantage,
                )
                .map_err(validation_to_error)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QuoteBatch { quotes })
    }
}

impl DataSource for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none().with(Endpoint::Quote).with(Endpoint::Fx)
    }

    fn freshness(&self) -> Duration {
        Duration::from_secs(300)
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

    fn fx_rate<'a>(&'a self, req: FxRequest) -> SourceFuture<'a, FxRate> {
        Box::pin(async move {
            if self.upstream.is_live() {
                self.fetch_real_fx(&req.pair).await
            } else {
                mock_fx_rate(&req.pair, ProviderId::Alphavantage)
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

/// Alpha Vantage answers throttled calls with HTTP 200 and a notice body.
fn check_notices(notices: &Notices) -> Result<(), SourceError> {
    if let Some(note) = notices.note.as_ref().or(notices.information.as_ref()) {
        return Err(SourceError::rate_limited(format!("alphavantage: {note}")));
    }
    if let Some(message) = &notices.error_message {
        return Err(SourceError::not_found(format!("alphavantage: {message}")));
    }
    Ok(())
}

fn normalize_quote(symbol: &Symbol, fields: &HashMap<String, String>) -> Result<PriceQuote, SourceError> {
    let price = fields
        .get("05. price")
        .and_then(|raw| parse_number(raw))
        .ok_or_else(|| SourceError::malformed(format!("alphavantage quote for {symbol} has no price")))?;
    let as_of = match fields.get("07. latest trading day") {
        Some(raw) => UtcDateTime::parse_date(raw).map_err(validation_to_error)?,
        None => UtcDateTime::now(),
    };

    PriceQuote::new(symbol.clone(), price, "USD", as_of, ProviderId::Alphavantage)
        .map(|quote| {
            quote
                .with_change_percent(fields.get("10. change percent").and_then(|raw| parse_number(raw)))
                .with_volume(fields.get("06. volume").and_then(|raw| raw.trim().parse().ok()))
        })
        .map_err(validation_to_error)
}

#[derive(Debug, Default, Deserialize)]
struct Notices {
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<HashMap<String, String>>,
    #[serde(flatten)]
    notices: Notices,
}

#[derive(Debug, Deserialize)]
struct FxResponse {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    rate: Option<HashMap<String, String>>,
    #[serde(flatten)]
    notices: Notices,
}
