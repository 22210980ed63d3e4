use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Interval, ProviderId, Symbol, UtcDateTime, ValidationError};

/// Latest price for one symbol as served by a provider or the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: Symbol,
    pub price: f64,
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
    pub currency: String,
    pub as_of: UtcDateTime,
    pub source: ProviderId,
    /// Served from an entry older than the freshness window, or outside trading hours.
    pub stale: bool,
}

impl PriceQuote {
    pub fn new(
        symbol: Symbol,
        price: f64,
        currency: impl AsRef<str>,
        as_of: UtcDateTime,
        source: ProviderId,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("price", price)?;

        Ok(Self {
            symbol,
            price,
            change_percent: None,
            volume: None,
            currency: validate_currency_code(currency.as_ref())?,
            as_of,
            source,
            stale: false,
        })
    }

    pub fn with_change_percent(mut self, change_percent: Option<f64>) -> Self {
        self.change_percent = change_percent.filter(|value| value.is_finite());
        self
    }

    pub fn with_volume(mut self, volume: Option<u64>) -> Self {
        self.volume = volume;
        self
    }

    /// Returns a copy marked stale with `as_of` clamped to `last_trade`.
    pub fn into_stale(mut self, last_trade: UtcDateTime) -> Self {
        self.stale = true;
        if self.as_of > last_trade {
            self.as_of = last_trade;
        }
        self
    }
}

/// OHLCV bar record for a given interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
}

impl Bar {
    pub fn new(
        ts: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<u64>,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Historical price series, oldest bar first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    pub symbol: Symbol,
    pub interval: Interval,
    pub bars: Vec<Bar>,
    pub source: ProviderId,
}

impl BarSeries {
    pub fn new(symbol: Symbol, interval: Interval, bars: Vec<Bar>, source: ProviderId) -> Self {
        let mut bars = bars;
        bars.sort_by(|left, right| left.ts.cmp(&right.ts));
        Self {
            symbol,
            interval,
            bars,
            source,
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|bar| bar.close)
    }
}

/// A news article, possibly tied to specific symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub summary: Option<String>,
    pub source_name: String,
    pub url: Option<String>,
    pub published_at: UtcDateTime,
    /// Empty for macro-level items.
    pub symbols: Vec<Symbol>,
    /// `None` until scored.
    pub sentiment: Option<f64>,
    pub provider: ProviderId,
}

impl NewsItem {
    pub fn new(
        headline: impl Into<String>,
        source_name: impl Into<String>,
        published_at: UtcDateTime,
        provider: ProviderId,
    ) -> Self {
        Self {
            headline: headline.into(),
            summary: None,
            source_name: source_name.into(),
            url: None,
            published_at,
            symbols: Vec::new(),
            sentiment: None,
            provider,
        }
    }

    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary.filter(|text| !text.trim().is_empty());
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url.filter(|text| !text.trim().is_empty());
        self
    }

    pub fn with_symbols(mut self, symbols: Vec<Symbol>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn with_sentiment(mut self, sentiment: f64) -> Result<Self, ValidationError> {
        validate_range("sentiment", sentiment, -1.0, 1.0)?;
        self.sentiment = Some(sentiment);
        Ok(self)
    }

    pub fn is_macro(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Key used to de-duplicate the same story served by several providers.
    pub fn dedupe_key(&self) -> (String, String) {
        (
            self.headline.trim().to_ascii_lowercase(),
            self.url.clone().unwrap_or_default(),
        )
    }
}

/// One observation of a macroeconomic series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicIndicator {
    pub series_id: String,
    pub title: String,
    pub value: f64,
    pub observation_date: UtcDateTime,
    pub units: Option<String>,
    pub source: ProviderId,
}

impl EconomicIndicator {
    pub fn new(
        series_id: impl Into<String>,
        value: f64,
        observation_date: UtcDateTime,
        source: ProviderId,
    ) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "value" });
        }
        let series_id = series_id.into().trim().to_ascii_uppercase();
        Ok(Self {
            title: series_title(&series_id).to_owned(),
            series_id,
            value,
            observation_date,
            units: None,
            source,
        })
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }
}

/// Human-readable titles for the series the aggregator requests by default.
pub fn series_title(series_id: &str) -> &'static str {
    match series_id {
        "CPIAUCSL" => "Consumer Price Index",
        "CPILFESL" => "Core CPI",
        "UNRATE" => "Unemployment Rate",
        "GDP" => "Gross Domestic Product",
        "FEDFUNDS" => "Federal Funds Rate",
        "GS10" => "10-Year Treasury Rate",
        "PCEPI" => "PCE Price Index",
        "PCEPILFE" => "Core PCE Price Index",
        _ => "Economic Series",
    }
}

/// Currency pair such as `USD/CAD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: &str, quote: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            base: validate_currency_code(base)?,
            quote: validate_currency_code(quote)?,
        })
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (base, quote) =
            value
                .split_once('/')
                .ok_or_else(|| ValidationError::InvalidCurrencyPair {
                    value: value.to_owned(),
                })?;
        Self::new(base, quote).map_err(|_| ValidationError::InvalidCurrencyPair {
            value: value.to_owned(),
        })
    }
}

impl TryFrom<String> for CurrencyPair {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyPair> for String {
    fn from(value: CurrencyPair) -> Self {
        value.to_string()
    }
}

/// Exchange rate: one unit of `pair.base` costs `rate` units of `pair.quote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    pub pair: CurrencyPair,
    pub rate: f64,
    pub as_of: UtcDateTime,
    pub source: ProviderId,
}

impl FxRate {
    pub fn new(
        pair: CurrencyPair,
        rate: f64,
        as_of: UtcDateTime,
        source: ProviderId,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("rate", rate)?;
        Ok(Self {
            pair,
            rate,
            as_of,
            source,
        })
    }
}

/// Validate and normalize currency to uppercase 3-letter code.
pub fn validate_currency_code(input: &str) -> Result<String, ValidationError> {
    let normalized = input.trim().to_ascii_uppercase();
    let is_valid = normalized.len() == 3 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());

    if !is_valid {
        return Err(ValidationError::InvalidCurrency {
            value: input.to_owned(),
        });
    }

    Ok(normalized)
}

pub(crate) fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

pub(crate) fn validate_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange { field, min, max });
    }
    Ok(())
}
