//! The aggregated market view handed to every agent stage.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::MarketSession;
use crate::indicators::TechnicalIndicators;
use crate::routing::AttemptError;
use crate::sentiment::SentimentSummary;
use crate::{EconomicIndicator, FxRate, NewsItem, PriceQuote, ProviderId, Symbol, UtcDateTime};

/// Identifies one aggregation run; signals record the version they were computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotVersion(Uuid);

impl SnapshotVersion {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for SnapshotVersion {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SnapshotVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// How a symbol's quote was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    /// First provider in the chain answered.
    Ok,
    /// A later provider answered after earlier ones failed.
    Fallback,
    Cached,
    /// Every provider failed or the aggregation timed out.
    Failed,
}

/// Per-symbol entry. Present for every requested symbol, failed or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolData {
    pub quote: Option<PriceQuote>,
    pub status: QuoteStatus,
    pub technicals: Option<TechnicalIndicators>,
    pub source_chain: Vec<ProviderId>,
    pub errors: Vec<AttemptError>,
}

impl SymbolData {
    pub fn failed(source_chain: Vec<ProviderId>, errors: Vec<AttemptError>) -> Self {
        Self {
            quote: None,
            status: QuoteStatus::Failed,
            technicals: None,
            source_chain,
            errors,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == QuoteStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Success,
    Degraded,
    Failed,
}

/// Call outcomes for one provider during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderTally {
    pub succeeded: u32,
    pub failed: u32,
}

impl ProviderTally {
    pub fn record(&mut self, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// `None` when the provider was never called.
    pub fn status(self) -> Option<ProviderStatus> {
        match (self.succeeded, self.failed) {
            (0, 0) => None,
            (_, 0) => Some(ProviderStatus::Success),
            (0, _) => Some(ProviderStatus::Failed),
            _ => Some(ProviderStatus::Degraded),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataSnapshot {
    pub version: SnapshotVersion,
    pub as_of: UtcDateTime,
    pub market_session: MarketSession,
    pub symbols: BTreeMap<Symbol, SymbolData>,
    /// De-duplicated, newest first.
    pub news: Vec<NewsItem>,
    pub indicators: Vec<EconomicIndicator>,
    pub fx_rates: Vec<FxRate>,
    pub sentiment_summary: SentimentSummary,
    pub provider_status: BTreeMap<ProviderId, ProviderStatus>,
    pub warnings: Vec<String>,
    pub timed_out: bool,
}

impl MarketDataSnapshot {
    pub fn get(&self, symbol: &Symbol) -> Option<&SymbolData> {
        self.symbols.get(symbol)
    }

    pub fn quote(&self, symbol: &Symbol) -> Option<&PriceQuote> {
        self.symbols.get(symbol)?.quote.as_ref()
    }

    pub fn failed_symbols(&self) -> Vec<Symbol> {
        self.symbols
            .iter()
            .filter(|(_, data)| data.is_failed())
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    /// True when no requested symbol produced a quote.
    pub fn all_failed(&self) -> bool {
        self.symbols.values().all(SymbolData::is_failed)
    }

    /// Company news mentioning `symbol`.
    pub fn news_for<'a>(&'a self, symbol: &'a Symbol) -> impl Iterator<Item = &'a NewsItem> + 'a {
        self.news.iter().filter(move |item| item.symbols.contains(symbol))
    }

    pub fn macro_news(&self) -> impl Iterator<Item = &NewsItem> {
        self.news.iter().filter(|item| item.is_macro())
    }
}
