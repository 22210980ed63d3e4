//! Run configuration.
//!
//! Loaded once from JSON with defaults for every field, validated before any
//! provider is called and never modified during a run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wealthdesk_core::aggregator::ProviderChains;
use wealthdesk_core::{
    AggregatorConfig, CacheTtlByKind, MarketCalendar, Portfolio, Symbol, ValidationError,
};

use crate::agents::{AgentDescriptor, AgentId};

/// Fatal configuration problems. A run never starts when one is raised.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no symbols to analyse: symbol_set is empty and the portfolio has no holdings")]
    NoSymbols,

    #[error("agent_order is empty")]
    NoAgents,

    #[error("agent '{0}' appears more than once in agent_order")]
    DuplicateAgent(AgentId),

    #[error("synthesis agent '{0}' must be the last entry of agent_order")]
    SynthesisNotLast(AgentId),

    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },

    #[error("provider chain for {kind} is empty")]
    EmptyProviderChain { kind: &'static str },

    #[error("invalid holiday: {0}")]
    InvalidHoliday(ValidationError),

    #[error("invalid client input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigurationError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoSymbols => "config.no_symbols",
            Self::NoAgents => "config.no_agents",
            Self::DuplicateAgent(_) => "config.duplicate_agent",
            Self::SynthesisNotLast(_) => "config.synthesis_not_last",
            Self::ZeroTimeout { .. } => "config.zero_timeout",
            Self::EmptyProviderChain { .. } => "config.empty_provider_chain",
            Self::InvalidHoliday(_) => "config.invalid_holiday",
            Self::InvalidInput(_) => "config.invalid_input",
            Self::Io { .. } => "config.io",
            Self::Parse { .. } => "config.parse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Symbols to aggregate. Empty means "the portfolio's holdings".
    pub symbol_set: Vec<Symbol>,
    pub agent_order: Vec<AgentId>,
    pub synthesis_agent: AgentId,
    pub providers: ProviderChains,
    pub global_timeout_secs: u64,
    pub stage_timeout_secs: u64,
    pub aggregation_timeout_secs: u64,
    pub provider_timeout_secs: u64,
    pub cache_ttl_by_kind: CacheTtlByKind,
    pub economic_series: Vec<String>,
    pub history_days: usize,
    pub news_lookback_days: u32,
    pub news_limit: usize,
    pub market_news_topic: String,
    /// `YYYY-MM-DD` exchange holidays.
    pub holidays: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let aggregation = AggregatorConfig::default();
        Self {
            symbol_set: Vec::new(),
            agent_order: AgentId::default_order(),
            synthesis_agent: AgentId::PortfolioManager,
            providers: aggregation.chains,
            global_timeout_secs: 900,
            stage_timeout_secs: 120,
            aggregation_timeout_secs: aggregation.aggregation_timeout.as_secs(),
            provider_timeout_secs: aggregation.provider_timeout.as_secs(),
            cache_ttl_by_kind: CacheTtlByKind::default(),
            economic_series: aggregation.economic_series,
            history_days: aggregation.history_days,
            news_lookback_days: aggregation.news_lookback_days,
            news_limit: aggregation.news_limit,
            market_news_topic: aggregation.market_news_topic,
            holidays: Vec::new(),
        }
    }
}

/// Validated stage order: analysis stages in run order, then synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub analysis: Vec<AgentDescriptor>,
    pub synthesis: AgentDescriptor,
}

impl StagePlan {
    /// Analysis stages plus synthesis.
    pub fn stage_count(&self) -> usize {
        self.analysis.len() + 1
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks everything that can be checked without the client's inputs.
    pub fn validate(&self) -> Result<StagePlan, ConfigurationError> {
        for (field, value) in [
            ("global_timeout_secs", self.global_timeout_secs),
            ("stage_timeout_secs", self.stage_timeout_secs),
            ("aggregation_timeout_secs", self.aggregation_timeout_secs),
            ("provider_timeout_secs", self.provider_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigurationError::ZeroTimeout { field });
            }
        }
        if self.providers.quote.is_empty() {
            return Err(ConfigurationError::EmptyProviderChain { kind: "quote" });
        }
        self.calendar()?;
        self.stage_plan()
    }

    /// Agent order with synthesis last. A synthesis agent missing from the
    /// list is appended; one listed anywhere but last is rejected.
    pub fn stage_plan(&self) -> Result<StagePlan, ConfigurationError> {
        if self.agent_order.is_empty() {
            return Err(ConfigurationError::NoAgents);
        }
        let mut seen = BTreeSet::new();
        for agent in &self.agent_order {
            if !seen.insert(*agent) {
                return Err(ConfigurationError::DuplicateAgent(*agent));
            }
        }

        let mut analysis = self.agent_order.clone();
        match analysis.iter().position(|agent| *agent == self.synthesis_agent) {
            Some(index) if index + 1 != analysis.len() => {
                return Err(ConfigurationError::SynthesisNotLast(self.synthesis_agent));
            }
            Some(_) => {
                analysis.pop();
            }
            None => {}
        }

        Ok(StagePlan {
            analysis: analysis.into_iter().map(AgentId::descriptor).collect(),
            synthesis: self.synthesis_agent.descriptor(),
        })
    }

    /// Configured symbols, or the portfolio's holdings when none are configured.
    pub fn symbols_for(&self, portfolio: &Portfolio) -> Result<Vec<Symbol>, ConfigurationError> {
        let symbols = if self.symbol_set.is_empty() {
            portfolio.symbols()
        } else {
            self.symbol_set.clone()
        };
        if symbols.is_empty() {
            return Err(ConfigurationError::NoSymbols);
        }
        Ok(symbols)
    }

    pub fn calendar(&self) -> Result<MarketCalendar, ConfigurationError> {
        MarketCalendar::default()
            .with_holiday_strings(&self.holidays)
            .map_err(ConfigurationError::InvalidHoliday)
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            chains: self.providers.clone(),
            aggregation_timeout: Duration::from_secs(self.aggregation_timeout_secs),
            provider_timeout: Duration::from_secs(self.provider_timeout_secs),
            economic_series: self.economic_series.clone(),
            history_days: self.history_days,
            news_lookback_days: self.news_lookback_days,
            news_limit: self.news_limit,
            market_news_topic: self.market_news_topic.clone(),
        }
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}
