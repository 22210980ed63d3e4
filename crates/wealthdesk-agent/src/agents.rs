//! # Agent Descriptors
//!
//! Every pipeline stage is described by data, not code: an [`AgentId`], the
//! [`InputView`] of the workflow state it is shown, and the [`OutputSchema`]
//! tag attached to its signal. One stage runner in the orchestrator handles
//! every descriptor.
//!
//! | View | Sees |
//! |------|------|
//! | `profile` | Client profile |
//! | `portfolio` | Profile and holdings |
//! | `market` | Profile, holdings and the market snapshot digest |
//! | `full` | Everything above plus every prior signal |

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown agent '{value}'")]
pub struct UnknownAgent {
    pub value: String,
}

/// Pipeline stages, declared in the default run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    PassiveIndexing,
    DividendGrowth,
    Esg,
    FactorInvesting,
    GlobalMacro,
    TacticalAllocation,
    CanadianCore,
    RiskProfiler,
    TaxOptimization,
    EstatePlanning,
    RetirementPlanner,
    InsurancePlanning,
    DebtStrategy,
    PortfolioAuditor,
    Rebalancer,
    MarketSentiment,
    PortfolioManager,
}

impl AgentId {
    pub const ALL: [Self; 17] = [
        Self::PassiveIndexing,
        Self::DividendGrowth,
        Self::Esg,
        Self::FactorInvesting,
        Self::GlobalMacro,
        Self::TacticalAllocation,
        Self::CanadianCore,
        Self::RiskProfiler,
        Self::TaxOptimization,
        Self::EstatePlanning,
        Self::RetirementPlanner,
        Self::InsurancePlanning,
        Self::DebtStrategy,
        Self::PortfolioAuditor,
        Self::Rebalancer,
        Self::MarketSentiment,
        Self::PortfolioManager,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PassiveIndexing => "passive_indexing",
            Self::DividendGrowth => "dividend_growth",
            Self::Esg => "esg",
            Self::FactorInvesting => "factor_investing",
            Self::GlobalMacro => "global_macro",
            Self::TacticalAllocation => "tactical_allocation",
            Self::CanadianCore => "canadian_core",
            Self::RiskProfiler => "risk_profiler",
            Self::TaxOptimization => "tax_optimization",
            Self::EstatePlanning => "estate_planning",
            Self::RetirementPlanner => "retirement_planner",
            Self::InsurancePlanning => "insurance_planning",
            Self::DebtStrategy => "debt_strategy",
            Self::PortfolioAuditor => "portfolio_auditor",
            Self::Rebalancer => "rebalancer",
            Self::MarketSentiment => "market_sentiment",
            Self::PortfolioManager => "portfolio_manager",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::PassiveIndexing => "Passive Indexing",
            Self::DividendGrowth => "Dividend Growth",
            Self::Esg => "ESG",
            Self::FactorInvesting => "Factor Investing",
            Self::GlobalMacro => "Global Macro",
            Self::TacticalAllocation => "Tactical Allocation",
            Self::CanadianCore => "Canadian Core",
            Self::RiskProfiler => "Risk Profiler",
            Self::TaxOptimization => "Tax Optimization",
            Self::EstatePlanning => "Estate Planning",
            Self::RetirementPlanner => "Retirement Planner",
            Self::InsurancePlanning => "Insurance Planning",
            Self::DebtStrategy => "Debt Strategy",
            Self::PortfolioAuditor => "Portfolio Auditor",
            Self::Rebalancer => "Rebalancer",
            Self::MarketSentiment => "Sentiment & Market Context",
            Self::PortfolioManager => "Portfolio Manager",
        }
    }

    pub fn descriptor(self) -> AgentDescriptor {
        AgentDescriptor::for_agent(self)
    }

    /// All stages in default order, synthesis last.
    pub fn default_order() -> Vec<Self> {
        Self::ALL.to_vec()
    }
}

impl Display for AgentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = UnknownAgent;

    /// Accepts `risk_profiler`, `risk-profiler` and `risk_profiler_agent`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        let key = normalized.strip_suffix("_agent").unwrap_or(&normalized);
        Self::ALL
            .into_iter()
            .find(|agent| agent.as_str() == key)
            .ok_or_else(|| UnknownAgent {
                value: value.to_owned(),
            })
    }
}

/// Slice of the workflow state a stage is shown. Each view includes the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputView {
    Profile,
    Portfolio,
    Market,
    Full,
}

impl InputView {
    pub fn includes_portfolio(self) -> bool {
        self >= Self::Portfolio
    }

    pub fn includes_market(self) -> bool {
        self >= Self::Market
    }

    pub fn includes_signals(self) -> bool {
        self == Self::Full
    }
}

/// Tag describing what a signal's payload represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSchema {
    Allocation,
    Planning,
    MarketView,
    Synthesis,
}

impl OutputSchema {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
            Self::Planning => "planning",
            Self::MarketView => "market_view",
            Self::Synthesis => "synthesis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub display_name: &'static str,
    pub input_view: InputView,
    pub output_schema: OutputSchema,
    /// One-line brief handed to the model.
    pub focus: &'static str,
}

impl AgentDescriptor {
    pub fn for_agent(id: AgentId) -> Self {
        use InputView::{Full, Market, Portfolio, Profile};
        use OutputSchema::{Allocation, MarketView, Planning, Synthesis};

        let (input_view, output_schema, focus) = match id {
            AgentId::PassiveIndexing => (
                Market,
                Allocation,
                "Low-cost broad index exposure matched to the client's horizon.",
            ),
            AgentId::DividendGrowth => (
                Market,
                Allocation,
                "Holdings with durable, growing dividends and sustainable payout.",
            ),
            AgentId::Esg => (
                Market,
                Allocation,
                "Environmental, social and governance fit of current and candidate holdings.",
            ),
            AgentId::FactorInvesting => (
                Market,
                Allocation,
                "Value, momentum, quality and size tilts supported by the price history.",
            ),
            AgentId::GlobalMacro => (
                Market,
                MarketView,
                "Rates, inflation, growth and currency conditions from the economic series.",
            ),
            AgentId::TacticalAllocation => (
                Market,
                Allocation,
                "Short-horizon over- and under-weights from technical indicators.",
            ),
            AgentId::CanadianCore => (
                Market,
                Allocation,
                "Core allocation for a Canadian investor including currency exposure.",
            ),
            AgentId::RiskProfiler => (
                Profile,
                Planning,
                "Risk capacity and tolerance from age, horizon, income and goals.",
            ),
            AgentId::TaxOptimization => (
                Portfolio,
                Planning,
                "Account placement and tax-loss harvesting opportunities.",
            ),
            AgentId::EstatePlanning => (
                Profile,
                Planning,
                "Beneficiary, estate and wealth-transfer considerations.",
            ),
            AgentId::RetirementPlanner => (
                Portfolio,
                Planning,
                "Savings rate and drawdown readiness for the retirement target.",
            ),
            AgentId::InsurancePlanning => (
                Profile,
                Planning,
                "Coverage gaps relative to income and dependants.",
            ),
            AgentId::DebtStrategy => (
                Profile,
                Planning,
                "Debt repayment priority against investing.",
            ),
            AgentId::PortfolioAuditor => (
                Market,
                Planning,
                "Concentration, drift, unpriced holdings and data quality issues.",
            ),
            AgentId::Rebalancer => (
                Market,
                Allocation,
                "Trades needed to bring weights back inside the rebalancing threshold.",
            ),
            AgentId::MarketSentiment => (
                Market,
                MarketView,
                "Headline sentiment and market session context.",
            ),
            AgentId::PortfolioManager => (
                Full,
                Synthesis,
                "Consolidate every prior signal into final portfolio recommendations.",
            ),
        };

        Self {
            id,
            display_name: id.display_name(),
            input_view,
            output_schema,
            focus,
        }
    }
}
