//! Fixtures shared by the unit tests of this crate.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use wealthdesk_core::{
    ClientProfile, Holding, MarketDataSnapshot, MarketSession, Portfolio, RiskTolerance,
    SentimentSummary, SnapshotVersion, Symbol, UtcDateTime,
};

use crate::agents::AgentId;
use crate::model::{LanguageModel, ModelError, ModelFuture, ModelRequest};
use crate::report::{ReportError, ReportSink, RunReport};

pub fn empty_snapshot() -> MarketDataSnapshot {
    let now = UtcDateTime::parse("2024-06-10T15:00:00Z").expect("timestamp");
    MarketDataSnapshot {
        version: SnapshotVersion::new(),
        as_of: now,
        market_session: MarketSession {
            is_open: true,
            last_close: now,
            next_open: now,
        },
        symbols: BTreeMap::new(),
        news: Vec::new(),
        indicators: Vec::new(),
        fx_rates: Vec::new(),
        sentiment_summary: SentimentSummary::default(),
        provider_status: BTreeMap::new(),
        warnings: Vec::new(),
        timed_out: false,
    }
}

pub fn profile() -> ClientProfile {
    ClientProfile {
        client_id: String::from("c-1"),
        name: String::from("Test Client"),
        age: 40,
        risk_tolerance: RiskTolerance::Moderate,
        time_horizon_years: 20,
        goals: vec![String::from("retirement")],
        constraints: Vec::new(),
        annual_income: Some(120_000.0),
        tax_bracket: Some(0.3),
        province: None,
        retirement_age: Some(65),
        base_currency: String::from("USD"),
    }
}

pub fn portfolio(symbols: &[&str]) -> Portfolio {
    let holdings = symbols
        .iter()
        .map(|raw| {
            Holding::new(Symbol::parse(raw).expect("symbol"), 10.0, 1_000.0).expect("holding")
        })
        .collect();
    Portfolio::new("c-1", holdings)
}

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
    Hang,
}

/// Model whose reply is scripted per agent.
pub struct ScriptedModel {
    replies: HashMap<AgentId, Reply>,
    default: Reply,
    calls: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            default: Reply::Text(String::from(
                r#"{"stance":"neutral","confidence":0.5,"reasoning":"scripted"}"#,
            )),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with(mut self, agent: AgentId, reply: Reply) -> Self {
        self.replies.insert(agent, reply);
        self
    }

    pub fn with_default(mut self, reply: Reply) -> Self {
        self.default = reply;
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate<'a>(&'a self, request: ModelRequest) -> ModelFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(&request.agent)
            .unwrap_or(&self.default)
            .clone();
        Box::pin(async move {
            match reply {
                Reply::Text(text) => Ok(text),
                Reply::Fail => Err(ModelError::Transport(String::from("connection refused"))),
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}

pub struct FailingSink;

impl ReportSink for FailingSink {
    fn write(&mut self, _report: &RunReport) -> Result<(), ReportError> {
        Err(ReportError::Write(std::io::Error::other("disk full")))
    }
}
