//! Workflow state threaded through the pipeline.
//!
//! Stages receive the state by reference and return a signal; the
//! orchestrator appends it by value. Profile, portfolio and snapshot are
//! shared read-only for the whole run.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wealthdesk_core::{ClientProfile, MarketDataSnapshot, Portfolio};

use crate::agents::AgentId;
use crate::signal::AgentSignal;

/// Identifies one orchestrator run in logs, progress events and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new_v4()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    run_id: RunId,
    profile: Arc<ClientProfile>,
    portfolio: Arc<Portfolio>,
    snapshot: Arc<MarketDataSnapshot>,
    signals: Vec<AgentSignal>,
    skipped: Vec<AgentId>,
}

impl WorkflowState {
    pub fn new(
        run_id: RunId,
        profile: Arc<ClientProfile>,
        portfolio: Arc<Portfolio>,
        snapshot: Arc<MarketDataSnapshot>,
    ) -> Self {
        Self {
            run_id,
            profile,
            portfolio,
            snapshot,
            signals: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn profile(&self) -> &ClientProfile {
        &self.profile
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn snapshot(&self) -> &MarketDataSnapshot {
        &self.snapshot
    }

    /// Signals in execution order.
    pub fn signals(&self) -> &[AgentSignal] {
        &self.signals
    }

    pub fn signal(&self, agent: AgentId) -> Option<&AgentSignal> {
        self.signals.iter().find(|signal| signal.agent == agent)
    }

    pub fn skipped(&self) -> &[AgentId] {
        &self.skipped
    }

    pub fn with_signal(mut self, signal: AgentSignal) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn with_skipped(mut self, agents: impl IntoIterator<Item = AgentId>) -> Self {
        self.skipped.extend(agents);
        self
    }
}
