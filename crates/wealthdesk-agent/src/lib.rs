//! # wealthdesk-agent
//!
//! Sequential advisory pipeline over a market data snapshot.
//!
//! ## Overview
//!
//! A run validates its [`RunConfig`], fetches one [`wealthdesk_core::MarketDataSnapshot`],
//! then walks the configured agent stages in order. Each stage is a plain
//! [`AgentDescriptor`]; one runner builds the prompt for the descriptor's
//! input view, calls the [`LanguageModel`] and appends the resulting
//! [`AgentSignal`] to the [`WorkflowState`]. The synthesis stage runs last and
//! the final [`RunReport`] goes to a [`ReportSink`].
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agents`] | Agent identifiers and stage descriptors |
//! | [`config`] | Run configuration and validation |
//! | [`model`] | Language model trait, Ollama and offline models |
//! | [`orchestrator`] | Run lifecycle and the stage runner |
//! | [`prompt`] | Prompt construction per input view |
//! | [`report`] | Run report, summary and sinks |
//! | [`signal`] | Agent signals and response parsing |
//! | [`state`] | Workflow state and run identifiers |
//! | [`stream`] | NDJSON progress events |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wealthdesk_agent::{JsonFileSink, NoProgress, OfflineModel, Orchestrator, RunConfig};
//! use wealthdesk_core::ProviderRegistry;
//!
//! let orchestrator = Orchestrator::new(
//!     RunConfig::load("wealthdesk.json")?,
//!     Arc::new(ProviderRegistry::offline()),
//!     Arc::new(OfflineModel),
//! )?;
//! let outcome = orchestrator
//!     .run(profile, portfolio, &mut JsonFileSink::new("report.json"), &mut NoProgress)
//!     .await?;
//! ```

pub mod agents;
pub mod config;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod report;
pub mod signal;
pub mod state;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use agents::{AgentDescriptor, AgentId, InputView, OutputSchema, UnknownAgent};
pub use config::{ConfigurationError, RunConfig, StagePlan};
pub use model::{LanguageModel, ModelError, ModelFuture, ModelRequest, OfflineModel, OllamaModel};
pub use orchestrator::{Orchestrator, OrchestratorError, RunOutcome, RunPhase};
pub use report::{JsonFileSink, ReportError, ReportSink, RunReport, RunSummary, WriterSink};
pub use signal::{parse_response, AgentSignal, ParsedResponse, Recommendation, SignalPayload, Stance};
pub use state::{RunId, WorkflowState};
pub use stream::{
    parse_progress_events, NdjsonProgress, NoProgress, ProgressError, ProgressEvent, ProgressKind,
    ProgressSink, StreamError,
};
