//! # Orchestrator
//!
//! Drives one advisory run:
//!
//! ```text
//! Init ─▶ DataLoaded ─▶ MarketDataFetched ─▶ AgentsRunning(0..n) ─▶ Synthesized ─▶ Reported
//! ```
//!
//! Configuration and client inputs are validated before any provider is
//! called. Analysis stages run one after another through a single stage
//! runner; a stage that fails or exceeds `stage_timeout` contributes a
//! degraded signal instead of aborting the run. Once `global_timeout` has
//! elapsed no further analysis stage is launched, the remainder is recorded
//! as skipped and synthesis runs on whatever signals exist.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};
use wealthdesk_core::{
    AggregationError, AggregatorContext, ClientProfile, MarketDataAggregator, Portfolio,
    ProviderRegistry,
};

use crate::agents::AgentDescriptor;
use crate::config::{ConfigurationError, RunConfig};
use crate::model::LanguageModel;
use crate::prompt::build_request;
use crate::report::{ReportError, ReportSink, RunReport};
use crate::signal::{parse_response, AgentSignal};
use crate::state::{RunId, WorkflowState};
use crate::stream::{ProgressError, ProgressSink, StreamError};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl OrchestratorError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(error) => error.code(),
            Self::Aggregation(_) => "aggregation.empty_symbol_set",
        }
    }
}

/// Lifecycle positions, recorded in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "stage", rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    DataLoaded,
    MarketDataFetched,
    /// Index of the analysis stage being run.
    AgentsRunning(usize),
    Synthesized,
    Reported,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    /// Set when the report sink failed; the report is still returned.
    pub sink_error: Option<ReportError>,
    /// First progress stream failure, if any.
    pub progress_error: Option<StreamError>,
}

impl RunOutcome {
    pub fn phases(&self) -> &[RunPhase] {
        &self.report.phases
    }
}

/// Why a stage produced no usable reply.
struct StageFailure {
    code: &'static str,
    note: String,
}

/// Progress sink wrapper that logs failures and keeps the first one.
struct Progress<'a> {
    sink: &'a mut dyn ProgressSink,
    first_error: Option<StreamError>,
}

impl Progress<'_> {
    fn record(&mut self, result: Result<(), StreamError>) {
        if let Err(error) = result {
            warn!(error = %error, "progress stream write failed");
            if self.first_error.is_none() {
                self.first_error = Some(error);
            }
        }
    }

    fn start(&mut self, data: serde_json::Value) {
        let result = self.sink.start(data);
        self.record(result);
    }

    fn progress(&mut self, data: serde_json::Value) {
        let result = self.sink.progress(data);
        self.record(result);
    }

    fn end(&mut self, data: serde_json::Value) {
        let result = self.sink.end(data);
        self.record(result);
    }

    fn error(&mut self, error: ProgressError, data: serde_json::Value) {
        let result = self.sink.error(error, Some(data));
        self.record(result);
    }
}

pub struct Orchestrator {
    aggregator: MarketDataAggregator,
    model: Arc<dyn LanguageModel>,
    config: RunConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("model", &self.model.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Orchestrator {
    /// Wires an aggregator over `registry` with the calendar, cache TTLs and
    /// timeouts from `config`.
    pub fn new(
        config: RunConfig,
        registry: Arc<ProviderRegistry>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, ConfigurationError> {
        Self::with_context(config, AggregatorContext::new(registry), model)
    }

    /// Like [`Orchestrator::new`] but reuses caller-provided cache and limiter handles.
    pub fn with_context(
        config: RunConfig,
        context: AggregatorContext,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let context = context
            .with_calendar(config.calendar()?)
            .with_ttls(config.cache_ttl_by_kind);
        let aggregator = MarketDataAggregator::new(context, config.aggregator_config());
        Ok(Self {
            aggregator,
            model,
            config,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &MarketDataAggregator {
        &self.aggregator
    }

    /// Runs the full pipeline. Only configuration problems are returned as
    /// errors; provider, model and sink failures are recorded in the outcome.
    pub async fn run(
        &self,
        profile: ClientProfile,
        portfolio: Portfolio,
        sink: &mut dyn ReportSink,
        progress: &mut dyn ProgressSink,
    ) -> Result<RunOutcome, OrchestratorError> {
        let started = Instant::now();
        let deadline = started + self.config.global_timeout();
        let run_id = RunId::new_v4();
        let mut phases = vec![RunPhase::Init];
        let mut progress = Progress {
            sink: progress,
            first_error: None,
        };

        let plan = self.config.validate()?;
        let symbols = self.config.symbols_for(&portfolio)?;
        profile.validate().map_err(ConfigurationError::from)?;
        portfolio.validate().map_err(ConfigurationError::from)?;

        info!(
            run_id = %run_id,
            symbols = symbols.len(),
            stages = plan.stage_count(),
            model = self.model.name(),
            "run started"
        );
        progress.start(json!({
            "run_id": run_id,
            "symbols": symbols,
            "stages": plan.stage_count(),
            "model": self.model.name(),
        }));

        let profile = Arc::new(profile);
        let portfolio = Arc::new(portfolio);
        phases.push(RunPhase::DataLoaded);
        progress.progress(json!({ "phase": "data_loaded" }));

        let budget = deadline.saturating_duration_since(Instant::now());
        let snapshot = self.aggregator.aggregate_within(&symbols, &profile, budget).await?;
        let failed_symbols = snapshot.failed_symbols();
        info!(
            run_id = %run_id,
            snapshot = %snapshot.version,
            failed = failed_symbols.len(),
            timed_out = snapshot.timed_out,
            elapsed_ms = elapsed_ms(started),
            "market data fetched"
        );
        phases.push(RunPhase::MarketDataFetched);
        progress.progress(json!({
            "phase": "market_data_fetched",
            "snapshot_version": snapshot.version,
            "failed_symbols": failed_symbols,
            "timed_out": snapshot.timed_out,
        }));

        let mut state = WorkflowState::new(run_id, profile, portfolio, Arc::new(snapshot));

        for (index, descriptor) in plan.analysis.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let skipped = plan.analysis[index..]
                    .iter()
                    .map(|stage| stage.id)
                    .collect::<Vec<_>>();
                warn!(
                    run_id = %run_id,
                    skipped = skipped.len(),
                    elapsed_ms = elapsed_ms(started),
                    "global timeout reached; skipping remaining analysis stages"
                );
                progress.error(
                    ProgressError::new("run.global_timeout", "global timeout reached"),
                    json!({ "skipped": skipped }),
                );
                state = state.with_skipped(skipped);
                break;
            }

            phases.push(RunPhase::AgentsRunning(index));
            let budget = self.config.stage_timeout().min(remaining);
            let signal = self.execute_stage(descriptor, &state, budget, &mut progress).await;
            state = state.with_signal(signal);
        }

        let synthesis = self
            .execute_stage(&plan.synthesis, &state, self.config.stage_timeout(), &mut progress)
            .await;
        state = state.with_signal(synthesis);
        phases.push(RunPhase::Synthesized);

        phases.push(RunPhase::Reported);
        let report = RunReport::new(state, phases, self.model.name());
        let sink_error = match sink.write(&report) {
            Ok(()) => None,
            Err(error) => {
                warn!(run_id = %run_id, error = %error, "report sink failed");
                progress.error(
                    ProgressError::new("report.sink_failed", error.to_string()),
                    json!({ "run_id": run_id }),
                );
                Some(error)
            }
        };

        info!(
            run_id = %run_id,
            degraded = report.summary.degraded_agents.len(),
            skipped = report.summary.skipped_agents.len(),
            elapsed_ms = elapsed_ms(started),
            "run finished"
        );
        progress.end(json!({
            "run_id": run_id,
            "degraded_agents": report.summary.degraded_agents,
            "skipped_agents": report.summary.skipped_agents,
            "average_confidence": report.summary.average_confidence,
        }));

        Ok(RunOutcome {
            report,
            sink_error,
            progress_error: progress.first_error,
        })
    }

    /// The single stage runner: every descriptor goes through here.
    async fn execute_stage(
        &self,
        descriptor: &AgentDescriptor,
        state: &WorkflowState,
        budget: Duration,
        progress: &mut Progress<'_>,
    ) -> AgentSignal {
        let version = state.snapshot().version;
        let started = Instant::now();

        match self.call_model(descriptor, state, budget).await {
            Ok(signal) => {
                info!(
                    agent = %descriptor.id,
                    stance = signal.payload.stance.as_str(),
                    confidence = signal.confidence,
                    elapsed_ms = elapsed_ms(started),
                    "stage complete"
                );
                progress.progress(json!({
                    "phase": "stage_complete",
                    "agent": descriptor.id,
                    "stance": signal.payload.stance,
                    "confidence": signal.confidence,
                }));
                signal
            }
            Err(failure) => {
                warn!(
                    agent = %descriptor.id,
                    code = failure.code,
                    elapsed_ms = elapsed_ms(started),
                    "stage degraded: {}",
                    failure.note
                );
                progress.error(
                    ProgressError::new(failure.code, failure.note.clone())
                        .with_retryable(failure.code == "stage.timeout"),
                    json!({ "agent": descriptor.id }),
                );
                AgentSignal::degraded(descriptor, version, failure.note)
            }
        }
    }

    async fn call_model(
        &self,
        descriptor: &AgentDescriptor,
        state: &WorkflowState,
        budget: Duration,
    ) -> Result<AgentSignal, StageFailure> {
        let request = build_request(descriptor, state);
        let reply = tokio::time::timeout(budget, self.model.generate(request))
            .await
            .map_err(|_| StageFailure {
                code: "stage.timeout",
                note: format!("stage timed out after {}ms", budget.as_millis()),
            })?
            .map_err(|error| StageFailure {
                code: error.code(),
                note: error.to_string(),
            })?;

        if reply.trim().is_empty() {
            return Err(StageFailure {
                code: "model.empty",
                note: String::from("model returned an empty response"),
            });
        }

        let parsed = parse_response(&reply);
        Ok(AgentSignal::new(
            descriptor,
            parsed.payload,
            parsed.confidence,
            state.snapshot().version,
        ))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use wealthdesk_core::{
        CacheStore, CapabilitySet, DataSource, Endpoint, HealthStatus, ProviderId, QuoteBatch,
        QuoteRequest, RateLimiter, SourceFuture, Symbol,
    };

    use super::*;
    use crate::agents::AgentId;
    use crate::model::OfflineModel;
    use crate::report::WriterSink;
    use crate::signal::Stance;
    use crate::stream::{parse_progress_events, NdjsonProgress, NoProgress, ProgressKind};
    use crate::testing::{portfolio, profile, FailingSink, Reply, ScriptedModel};

    fn offline_context() -> AggregatorContext {
        AggregatorContext::new(Arc::new(ProviderRegistry::offline()))
            .with_cache(CacheStore::new())
            .with_limiter(RateLimiter::unlimited())
    }

    fn config(agents: &[AgentId]) -> RunConfig {
        RunConfig {
            symbol_set: vec![Symbol::parse("AAPL").expect("symbol")],
            agent_order: agents.to_vec(),
            ..RunConfig::default()
        }
    }

    fn orchestrator(config: RunConfig, model: impl LanguageModel + 'static) -> Orchestrator {
        Orchestrator::with_context(config, offline_context(), Arc::new(model)).expect("valid config")
    }

    #[tokio::test]
    async fn signals_follow_configured_order_with_synthesis_last() {
        let orchestrator = orchestrator(
            config(&[AgentId::RiskProfiler, AgentId::PassiveIndexing, AgentId::PortfolioManager]),
            OfflineModel,
        );
        let mut sink = WriterSink::new(Vec::new(), false);

        let outcome = orchestrator
            .run(profile(), portfolio(&["AAPL"]), &mut sink, &mut NoProgress)
            .await
            .expect("run");

        let order = outcome
            .report
            .state
            .signals()
            .iter()
            .map(|signal| signal.agent)
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![AgentId::RiskProfiler, AgentId::PassiveIndexing, AgentId::PortfolioManager]
        );
        assert_eq!(
            outcome.phases(),
            &[
                RunPhase::Init,
                RunPhase::DataLoaded,
                RunPhase::MarketDataFetched,
                RunPhase::AgentsRunning(0),
                RunPhase::AgentsRunning(1),
                RunPhase::Synthesized,
                RunPhase::Reported,
            ]
        );
        let version = outcome.report.state.snapshot().version;
        assert!(outcome
            .report
            .state
            .signals()
            .iter()
            .all(|signal| signal.snapshot_version == version));
        assert!(outcome.sink_error.is_none());
        assert!(!sink.into_inner().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_stage_degrades_and_the_run_continues() {
        let model = ScriptedModel::new()
            .with(AgentId::Esg, Reply::Hang)
            .with(AgentId::RiskProfiler, Reply::Text(String::from(r#"{"stance":"neutral","confidence":0.9,"reasoning":"ok"}"#)));
        let orchestrator = orchestrator(
            RunConfig {
                stage_timeout_secs: 2,
                ..config(&[AgentId::Esg, AgentId::RiskProfiler])
            },
            model,
        );
        let mut buffer = Vec::new();
        let mut progress = NdjsonProgress::new(&mut buffer);

        let outcome = orchestrator
            .run(
                profile(),
                portfolio(&["AAPL"]),
                &mut WriterSink::new(std::io::sink(), false),
                &mut progress,
            )
            .await
            .expect("run");

        let esg = outcome.report.state.signal(AgentId::Esg).expect("esg signal");
        assert!(esg.is_degraded());
        assert_eq!(esg.confidence, 0.0);
        assert!(esg.payload.recommendations.is_empty());
        let risk = outcome.report.state.signal(AgentId::RiskProfiler).expect("risk signal");
        assert!(!risk.is_degraded());
        assert_eq!(risk.confidence, 0.9);
        assert_eq!(outcome.report.summary.degraded_agents, vec![AgentId::Esg]);

        let events = parse_progress_events(std::str::from_utf8(&buffer).expect("utf8"))
            .expect("progress events");
        assert_eq!(events.first().map(|event| event.event), Some(ProgressKind::Start));
        assert_eq!(events.last().map(|event| event.event), Some(ProgressKind::End));
        assert!(events.iter().any(|event| {
            event.error.as_ref().is_some_and(|error| error.code == "stage.timeout")
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn global_timeout_skips_remaining_stages_but_synthesizes() {
        let model = ScriptedModel::new()
            .with_default(Reply::Hang)
            .with(AgentId::PortfolioManager, Reply::Text(String::from(r#"{"stance":"recommend","reasoning":"partial"}"#)));
        let orchestrator = orchestrator(
            RunConfig {
                global_timeout_secs: 5,
                stage_timeout_secs: 3,
                ..config(&[
                    AgentId::RiskProfiler,
                    AgentId::Esg,
                    AgentId::DividendGrowth,
                    AgentId::Rebalancer,
                ])
            },
            model,
        );

        let outcome = orchestrator
            .run(
                profile(),
                portfolio(&["AAPL"]),
                &mut WriterSink::new(std::io::sink(), false),
                &mut NoProgress,
            )
            .await
            .expect("run");

        let state = &outcome.report.state;
        assert_eq!(state.skipped(), &[AgentId::DividendGrowth, AgentId::Rebalancer]);
        let synthesis = state.signals().last().expect("synthesis");
        assert_eq!(synthesis.agent, AgentId::PortfolioManager);
        assert_eq!(synthesis.payload.stance, Stance::Recommend);
        assert!(!outcome.phases().contains(&RunPhase::AgentsRunning(2)));
        assert!(outcome.phases().contains(&RunPhase::Synthesized));
    }

    /// Quote source that never answers.
    struct SilentQuotes;

    impl DataSource for SilentQuotes {
        fn id(&self) -> ProviderId {
            ProviderId::Yahoo
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::none().with(Endpoint::Quote)
        }

        fn freshness(&self) -> Duration {
            Duration::from_secs(60)
        }

        fn quote<'a>(&'a self, _req: QuoteRequest) -> SourceFuture<'a, QuoteBatch> {
            Box::pin(std::future::pending())
        }

        fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
            Box::pin(async { HealthStatus::healthy() })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn aggregation_never_outlives_the_global_budget() {
        let context = AggregatorContext::new(Arc::new(ProviderRegistry::new(vec![Arc::new(SilentQuotes)])))
            .with_cache(CacheStore::new())
            .with_limiter(RateLimiter::unlimited());
        let config = RunConfig {
            global_timeout_secs: 4,
            aggregation_timeout_secs: 60,
            provider_timeout_secs: 120,
            ..config(&[AgentId::RiskProfiler])
        };
        let orchestrator = Orchestrator::with_context(config, context, Arc::new(OfflineModel)).expect("valid config");
        let started = Instant::now();

        let outcome = orchestrator
            .run(
                profile(),
                portfolio(&["AAPL"]),
                &mut WriterSink::new(std::io::sink(), false),
                &mut NoProgress,
            )
            .await
            .expect("run");

        assert!(started.elapsed() < Duration::from_secs(5));
        let snapshot = outcome.report.state.snapshot();
        assert!(snapshot.timed_out);
        assert!(snapshot.all_failed());
        assert_eq!(outcome.report.state.skipped(), &[AgentId::RiskProfiler]);
        assert!(outcome.phases().contains(&RunPhase::Synthesized));
    }

    #[tokio::test]
    async fn invalid_configuration_fails_before_any_stage() {
        let model = ScriptedModel::new();
        let calls = model.calls();
        let empty = RunConfig {
            symbol_set: Vec::new(),
            ..config(&[AgentId::RiskProfiler])
        };
        let orchestrator = orchestrator(empty, model);

        let error = orchestrator
            .run(
                profile(),
                portfolio(&[]),
                &mut WriterSink::new(std::io::sink(), false),
                &mut NoProgress,
            )
            .await
            .expect_err("no symbols");

        assert_eq!(error.code(), "config.no_symbols");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        let bad_order = RunConfig {
            agent_order: vec![AgentId::PortfolioManager, AgentId::Esg],
            ..config(&[])
        };
        assert!(matches!(
            Orchestrator::with_context(bad_order, offline_context(), Arc::new(OfflineModel)),
            Err(ConfigurationError::SynthesisNotLast(AgentId::PortfolioManager))
        ));
    }

    #[tokio::test]
    async fn sink_failure_is_returned_not_raised() {
        let orchestrator = orchestrator(config(&[AgentId::RiskProfiler]), OfflineModel);

        let outcome = orchestrator
            .run(profile(), portfolio(&["AAPL"]), &mut FailingSink, &mut NoProgress)
            .await
            .expect("run still succeeds");

        assert!(matches!(outcome.sink_error, Some(ReportError::Write(_))));
        assert_eq!(outcome.phases().last(), Some(&RunPhase::Reported));
    }

    #[tokio::test]
    async fn model_errors_become_degraded_signals() {
        let model = ScriptedModel::new().with(AgentId::RiskProfiler, Reply::Fail);
        let orchestrator = orchestrator(config(&[AgentId::RiskProfiler]), model);

        let outcome = orchestrator
            .run(
                profile(),
                portfolio(&["AAPL"]),
                &mut WriterSink::new(std::io::sink(), false),
                &mut NoProgress,
            )
            .await
            .expect("run");

        let signal = outcome.report.state.signal(AgentId::RiskProfiler).expect("signal");
        assert!(signal.is_degraded());
        assert!(signal
            .degradation
            .as_deref()
            .is_some_and(|note| note.contains("transport")));
    }
}
