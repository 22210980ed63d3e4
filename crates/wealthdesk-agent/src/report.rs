//! Run reports and the sinks that receive them.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use wealthdesk_core::{ProviderId, ProviderStatus, Symbol, UtcDateTime};

use crate::agents::AgentId;
use crate::orchestrator::RunPhase;
use crate::signal::Stance;
use crate::state::{RunId, WorkflowState};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write report to '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report: {0}")]
    Write(#[source] std::io::Error),
}

/// Run-level annotations derived from the final state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub degraded_agents: Vec<AgentId>,
    pub skipped_agents: Vec<AgentId>,
    pub failed_symbols: Vec<Symbol>,
    pub provider_status: BTreeMap<ProviderId, ProviderStatus>,
    pub signal_distribution: BTreeMap<Stance, usize>,
    /// Mean over non-degraded signals; 0 when every stage degraded.
    pub average_confidence: f64,
    pub market_data_timed_out: bool,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn from_state(state: &WorkflowState) -> Self {
        let snapshot = state.snapshot();
        let mut signal_distribution = BTreeMap::new();
        for signal in state.signals() {
            *signal_distribution.entry(signal.payload.stance).or_insert(0) += 1;
        }

        let healthy = state
            .signals()
            .iter()
            .filter(|signal| !signal.is_degraded())
            .map(|signal| signal.confidence)
            .collect::<Vec<_>>();
        let average_confidence = if healthy.is_empty() {
            0.0
        } else {
            healthy.iter().sum::<f64>() / healthy.len() as f64
        };

        Self {
            degraded_agents: state
                .signals()
                .iter()
                .filter(|signal| signal.is_degraded())
                .map(|signal| signal.agent)
                .collect(),
            skipped_agents: state.skipped().to_vec(),
            failed_symbols: snapshot.failed_symbols(),
            provider_status: snapshot.provider_status.clone(),
            signal_distribution,
            average_confidence,
            market_data_timed_out: snapshot.timed_out,
            warnings: snapshot.warnings.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub generated_at: UtcDateTime,
    pub model: String,
    pub phases: Vec<RunPhase>,
    pub summary: RunSummary,
    pub state: WorkflowState,
}

impl RunReport {
    pub fn new(state: WorkflowState, phases: Vec<RunPhase>, model: impl Into<String>) -> Self {
        Self {
            run_id: state.run_id(),
            generated_at: UtcDateTime::now(),
            model: model.into(),
            phases,
            summary: RunSummary::from_state(&state),
            state,
        }
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, ReportError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

/// Terminal destination of a run.
pub trait ReportSink: Send {
    fn write(&mut self, report: &RunReport) -> Result<(), ReportError>;
}

/// Writes the report as a JSON file, creating parent directories.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
    pretty: bool,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pretty: true,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ReportError {
        ReportError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ReportSink for JsonFileSink {
    fn write(&mut self, report: &RunReport) -> Result<(), ReportError> {
        let json = report.to_json(self.pretty)?;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        std::fs::write(&self.path, json).map_err(|source| self.io_error(source))
    }
}

/// Writes the report as one JSON document to any writer, e.g. stdout.
pub struct WriterSink<W: Write + Send> {
    writer: W,
    pretty: bool,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W, pretty: bool) -> Self {
        Self { writer, pretty }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ReportSink for WriterSink<W> {
    fn write(&mut self, report: &RunReport) -> Result<(), ReportError> {
        let json = report.to_json(self.pretty)?;
        self.writer
            .write_all(json.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush())
            .map_err(ReportError::Write)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wealthdesk_core::Portfolio;

    use super::*;
    use crate::signal::{AgentSignal, SignalPayload};
    use crate::testing::{empty_snapshot, profile};

    fn finished_state() -> WorkflowState {
        let mut snapshot = empty_snapshot();
        snapshot
            .provider_status
            .insert(ProviderId::Yahoo, ProviderStatus::Degraded);
        let version = snapshot.version;
        WorkflowState::new(
            RunId::new_v4(),
            Arc::new(profile()),
            Arc::new(Portfolio::new("c-1", Vec::new())),
            Arc::new(snapshot),
        )
        .with_signal(AgentSignal::new(
            &AgentId::RiskProfiler.descriptor(),
            SignalPayload::neutral("steady"),
            0.8,
            version,
        ))
        .with_signal(AgentSignal::degraded(
            &AgentId::Esg.descriptor(),
            version,
            "stage timed out after 1s",
        ))
        .with_skipped([AgentId::Rebalancer])
        .with_signal(AgentSignal::new(
            &AgentId::PortfolioManager.descriptor(),
            SignalPayload {
                stance: Stance::Recommend,
                ..SignalPayload::neutral("hold course")
            },
            0.6,
            version,
        ))
    }

    #[test]
    fn summary_annotates_degradation_and_distribution() {
        let summary = RunSummary::from_state(&finished_state());

        assert_eq!(summary.degraded_agents, vec![AgentId::Esg]);
        assert_eq!(summary.skipped_agents, vec![AgentId::Rebalancer]);
        assert_eq!(summary.signal_distribution.get(&Stance::Neutral), Some(&2));
        assert_eq!(summary.signal_distribution.get(&Stance::Recommend), Some(&1));
        assert!((summary.average_confidence - 0.7).abs() < 1e-9);
        assert_eq!(
            summary.provider_status.get(&ProviderId::Yahoo),
            Some(&ProviderStatus::Degraded)
        );
    }

    #[test]
    fn file_sink_creates_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("reports").join("run.json");
        let report = RunReport::new(finished_state(), vec![RunPhase::Init], "offline");

        JsonFileSink::new(&path).write(&report).expect("write");

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(written["model"], serde_json::json!("offline"));
        assert_eq!(written["summary"]["degraded_agents"], serde_json::json!(["esg"]));
        assert_eq!(written["state"]["signals"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn file_sink_reports_unwritable_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, "not a directory").expect("write blocker");
        let report = RunReport::new(finished_state(), Vec::new(), "offline");

        let error = JsonFileSink::new(blocker.join("run.json"))
            .write(&report)
            .expect_err("parent is a file");

        assert!(matches!(error, ReportError::Io { .. }));
    }

    #[test]
    fn writer_sink_emits_one_document() {
        let report = RunReport::new(finished_state(), Vec::new(), "offline");
        let mut sink = WriterSink::new(Vec::new(), false);

        sink.write(&report).expect("write");

        let text = String::from_utf8(sink.into_inner()).expect("utf8");
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains(&report.run_id.to_string()));
    }
}
