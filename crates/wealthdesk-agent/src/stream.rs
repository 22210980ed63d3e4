//! # Run Progress Stream
//!
//! Orchestrator progress as newline-delimited JSON, one event per line.
//!
//! | Event | Emitted when |
//! |-------|--------------|
//! | `start` | Configuration validated, run id assigned |
//! | `progress` | A phase completes or a stage finishes |
//! | `end` | Report produced |
//! | `error` | A stage degraded or the report sink failed |
//!
//! ```rust,ignore
//! let mut progress = NdjsonProgress::new(std::io::stderr().lock());
//! orchestrator.run(profile, portfolio, &mut sink, &mut progress).await?;
//! ```

use std::io::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use wealthdesk_core::UtcDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Start,
    Progress,
    End,
    Error,
}

/// Error payload carried by `error` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ProgressError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: None,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event: ProgressKind,
    /// Starts at 1 and increases by one per event.
    pub seq: u64,
    pub ts: UtcDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProgressError>,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives orchestrator progress. Failures are reported back but never abort a run.
pub trait ProgressSink: Send {
    fn start(&mut self, data: Value) -> Result<(), StreamError>;
    fn progress(&mut self, data: Value) -> Result<(), StreamError>;
    fn end(&mut self, data: Value) -> Result<(), StreamError>;
    fn error(&mut self, error: ProgressError, data: Option<Value>) -> Result<(), StreamError>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&mut self, _data: Value) -> Result<(), StreamError> {
        Ok(())
    }

    fn progress(&mut self, _data: Value) -> Result<(), StreamError> {
        Ok(())
    }

    fn end(&mut self, _data: Value) -> Result<(), StreamError> {
        Ok(())
    }

    fn error(&mut self, _error: ProgressError, _data: Option<Value>) -> Result<(), StreamError> {
        Ok(())
    }
}

/// Writes events as NDJSON, flushing after every line.
pub struct NdjsonProgress<W: Write> {
    writer: W,
    next_seq: u64,
}

impl<W: Write> NdjsonProgress<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            next_seq: 1,
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn emit(
        &mut self,
        event: ProgressKind,
        data: Option<Value>,
        error: Option<ProgressError>,
    ) -> Result<(), StreamError> {
        let event = ProgressEvent {
            event,
            seq: self.next_seq,
            ts: UtcDateTime::now(),
            data,
            error,
        };
        self.next_seq += 1;

        let line = serde_json::to_string(&event)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> ProgressSink for NdjsonProgress<W> {
    fn start(&mut self, data: Value) -> Result<(), StreamError> {
        self.emit(ProgressKind::Start, Some(data), None)
    }

    fn progress(&mut self, data: Value) -> Result<(), StreamError> {
        self.emit(ProgressKind::Progress, Some(data), None)
    }

    fn end(&mut self, data: Value) -> Result<(), StreamError> {
        self.emit(ProgressKind::End, Some(data), None)
    }

    fn error(&mut self, error: ProgressError, data: Option<Value>) -> Result<(), StreamError> {
        self.emit(ProgressKind::Error, data, Some(error))
    }
}

pub fn parse_progress_events(input: &str) -> Result<Vec<ProgressEvent>, serde_json::Error> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}
