use std::path::PathBuf;

use thiserror::Error;
use wealthdesk_agent::{ConfigurationError, OrchestratorError, ReportError, StreamError};
use wealthdesk_core::{AggregationError, ValidationError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("failed to read '{path}': {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in '{path}': {source}")]
    InvalidInput {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<OrchestratorError> for CliError {
    fn from(error: OrchestratorError) -> Self {
        match error {
            OrchestratorError::Configuration(error) => Self::Configuration(error),
            OrchestratorError::Aggregation(error) => Self::Aggregation(error),
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_)
            | Self::Configuration(_)
            | Self::Aggregation(_)
            | Self::Input { .. }
            | Self::InvalidInput { .. } => 2,
            Self::Serialization(_) | Self::Report(ReportError::Serialization(_)) => 4,
            Self::Stream(_) => 6,
            Self::Report(_) | Self::Io(_) => 10,
        }
    }
}
