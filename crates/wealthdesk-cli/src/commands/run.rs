use std::sync::Arc;

use tracing::info;
use wealthdesk_agent::{
    JsonFileSink, LanguageModel, NdjsonProgress, NoProgress, OfflineModel, OllamaModel,
    Orchestrator, ProgressSink, ReportSink, RunConfig, WriterSink,
};
use wealthdesk_core::{ClientProfile, Portfolio, Symbol};

use super::{load_json, print_json, registry};
use crate::cli::{Cli, RunArgs};
use crate::error::CliError;

pub async fn run(cli: &Cli, args: &RunArgs, mut config: RunConfig) -> Result<(), CliError> {
    if let Some(seconds) = cli.timeout_secs {
        config.global_timeout_secs = seconds;
    }
    if !args.symbols.is_empty() {
        config.symbol_set = Symbol::parse_many(&args.symbols)?;
    }

    let profile: ClientProfile = load_json(&args.profile)?;
    let portfolio: Portfolio = load_json(&args.portfolio)?;

    let model: Arc<dyn LanguageModel> = if cli.mock {
        Arc::new(OfflineModel)
    } else {
        let model = OllamaModel::from_env();
        info!(url = model.base_url(), model = model.name(), "using ollama");
        Arc::new(model)
    };
    let orchestrator = Orchestrator::new(config, registry(cli.mock), model)?;

    // Streamed runs keep stdout one JSON document per line.
    let mut sink: Box<dyn ReportSink> = match &args.output {
        Some(path) => Box::new(JsonFileSink::new(path).with_pretty(cli.pretty)),
        None => Box::new(WriterSink::new(std::io::stdout(), cli.pretty && !cli.stream)),
    };
    let mut progress: Box<dyn ProgressSink> = if cli.stream {
        Box::new(NdjsonProgress::new(std::io::stdout()))
    } else {
        Box::new(NoProgress)
    };

    let outcome = orchestrator
        .run(profile, portfolio, sink.as_mut(), progress.as_mut())
        .await?;

    if let Some(path) = &args.output {
        info!(path = %path.display(), run_id = %outcome.report.run_id, "report written");
        if !cli.stream {
            print_json(&outcome.report.summary, cli.pretty)?;
        }
    }
    if let Some(error) = outcome.sink_error {
        return Err(error.into());
    }
    if let Some(error) = outcome.progress_error {
        return Err(error.into());
    }
    Ok(())
}
