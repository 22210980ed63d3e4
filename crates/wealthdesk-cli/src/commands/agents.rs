use serde::Serialize;
use wealthdesk_agent::{AgentDescriptor, RunConfig};

use super::print_json;
use crate::cli::Cli;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StageRow<'a> {
    position: usize,
    #[serde(flatten)]
    descriptor: &'a AgentDescriptor,
    synthesis: bool,
}

pub fn run(cli: &Cli, config: &RunConfig) -> Result<(), CliError> {
    let plan = config.stage_plan()?;
    let stages = plan
        .analysis
        .iter()
        .map(|descriptor| (descriptor, false))
        .chain(std::iter::once((&plan.synthesis, true)))
        .enumerate()
        .map(|(position, (descriptor, synthesis))| StageRow {
            position,
            descriptor,
            synthesis,
        })
        .collect::<Vec<_>>();

    print_json(&serde_json::json!({ "stages": stages }), cli.pretty)
}
