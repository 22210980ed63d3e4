use serde::Serialize;
use wealthdesk_core::SourceSnapshot;

use super::{print_json, registry};
use crate::cli::Cli;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct SourceRow {
    #[serde(flatten)]
    snapshot: SourceSnapshot,
    available: bool,
    status: &'static str,
    endpoints: Vec<&'static str>,
}

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    let sources = registry(cli.mock)
        .snapshots()
        .await
        .into_iter()
        .map(|snapshot| SourceRow {
            available: snapshot.available(),
            status: snapshot.status_label(),
            endpoints: snapshot.capabilities.supported_endpoints(),
            snapshot,
        })
        .collect::<Vec<_>>();

    print_json(&serde_json::json!({ "mock": cli.mock, "sources": sources }), cli.pretty)
}
