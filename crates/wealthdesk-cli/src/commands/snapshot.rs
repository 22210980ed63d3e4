use serde_json::json;
use wealthdesk_agent::{NdjsonProgress, ProgressSink, RunConfig};
use wealthdesk_core::{
    AggregatorContext, ClientProfile, MarketDataAggregator, RiskTolerance, Symbol,
};

use super::{print_json, registry};
use crate::cli::{Cli, SnapshotArgs};
use crate::error::CliError;

pub async fn run(cli: &Cli, args: &SnapshotArgs, mut config: RunConfig) -> Result<(), CliError> {
    if let Some(seconds) = cli.timeout_secs {
        config.aggregation_timeout_secs = seconds;
    }
    config.validate()?;
    let symbols = Symbol::parse_many(&args.symbols)?;
    let profile = snapshot_profile(&args.base_currency);
    profile.validate()?;

    let context = AggregatorContext::new(registry(cli.mock))
        .with_calendar(config.calendar()?)
        .with_ttls(config.cache_ttl_by_kind);
    let aggregator = MarketDataAggregator::new(context, config.aggregator_config());

    if !cli.stream {
        let snapshot = aggregator.aggregate(&symbols, &profile).await?;
        return print_json(&snapshot, cli.pretty);
    }

    let mut progress = NdjsonProgress::new(std::io::stdout());
    progress.start(json!({ "symbols": symbols }))?;
    let snapshot = aggregator.aggregate(&symbols, &profile).await?;
    progress.progress(json!({
        "failed_symbols": snapshot.failed_symbols(),
        "timed_out": snapshot.timed_out,
    }))?;
    progress.end(serde_json::to_value(&snapshot)?)?;
    Ok(())
}

/// Market data needs only the base currency from a client.
fn snapshot_profile(base_currency: &str) -> ClientProfile {
    ClientProfile {
        client_id: String::from("snapshot"),
        name: String::from("snapshot"),
        age: 0,
        risk_tolerance: RiskTolerance::Moderate,
        time_horizon_years: 0,
        goals: Vec::new(),
        constraints: Vec::new(),
        annual_income: None,
        tax_bracket: None,
        province: None,
        retirement_age: None,
        base_currency: base_currency.trim().to_ascii_uppercase(),
    }
}
