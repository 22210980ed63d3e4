//! CLI argument definitions for wealthdesk.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Full advisory run for one client |
//! | `snapshot` | Aggregate market data only |
//! | `sources` | Provider capability and health matrix |
//! | `agents` | Stage descriptors in configured order |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | JSON run configuration |
//! | `--mock` | `false` | Offline providers and model |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--stream` | `false` | NDJSON progress events on stdout |
//! | `--timeout-secs` | config | Overall time budget |
//! | `--verbose` | `false` | Debug logging on stderr |
//!
//! # Examples
//!
//! ```bash
//! wealthdesk run --profile client.json --portfolio holdings.json --mock --pretty
//! wealthdesk snapshot AAPL MSFT --base-currency CAD
//! wealthdesk sources
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "wealthdesk",
    author,
    version,
    about = "Market data aggregation and advisory agent pipeline",
    long_about = "wealthdesk gathers quotes, price history, news and economic series from \
several providers with fallback, then runs a sequence of advisory agents over the \
snapshot and writes a JSON report.\n\
\n\
Provider keys are read from WEALTHDESK_<PROVIDER>_API_KEY. The model server is read \
from WEALTHDESK_OLLAMA_URL and WEALTHDESK_MODEL. Log level: WEALTHDESK_LOG."
)]
pub struct Cli {
    /// Run configuration file (JSON). Defaults apply to missing fields.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Serve deterministic offline data and use the offline model.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Emit NDJSON progress events (start, progress, end, error) on stdout.
    #[arg(long, global = true, default_value_t = false)]
    pub stream: bool,

    /// Overall time budget in seconds; overrides the configuration file.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Debug-level logging.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full advisory pipeline for one client.
    ///
    ///   wealthdesk run --profile client.json --portfolio holdings.json
    ///   wealthdesk run --profile client.json --portfolio holdings.json --output report.json
    Run(RunArgs),

    /// Aggregate market data for symbols and print the snapshot.
    ///
    ///   wealthdesk snapshot AAPL MSFT
    Snapshot(SnapshotArgs),

    /// List providers with capabilities and health.
    Sources,

    /// List agent stages in configured order.
    Agents,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Client profile (JSON).
    #[arg(long)]
    pub profile: PathBuf,

    /// Client portfolio (JSON).
    #[arg(long)]
    pub portfolio: PathBuf,

    /// Write the report to this file instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Symbols to analyse instead of the configured set or the holdings.
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,

    /// Client base currency; non-USD adds an FX rate to the snapshot.
    #[arg(long, default_value = "USD")]
    pub base_currency: String,
}
