mod agents;
mod run;
mod snapshot;
mod sources;

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use wealthdesk_agent::RunConfig;
use wealthdesk_core::{ProviderRegistry, ProviderRegistryBuilder};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    match &cli.command {
        Command::Run(args) => run::run(cli, args, config).await,
        Command::Snapshot(args) => snapshot::run(cli, args, config).await,
        Command::Sources => sources::run(cli).await,
        Command::Agents => agents::run(cli, &config),
    }
}

/// Offline adapters under `--mock`; otherwise live adapters for every provider with a key.
fn registry(mock: bool) -> Arc<ProviderRegistry> {
    let builder = if mock {
        ProviderRegistryBuilder::new().with_mock_mode()
    } else {
        ProviderRegistryBuilder::new().with_env_keys()
    };
    Arc::new(builder.build())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CliError::InvalidInput {
        path: path.to_path_buf(),
        source,
    })
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use wealthdesk_core::ClientProfile;

    use super::*;

    #[test]
    fn load_json_separates_missing_files_from_bad_content() {
        let missing = load_json::<ClientProfile>(Path::new("/nonexistent/profile.json"))
            .expect_err("missing");
        assert!(matches!(missing, CliError::Input { .. }));

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "{{ \"client_id\": 7 }}").expect("write");
        let invalid = load_json::<ClientProfile>(file.path()).expect_err("bad json");
        assert!(matches!(invalid, CliError::InvalidInput { .. }));
        assert_eq!(invalid.exit_code(), 2);
    }

    #[test]
    fn mock_registry_has_every_provider() {
        assert_eq!(registry(true).len(), wealthdesk_core::ProviderId::ALL.len());
    }
}
