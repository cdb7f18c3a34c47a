use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    artifacts::HardhatArtifacts,
    runner::{
        DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_SUBMISSION_TIMEOUT,
        JsonRpcClient, RpcRunner,
    },
    store::FileStore,
};

/// The default name for the trexup configuration file.
pub const TREXUP_CONF_FILENAME: &str = "Trexup.toml";

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Where and how to deploy.
///
/// Serialized to and from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// JSON-RPC endpoint of the target network.
    pub rpc_url: String,
    /// Sending account. Defaults to the node's first account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Address>,
    /// Hardhat `artifacts/` directory holding the compiled contracts.
    pub artifacts_dir: PathBuf,
    /// Directory of the deployment cache.
    pub store_dir: PathBuf,
    /// How long to wait for a transaction to be included.
    pub confirmation_timeout_secs: u64,
    /// Delay between receipt polls.
    pub poll_interval_ms: u64,
    /// How long the node or wallet may take to accept a transaction, approval included.
    #[serde(default = "default_submission_timeout_secs")]
    pub submission_timeout_secs: u64,
}

fn default_submission_timeout_secs() -> u64 {
    DEFAULT_SUBMISSION_TIMEOUT.as_secs()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            operator: None,
            artifacts_dir: PathBuf::from("artifacts"),
            store_dir: FileStore::default_dir(),
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT.as_secs(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            submission_timeout_secs: default_submission_timeout_secs(),
        }
    }
}

impl DeployConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deploy config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from `Trexup.toml` inside a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(TREXUP_CONF_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn artifacts(&self) -> HardhatArtifacts {
        HardhatArtifacts::new(&self.artifacts_dir)
    }

    pub fn store(&self) -> FileStore {
        FileStore::new(&self.store_dir)
    }

    /// Connect to the node and resolve the sending account.
    pub async fn connect(&self) -> Result<RpcRunner> {
        let url = Url::parse(&self.rpc_url)
            .context(format!("Invalid RPC URL: {}", self.rpc_url))?;
        let client = JsonRpcClient::new(url)?;
        let runner = RpcRunner::connect(client, self.operator)
            .await?
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
            .confirmation_timeout(Duration::from_secs(self.confirmation_timeout_secs))
            .submission_timeout(Duration::from_secs(self.submission_timeout_secs));
        Ok(runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_config_file_round_trip() {
        let dir = TempDir::new("trexup-config").unwrap();
        let config = DeployConfig {
            operator: Some(Address::repeat_byte(0xaa)),
            store_dir: dir.path().join("store"),
            ..Default::default()
        };

        config
            .save_to_file(&dir.path().join(TREXUP_CONF_FILENAME))
            .unwrap();

        // Loading a directory picks up the default file name.
        let loaded = DeployConfig::load_from_file(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let dir = TempDir::new("trexup-config").unwrap();
        let err = DeployConfig::load_from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"), "{err}");
    }

    #[test]
    fn test_operator_is_optional() {
        let content = toml::to_string_pretty(&DeployConfig::default()).unwrap();
        assert!(!content.contains("operator"));

        let parsed: DeployConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.operator, None);
        assert_eq!(parsed.rpc_url, DEFAULT_RPC_URL);
    }

    #[test]
    fn test_submission_timeout_defaults_when_absent() {
        let parsed: DeployConfig = toml::from_str(
            r#"
            rpc_url = "http://127.0.0.1:8545"
            artifacts_dir = "artifacts"
            store_dir = ".trexup"
            confirmation_timeout_secs = 60
            poll_interval_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.submission_timeout_secs,
            DEFAULT_SUBMISSION_TIMEOUT.as_secs()
        );
        assert!(parsed.submission_timeout_secs > parsed.confirmation_timeout_secs);
    }
}
