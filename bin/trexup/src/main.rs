//! trexup is a CLI tool to deploy T-REX security token infrastructure and token suites.

mod cli;

use std::path::Path;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use strum::IntoEnumIterator;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use cli::{Cli, Command, ConfigOverrides, SuiteArgs};
use trexup_deploy::{
    CacheKey, CompliancePreset, DeployConfig, DeployedSuite, DeploymentCache, DeploymentRecord, FileStore,
    InfraDeployer, RpcRunner, StepEvent, StepStatus, TokenSuiteDeployer, TransactionRunner,
    explorer_url,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = load_config(&cli.config, &cli.overrides)?;

    match cli.command {
        Command::Init { force } => init(&cli.config, &config, force),
        Command::Infra { redeploy, resume } => {
            Session::open(config).await?.infra(redeploy, resume).await
        }
        Command::Suite(args) => Session::open(config).await?.suite(args).await,
        Command::Show => Session::open(config).await?.show().await,
        Command::Presets => {
            println!("{}", presets_table());
            Ok(())
        }
    }
}

/// Defaults, then the config file, then `TREXUP_*` variables, then flags.
fn load_config(path: &Path, overrides: &ConfigOverrides) -> Result<DeployConfig> {
    let mut config: DeployConfig = Figment::from(Serialized::defaults(DeployConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TREXUP_"))
        .extract()
        .context("Failed to load configuration")?;

    overrides.apply(&mut config);
    Ok(config)
}

fn init(path: &Path, config: &DeployConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    config.save_to_file(path)
}

/// A connection to the network plus the deployment cache.
struct Session {
    config: DeployConfig,
    runner: RpcRunner,
    cache: DeploymentCache<FileStore>,
    chain_id: u64,
}

impl Session {
    async fn open(config: DeployConfig) -> Result<Self> {
        let runner = config.connect().await?;
        let chain_id = runner
            .client()
            .chain_id()
            .await
            .context("Failed to read the network chain id")?;
        let cache = DeploymentCache::new(config.store());

        tracing::info!(
            operator = %runner.sender(),
            chain_id,
            store = %config.store_dir.display(),
            "Session ready"
        );

        Ok(Self {
            config,
            runner,
            cache,
            chain_id,
        })
    }

    fn operator(&self) -> Address {
        self.runner.sender()
    }

    async fn infra(&self, redeploy: bool, resume: bool) -> Result<()> {
        let operator = self.operator();

        if !redeploy && !resume {
            if let Some(record) = self.cache.get(operator, self.chain_id).await? {
                tracing::info!(
                    deployed_at = %record.deployed_at,
                    "Infrastructure already deployed, skipping deployment"
                );
                print_record(&record);
                return Ok(());
            }
        }

        let artifacts = self.config.artifacts();
        let checkpoint_file = self
            .config
            .store()
            .checkpoint_file(&CacheKey::new(operator, self.chain_id));

        let deployer = InfraDeployer::new(&self.runner, &artifacts)
            .with_progress(print_transition)
            .with_checkpoints(checkpoint_file.clone());

        let checkpoint = if resume {
            let checkpoint = checkpoint_file.load()?;
            if checkpoint.is_none() {
                tracing::warn!(
                    path = %checkpoint_file.path().display(),
                    "No checkpoint to resume from, starting from scratch"
                );
            }
            checkpoint
        } else {
            None
        };

        let result = match checkpoint {
            Some(checkpoint) => deployer.resume(checkpoint).await,
            None => deployer.run().await,
        };

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(
                    confirmed_steps = err.checkpoint.completed.len(),
                    checkpoint = %checkpoint_file.path().display(),
                    "Infrastructure deployment failed, rerun with --resume to continue"
                );
                return Err(err).context("Infrastructure deployment failed");
            }
        };

        let record = DeploymentRecord::new(report.addresses, operator, self.chain_id);
        self.cache.put(operator, self.chain_id, &record).await?;
        checkpoint_file.clear()?;

        tracing::info!(id_factory = %report.id_factory, "Identity factory bound to the TREX factory");
        print_record(&record);
        Ok(())
    }

    async fn suite(&self, args: SuiteArgs) -> Result<()> {
        let config = args.into_configuration()?;
        let operator = self.operator();

        let record = self
            .cache
            .get(operator, self.chain_id)
            .await?
            .with_context(|| {
                format!(
                    "No infrastructure deployed for {operator} on chain {}, run `trexup infra` first",
                    self.chain_id
                )
            })?;

        let suite = TokenSuiteDeployer::new(&self.runner, record.addresses)
            .deploy(&config)
            .await
            .context("Token suite deployment failed")?;

        print_suite(&suite, self.chain_id);
        println!("{}", serde_json::to_string_pretty(&suite)?);
        Ok(())
    }

    async fn show(&self) -> Result<()> {
        let operator = self.operator();
        match self.cache.get(operator, self.chain_id).await? {
            Some(record) => print_record(&record),
            None => println!(
                "No infrastructure deployed for {operator} on chain {}",
                self.chain_id
            ),
        }
        Ok(())
    }
}

fn print_transition(event: &StepEvent) {
    match (event.status, event.address) {
        (StepStatus::Complete, Some(address)) => {
            println!("[{}] {} at {address}", event.status, event.step)
        }
        (StepStatus::Error, _) => println!(
            "[{}] {}: {}",
            event.status,
            event.step,
            event.error.as_deref().unwrap_or("unknown error")
        ),
        _ => println!("[{}] {}", event.status, event.step),
    }
}

fn address_table(rows: Vec<(&'static str, Address)>, chain_id: u64) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Contract", "Address", "Explorer"]);

    for (label, address) in rows {
        table.add_row(vec![
            label.to_string(),
            address.to_string(),
            explorer_url(address, chain_id).unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table
}

fn presets_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Preset",
        "Claim topics",
        "Max investors",
        "Description",
    ]);

    for preset in CompliancePreset::iter() {
        let topics: Vec<_> = preset.claim_topics().iter().map(u64::to_string).collect();
        table.add_row(vec![
            preset.to_string(),
            topics.join(", "),
            preset.max_investors().to_string(),
            preset.description().to_string(),
        ]);
    }
    table
}

fn print_record(record: &DeploymentRecord) {
    println!("{}", address_table(record.addresses.labelled(), record.chain_id));
    println!(
        "Operator {} on chain {}, deployed at {}",
        record.operator, record.chain_id, record.deployed_at
    );
}

fn print_suite(suite: &DeployedSuite, chain_id: u64) {
    println!("{}", address_table(suite.labelled(), chain_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempdir::TempDir;

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new("trexup-cli").unwrap();
        let path = dir.path().join("Trexup.toml");
        std::fs::write(
            &path,
            "rpc_url = \"http://10.0.0.1:8545\"\nartifacts_dir = \"build/artifacts\"\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            rpc_url: None,
            operator: None,
            artifacts_dir: None,
            store_dir: Some(PathBuf::from("/var/lib/trexup")),
        };
        let config = load_config(&path, &overrides).unwrap();

        assert_eq!(config.rpc_url, "http://10.0.0.1:8545");
        assert_eq!(config.artifacts_dir, PathBuf::from("build/artifacts"));
        assert_eq!(config.store_dir, PathBuf::from("/var/lib/trexup"));
        assert_eq!(
            config.poll_interval_ms,
            DeployConfig::default().poll_interval_ms
        );
    }

    #[test]
    fn test_presets_table_lists_every_preset() {
        let table = presets_table();
        assert_eq!(table.row_iter().count(), CompliancePreset::iter().count());

        let rendered = table.to_string();
        assert!(rendered.contains("enhanced-due-diligence"));
        assert!(rendered.contains(CompliancePreset::Institutional.description()));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new("trexup-cli").unwrap();
        let path = dir.path().join("Trexup.toml");

        init(&path, &DeployConfig::default(), false).unwrap();
        assert!(init(&path, &DeployConfig::default(), false).is_err());
        init(&path, &DeployConfig::default(), true).unwrap();
    }
}
