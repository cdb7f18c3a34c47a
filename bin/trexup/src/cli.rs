use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use trexup_deploy::{CompliancePreset, DeployConfig, TREXUP_CONF_FILENAME, TokenConfiguration};

#[derive(Parser)]
#[command(name = "trexup")]
#[command(
    author,
    version,
    about = "Deploy T-REX security token infrastructure and token suites"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "TREXUP_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file.
    ///
    /// Values from the file are overridden by `TREXUP_*` environment variables, which are in
    /// turn overridden by the flags below.
    #[arg(long, alias = "conf", env = "TREXUP_CONFIG", default_value = TREXUP_CONF_FILENAME, global = true)]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags taking precedence over the configuration file and environment.
#[derive(Debug, Clone, Args)]
pub struct ConfigOverrides {
    /// The URL of the network's JSON-RPC endpoint.
    #[arg(long, alias = "rpc", global = true)]
    pub rpc_url: Option<String>,

    /// The account transactions are sent from. Defaults to the node's first account.
    #[arg(long, global = true)]
    pub operator: Option<Address>,

    /// Path to the Hardhat artifacts directory.
    #[arg(long, global = true)]
    pub artifacts_dir: Option<PathBuf>,

    /// Path to the deployment store directory.
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut DeployConfig) {
        if let Some(rpc_url) = &self.rpc_url {
            config.rpc_url = rpc_url.clone();
        }
        if let Some(operator) = self.operator {
            config.operator = Some(operator);
        }
        if let Some(dir) = &self.artifacts_dir {
            config.artifacts_dir = dir.clone();
        }
        if let Some(dir) = &self.store_dir {
            config.store_dir = dir.clone();
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Deploy the T-REX infrastructure for the operator on the connected network.
    ///
    /// A deployment already recorded for the operator and network is reused.
    Infra {
        /// Redeploy every contract even if a deployment is recorded.
        #[arg(long, env = "TREXUP_REDEPLOY", default_value_t = false)]
        redeploy: bool,

        /// Continue the last failed run instead of starting over.
        #[arg(long, conflicts_with = "redeploy")]
        resume: bool,
    },

    /// Deploy a token suite through the recorded infrastructure.
    Suite(SuiteArgs),

    /// Print the recorded infrastructure for the operator on the connected network.
    Show,

    /// List the compliance presets accepted by `suite --preset`.
    Presets,
}

#[derive(Debug, Clone, Args)]
pub struct SuiteArgs {
    /// Token name.
    #[arg(long)]
    pub name: Option<String>,

    /// Token symbol.
    #[arg(long)]
    pub symbol: Option<String>,

    /// Token decimals. Defaults to 18.
    #[arg(long)]
    pub decimals: Option<u8>,

    /// Required claim topics, comma separated (1 = KYC, 2 = AML, 3 = accreditation, 4 = investor type).
    #[arg(long, value_delimiter = ',')]
    pub claim_topics: Vec<u64>,

    /// A trusted issuer, optionally restricted to some topics: `ADDRESS[:T1,T2]`.
    #[arg(long = "issuer")]
    pub issuers: Vec<IssuerArg>,

    /// Start from a compliance preset.
    #[arg(long)]
    pub preset: Option<CompliancePreset>,

    /// Load the token configuration from a TOML or JSON file. Other flags override it.
    #[arg(long)]
    pub token_config: Option<PathBuf>,
}

impl SuiteArgs {
    pub fn into_configuration(self) -> Result<TokenConfiguration> {
        let mut config = match &self.token_config {
            Some(path) => TokenConfiguration::load_from_file(path)?,
            None => TokenConfiguration::new(
                self.name
                    .clone()
                    .context("--name is required without --token-config")?,
                self.symbol
                    .clone()
                    .context("--symbol is required without --token-config")?,
            ),
        };

        if let Some(preset) = self.preset {
            config = config.with_preset(preset);
        }
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(symbol) = self.symbol {
            config.symbol = symbol;
        }
        if let Some(decimals) = self.decimals {
            config.decimals = decimals;
        }
        if !self.claim_topics.is_empty() {
            config = config.with_claim_topics(self.claim_topics);
        }
        for issuer in self.issuers {
            config = config.with_issuer(issuer.address, issuer.topics);
        }

        Ok(config)
    }
}

/// `ADDRESS` or `ADDRESS:T1,T2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerArg {
    pub address: Address,
    pub topics: Option<BTreeSet<u64>>,
}

impl FromStr for IssuerArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, topics) = match s.split_once(':') {
            Some((address, topics)) => (address, Some(topics)),
            None => (s, None),
        };

        let address = address
            .trim()
            .parse()
            .map_err(|e| format!("invalid issuer address {address}: {e}"))?;

        let topics = topics
            .map(|topics| {
                topics
                    .split(',')
                    .map(|t| {
                        t.trim()
                            .parse::<u64>()
                            .map_err(|e| format!("invalid claim topic {t}: {e}"))
                    })
                    .collect::<Result<BTreeSet<_>, _>>()
            })
            .transpose()?;

        Ok(Self { address, topics })
    }
}
