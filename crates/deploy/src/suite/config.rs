//! Token configuration and the argument bundles built from it.

use std::collections::BTreeSet;
use std::path::Path;

use alloy_core::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::SuiteError;
use crate::contracts::{ClaimDetails, TokenDetails};

/// Well-known claim topics.
pub mod claim_topics {
    pub const KYC: u64 = 1;
    pub const AML: u64 = 2;
    pub const ACCREDITATION: u64 = 3;
    pub const INVESTOR_TYPE: u64 = 4;
}

pub const DEFAULT_DECIMALS: u8 = 18;
pub const DEFAULT_MAX_INVESTORS: u64 = 2000;

fn default_decimals() -> u8 {
    DEFAULT_DECIMALS
}

fn default_max_investors() -> u64 {
    DEFAULT_MAX_INVESTORS
}

/// Ready-made claim requirements and holder limits.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CompliancePreset {
    Standard,
    Accredited,
    EnhancedDueDiligence,
    Institutional,
}

impl CompliancePreset {
    pub fn claim_topics(&self) -> &'static [u64] {
        use claim_topics::*;
        match self {
            CompliancePreset::Standard => &[KYC],
            CompliancePreset::Accredited => &[KYC, ACCREDITATION],
            CompliancePreset::EnhancedDueDiligence => &[KYC, AML, INVESTOR_TYPE],
            CompliancePreset::Institutional => &[KYC, AML, ACCREDITATION],
        }
    }

    pub fn max_investors(&self) -> u64 {
        match self {
            CompliancePreset::Standard => 2000,
            CompliancePreset::Accredited => 500,
            CompliancePreset::EnhancedDueDiligence => 1000,
            CompliancePreset::Institutional => 200,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CompliancePreset::Standard => "Basic KYC requirement with 2000 investor limit",
            CompliancePreset::Accredited => {
                "For accredited/professional investors with KYC and accreditation verification"
            }
            CompliancePreset::EnhancedDueDiligence => {
                "Full compliance suite including KYC, AML, and investor type verification"
            }
            CompliancePreset::Institutional => {
                "For institutional investors with enhanced verification"
            }
        }
    }
}

/// Everything needed to instantiate one token suite.
///
/// Holder limits and countries are advisory and never sent on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfiguration {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    pub claim_topics: BTreeSet<u64>,
    #[serde(default)]
    pub trusted_issuers: Vec<Address>,
    /// Topics each trusted issuer may attest to, parallel to `trusted_issuers`.
    #[serde(default)]
    pub issuer_claim_topics: Vec<BTreeSet<u64>>,
    #[serde(default = "default_max_investors")]
    pub max_investors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_investor: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_countries: Vec<String>,
}

impl TokenConfiguration {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals: DEFAULT_DECIMALS,
            claim_topics: BTreeSet::new(),
            trusted_issuers: Vec::new(),
            issuer_claim_topics: Vec::new(),
            max_investors: DEFAULT_MAX_INVESTORS,
            max_tokens_per_investor: None,
            allowed_countries: Vec::new(),
        }
    }

    /// Replace claim topics and holder limit with those of `preset`.
    pub fn with_preset(mut self, preset: CompliancePreset) -> Self {
        self.claim_topics = preset.claim_topics().iter().copied().collect();
        self.max_investors = preset.max_investors();
        self
    }

    pub fn with_claim_topics(mut self, topics: impl IntoIterator<Item = u64>) -> Self {
        self.claim_topics = topics.into_iter().collect();
        self
    }

    /// Trust `issuer`, optionally restricted to `topics`.
    pub fn with_issuer(mut self, issuer: Address, topics: Option<BTreeSet<u64>>) -> Self {
        // Keep the per-issuer list aligned when an earlier issuer had no explicit topics.
        if let Some(topics) = topics {
            let index = self.trusted_issuers.len();
            if self.issuer_claim_topics.len() < index {
                self.issuer_claim_topics.resize(index, BTreeSet::new());
            }
            self.issuer_claim_topics.push(topics);
        }
        self.trusted_issuers.push(issuer);
        self
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read token configuration {}", path.display()))?;

        let config = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).context("Failed to parse token configuration JSON")?
        } else {
            toml::from_str(&content).context("Failed to parse token configuration TOML")?
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SuiteError> {
        let invalid = |reason: &str| Err(SuiteError::InvalidConfiguration(reason.to_string()));

        if self.name.trim().is_empty() {
            return invalid("token name must not be empty");
        }
        if self.symbol.trim().is_empty() {
            return invalid("token symbol must not be empty");
        }
        if self.claim_topics.is_empty() {
            return invalid("at least one claim topic is required");
        }
        if self.issuer_claim_topics.len() > self.trusted_issuers.len() {
            return invalid("more per-issuer claim topic sets than trusted issuers");
        }
        Ok(())
    }

    /// Topics the issuer at `index` may attest to.
    ///
    /// A missing or empty entry falls back to the required claim topics.
    pub fn authorized_topics(&self, index: usize) -> &BTreeSet<u64> {
        match self.issuer_claim_topics.get(index) {
            Some(topics) if !topics.is_empty() => topics,
            _ => &self.claim_topics,
        }
    }

    /// Token arguments with `owner` as owner and sole agent, and fresh identity storage.
    pub fn token_details(&self, owner: Address) -> TokenDetails {
        TokenDetails {
            owner,
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            irs: Address::ZERO,
            ONCHAINID: Address::ZERO,
            irAgents: vec![owner],
            tokenAgents: vec![owner],
            complianceModules: Vec::new(),
            complianceSettings: Vec::new(),
        }
    }

    pub fn claim_details(&self) -> ClaimDetails {
        ClaimDetails {
            claimTopics: to_words(&self.claim_topics),
            issuers: self.trusted_issuers.clone(),
            issuerClaims: (0..self.trusted_issuers.len())
                .map(|index| to_words(self.authorized_topics(index)))
                .collect(),
        }
    }
}

fn to_words(topics: &BTreeSet<u64>) -> Vec<U256> {
    topics.iter().map(|t| U256::from(*t)).collect()
}
