//! Address sets produced by deployments and the records persisted for them.

use alloy_core::primitives::Address;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::TREXContracts;

/// The six implementation contracts registered in the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationSet {
    pub token_implementation: Address,
    pub claim_topics_registry_implementation: Address,
    pub trusted_issuers_registry_implementation: Address,
    pub identity_registry_storage_implementation: Address,
    pub identity_registry_implementation: Address,
    pub modular_compliance_implementation: Address,
}

impl From<ImplementationSet> for TREXContracts {
    fn from(set: ImplementationSet) -> Self {
        TREXContracts {
            tokenImplementation: set.token_implementation,
            ctrImplementation: set.claim_topics_registry_implementation,
            irImplementation: set.identity_registry_implementation,
            irsImplementation: set.identity_registry_storage_implementation,
            tirImplementation: set.trusted_issuers_registry_implementation,
            mcImplementation: set.modular_compliance_implementation,
        }
    }
}

/// A completed infrastructure deployment.
///
/// Only ever built once every step has confirmed, so every field is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureAddressSet {
    #[serde(flatten)]
    pub implementations: ImplementationSet,
    pub implementation_authority: Address,
    pub trex_factory: Address,
    pub trex_gateway: Address,
}

impl InfrastructureAddressSet {
    /// All nine addresses with a display label, in deployment order.
    pub fn labelled(&self) -> Vec<(&'static str, Address)> {
        let i = &self.implementations;
        vec![
            ("Token implementation", i.token_implementation),
            (
                "ClaimTopicsRegistry implementation",
                i.claim_topics_registry_implementation,
            ),
            (
                "TrustedIssuersRegistry implementation",
                i.trusted_issuers_registry_implementation,
            ),
            (
                "IdentityRegistryStorage implementation",
                i.identity_registry_storage_implementation,
            ),
            (
                "IdentityRegistry implementation",
                i.identity_registry_implementation,
            ),
            (
                "ModularCompliance implementation",
                i.modular_compliance_implementation,
            ),
            ("Implementation authority", self.implementation_authority),
            ("TREX factory", self.trex_factory),
            ("TREX gateway", self.trex_gateway),
        ]
    }
}

/// A completed deployment as stored by the cache, keyed by (operator, chain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    #[serde(flatten)]
    pub addresses: InfrastructureAddressSet,
    #[serde(rename = "userAddress")]
    pub operator: Address,
    pub chain_id: u64,
    #[serde(with = "iso8601")]
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Stamp a completed address set with the current time.
    pub fn new(addresses: InfrastructureAddressSet, operator: Address, chain_id: u64) -> Self {
        Self {
            addresses,
            operator,
            chain_id,
            deployed_at: now_millis_precision(),
        }
    }
}

/// Current time truncated to millisecond precision, the precision of the wire format.
fn now_millis_precision() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// `deployedAt` is written as `2024-01-01T00:00:00.000Z`.
mod iso8601 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Contracts created for one token by a single suite instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedSuite {
    pub token: Address,
    pub identity_registry: Address,
    pub identity_registry_storage: Address,
    pub compliance: Address,
    pub claim_topics_registry: Address,
    pub trusted_issuers_registry: Address,
    pub deployer: Address,
    /// Unix time in milliseconds.
    pub timestamp: u64,
}

impl DeployedSuite {
    pub fn labelled(&self) -> Vec<(&'static str, Address)> {
        vec![
            ("Token", self.token),
            ("IdentityRegistry", self.identity_registry),
            ("IdentityRegistryStorage", self.identity_registry_storage),
            ("ModularCompliance", self.compliance),
            ("ClaimTopicsRegistry", self.claim_topics_registry),
            ("TrustedIssuersRegistry", self.trusted_issuers_registry),
        ]
    }
}

#[cfg(test)]
pub(crate) fn sample_set() -> InfrastructureAddressSet {
    InfrastructureAddressSet {
        implementations: ImplementationSet {
            token_implementation: Address::repeat_byte(1),
            claim_topics_registry_implementation: Address::repeat_byte(2),
            trusted_issuers_registry_implementation: Address::repeat_byte(3),
            identity_registry_storage_implementation: Address::repeat_byte(4),
            identity_registry_implementation: Address::repeat_byte(5),
            modular_compliance_implementation: Address::repeat_byte(6),
        },
        implementation_authority: Address::repeat_byte(7),
        trex_factory: Address::repeat_byte(8),
        trex_gateway: Address::repeat_byte(9),
    }
}
