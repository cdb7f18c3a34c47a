//! Per-step results of a run, recorded as each step confirms.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use super::steps::StepName;
use crate::addresses::{ImplementationSet, InfrastructureAddressSet};

/// Results of the steps a run has confirmed so far.
///
/// A step maps to the address it produced, or to `None` for configuration calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub operator: Address,
    pub completed: BTreeMap<StepName, Option<Address>>,
}

impl Checkpoint {
    pub fn new(operator: Address) -> Self {
        Self {
            operator,
            completed: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, step: StepName, address: Option<Address>) {
        self.completed.insert(step, address);
    }

    pub fn is_complete(&self, step: StepName) -> bool {
        self.completed.contains_key(&step)
    }

    /// Address produced by a completed construction step.
    pub fn address(&self, step: StepName) -> Option<Address> {
        self.completed.get(&step).copied().flatten()
    }

    pub fn implementations(&self) -> Option<ImplementationSet> {
        Some(ImplementationSet {
            token_implementation: self.address(StepName::Token)?,
            claim_topics_registry_implementation: self.address(StepName::ClaimTopicsRegistry)?,
            trusted_issuers_registry_implementation: self
                .address(StepName::TrustedIssuersRegistry)?,
            identity_registry_storage_implementation: self
                .address(StepName::IdentityRegistryStorage)?,
            identity_registry_implementation: self.address(StepName::IdentityRegistry)?,
            modular_compliance_implementation: self.address(StepName::ModularCompliance)?,
        })
    }

    /// The full address set, only once every step after artifact loading has confirmed.
    pub fn finished(&self) -> Option<InfrastructureAddressSet> {
        let all_confirmed = StepName::iter()
            .filter(|step| *step != StepName::LoadArtifacts)
            .all(|step| self.is_complete(step));
        if !all_confirmed {
            return None;
        }

        Some(InfrastructureAddressSet {
            implementations: self.implementations()?,
            implementation_authority: self.address(StepName::ImplementationAuthority)?,
            trex_factory: self.address(StepName::TrexFactory)?,
            trex_gateway: self.address(StepName::Gateway)?,
        })
    }
}
