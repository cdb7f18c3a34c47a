//! Deployment steps, their dependency edges, and the per-run step log.

use alloy_core::primitives::Address;
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::contracts::ContractName;

/// Every step of the infrastructure deployment, in execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    #[strum(to_string = "Loading artifacts")]
    LoadArtifacts,
    Token,
    ClaimTopicsRegistry,
    TrustedIssuersRegistry,
    IdentityRegistryStorage,
    IdentityRegistry,
    ModularCompliance,
    #[strum(to_string = "TREXImplementationAuthority")]
    ImplementationAuthority,
    #[strum(to_string = "Adding TREX version")]
    RegisterVersion,
    IdFactory,
    #[strum(to_string = "TREXFactory")]
    TrexFactory,
    #[strum(to_string = "Setting TREX Factory")]
    BindFactory,
    #[strum(to_string = "TREXGateway")]
    Gateway,
    #[strum(to_string = "Transferring ownership")]
    TransferOwnership,
    #[strum(to_string = "Configuring gateway")]
    EnablePublicDeployment,
}

const IMPLEMENTATION_STEPS: [StepName; 6] = [
    StepName::Token,
    StepName::ClaimTopicsRegistry,
    StepName::TrustedIssuersRegistry,
    StepName::IdentityRegistryStorage,
    StepName::IdentityRegistry,
    StepName::ModularCompliance,
];

impl StepName {
    /// Steps whose results this step consumes.
    pub fn depends_on(&self) -> &'static [StepName] {
        use StepName::*;
        match self {
            LoadArtifacts => &[],
            Token
            | ClaimTopicsRegistry
            | TrustedIssuersRegistry
            | IdentityRegistryStorage
            | IdentityRegistry
            | ModularCompliance
            | ImplementationAuthority => &[LoadArtifacts],
            RegisterVersion => &[
                ImplementationAuthority,
                Token,
                ClaimTopicsRegistry,
                TrustedIssuersRegistry,
                IdentityRegistryStorage,
                IdentityRegistry,
                ModularCompliance,
            ],
            IdFactory => &[ImplementationAuthority],
            TrexFactory => &[ImplementationAuthority, IdFactory],
            BindFactory => &[ImplementationAuthority, TrexFactory],
            Gateway => &[TrexFactory],
            TransferOwnership => &[TrexFactory, Gateway],
            EnablePublicDeployment => &[Gateway],
        }
    }

    /// The contract this step constructs, if it is a construction step.
    pub fn constructs(&self) -> Option<ContractName> {
        match self {
            StepName::Token => Some(ContractName::Token),
            StepName::ClaimTopicsRegistry => Some(ContractName::ClaimTopicsRegistry),
            StepName::TrustedIssuersRegistry => Some(ContractName::TrustedIssuersRegistry),
            StepName::IdentityRegistryStorage => Some(ContractName::IdentityRegistryStorage),
            StepName::IdentityRegistry => Some(ContractName::IdentityRegistry),
            StepName::ModularCompliance => Some(ContractName::ModularCompliance),
            StepName::ImplementationAuthority => Some(ContractName::ImplementationAuthority),
            StepName::IdFactory => Some(ContractName::IdFactory),
            StepName::TrexFactory => Some(ContractName::TrexFactory),
            StepName::Gateway => Some(ContractName::TrexGateway),
            _ => None,
        }
    }

    pub fn is_implementation(&self) -> bool {
        IMPLEMENTATION_STEPS.contains(self)
    }

    pub fn implementations() -> [StepName; 6] {
        IMPLEMENTATION_STEPS
    }
}

/// Check that the execution order respects every dependency edge.
///
/// Returns the first step found scheduled before one of its dependencies.
pub fn validate_order(order: &[StepName]) -> Result<(), (StepName, StepName)> {
    for (position, step) in order.iter().enumerate() {
        for dependency in step.depends_on() {
            match order.iter().position(|s| s == dependency) {
                Some(dep_position) if dep_position < position => {}
                _ => return Err((*step, *dependency)),
            }
        }
    }
    Ok(())
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Complete,
    Error,
}

/// Current state of one step within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStep {
    pub name: StepName,
    pub status: StepStatus,
    pub address: Option<Address>,
    pub error: Option<String>,
}

/// An immutable step transition, as delivered to progress observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub step: StepName,
    pub status: StepStatus,
    pub address: Option<Address>,
    pub error: Option<String>,
}

impl StepEvent {
    pub fn in_progress(step: StepName) -> Self {
        Self {
            step,
            status: StepStatus::InProgress,
            address: None,
            error: None,
        }
    }

    pub fn complete(step: StepName, address: Option<Address>) -> Self {
        Self {
            step,
            status: StepStatus::Complete,
            address,
            error: None,
        }
    }

    pub fn error(step: StepName, error: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Error,
            address: None,
            error: Some(error.into()),
        }
    }
}

/// Step states of a single run, owned by that run.
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct StepLog(Vec<DeploymentStep>);

impl StepLog {
    /// Every step, pending.
    pub fn new() -> Self {
        Self(
            StepName::iter()
                .map(|name| DeploymentStep {
                    name,
                    status: StepStatus::Pending,
                    address: None,
                    error: None,
                })
                .collect(),
        )
    }

    pub fn apply(&mut self, event: &StepEvent) {
        if let Some(step) = self.0.iter_mut().find(|s| s.name == event.step) {
            step.status = event.status;
            step.address = event.address;
            step.error = event.error.clone();
        }
    }

    pub fn status(&self, name: StepName) -> Option<StepStatus> {
        self.0.iter().find(|s| s.name == name).map(|s| s.status)
    }

    /// First dependency of `name` that has not completed in this run.
    pub fn unmet_dependency(&self, name: StepName) -> Option<StepName> {
        name.depends_on()
            .iter()
            .copied()
            .find(|dep| self.status(*dep) != Some(StepStatus::Complete))
    }

    pub fn into_inner(self) -> Vec<DeploymentStep> {
        self.0
    }
}

impl Default for StepLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_order_respects_dependencies() {
        let order: Vec<_> = StepName::iter().collect();
        assert_eq!(validate_order(&order), Ok(()));
        assert_eq!(order.len(), 15);
    }

    #[test]
    fn test_out_of_order_plan_is_rejected() {
        let order = [
            StepName::LoadArtifacts,
            StepName::TrexFactory,
            StepName::ImplementationAuthority,
            StepName::IdFactory,
        ];
        assert_eq!(
            validate_order(&order),
            Err((StepName::TrexFactory, StepName::ImplementationAuthority))
        );
    }

    #[test]
    fn test_implementation_steps_are_independent_of_each_other() {
        for step in StepName::implementations() {
            assert!(
                step.depends_on()
                    .iter()
                    .all(|dep| !dep.is_implementation()),
                "{step} should not depend on another implementation"
            );
        }
    }

    #[test]
    fn test_step_labels() {
        assert_eq!(StepName::RegisterVersion.to_string(), "Adding TREX version");
        assert_eq!(StepName::Gateway.to_string(), "TREXGateway");
        assert_eq!(StepStatus::InProgress.to_string(), "in-progress");
    }

    #[test]
    fn test_log_applies_events() {
        let mut log = StepLog::new();
        assert!(log.iter().all(|s| s.status == StepStatus::Pending));

        log.apply(&StepEvent::complete(StepName::LoadArtifacts, None));
        assert_eq!(log.unmet_dependency(StepName::Token), None);
        assert_eq!(
            log.unmet_dependency(StepName::RegisterVersion),
            Some(StepName::ImplementationAuthority)
        );

        log.apply(&StepEvent::error(StepName::Token, "boom"));
        let token = log.iter().find(|s| s.name == StepName::Token).unwrap();
        assert_eq!(token.status, StepStatus::Error);
        assert_eq!(token.error.as_deref(), Some("boom"));
    }
}
