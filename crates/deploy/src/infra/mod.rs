//! Infrastructure deployment: implementations, authority, factories and gateway.
//!
//! The deployment is a fixed sequence of steps (see [`StepName`]) where each step is one
//! transaction parameterized by the results of earlier ones. The sequence stops at the first
//! failure; nothing already deployed is rolled back.
//!
//! Every transition is reported to an optional [`ProgressSink`] as an immutable
//! [`StepEvent`]. Confirmed results accumulate in a [`Checkpoint`], which can be persisted
//! after each step through a [`CheckpointSink`] and handed back to
//! [`InfraDeployer::resume`] to continue a failed run instead of starting over.

mod checkpoint;
mod progress;
mod steps;

use std::collections::HashMap;

use alloy_core::{
    primitives::Address,
    sol_types::{SolCall, SolConstructor},
};
use strum::IntoEnumIterator;

pub use checkpoint::Checkpoint;
pub use progress::{ChannelSink, ProgressSink, progress_channel};
pub use steps::{DeploymentStep, StepEvent, StepLog, StepName, StepStatus, validate_order};

use crate::{
    addresses::InfrastructureAddressSet,
    artifacts::{Artifact, ArtifactError, ArtifactSource},
    contracts::{
        ContractName, IdFactory, TREX_VERSION, TREXFactory, TREXGateway,
        TREXImplementationAuthority, Version,
    },
    runner::{TransactionRunner, TxError, TxOptions, TxReceipt, TxRequest},
};

/// Persists checkpoints as steps confirm.
pub trait CheckpointSink: Send + Sync {
    fn record(&self, checkpoint: &Checkpoint) -> anyhow::Result<()>;
}

impl<F> CheckpointSink for F
where
    F: Fn(&Checkpoint) -> anyhow::Result<()> + Send + Sync,
{
    fn record(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        self(checkpoint)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InfraFailure {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("{step} failed: {source}")]
    Step {
        step: StepName,
        #[source]
        source: TxError,
    },

    #[error("{step} confirmed without reporting a contract address")]
    MissingAddress { step: StepName },

    #[error("{step} cannot run before {dependency} has completed")]
    MissingDependency {
        step: StepName,
        dependency: StepName,
    },

    #[error("checkpoint belongs to operator {found}, not {expected}")]
    CheckpointMismatch { expected: Address, found: Address },
}

impl InfraFailure {
    /// The underlying transaction failure, if a transaction failed.
    pub fn tx_error(&self) -> Option<&TxError> {
        match self {
            InfraFailure::Step { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A failed run: what went wrong, the final step states, and what had already confirmed.
#[derive(Debug, thiserror::Error)]
#[error("{failure}")]
pub struct InfraError {
    pub failure: InfraFailure,
    pub steps: Vec<DeploymentStep>,
    pub checkpoint: Checkpoint,
}

/// A successful run.
#[derive(Debug, Clone)]
pub struct InfraReport {
    pub addresses: InfrastructureAddressSet,
    /// Identity factory bound into the suite factory.
    pub id_factory: Address,
    pub steps: Vec<DeploymentStep>,
}

/// Mutable state owned by a single run.
struct Run {
    log: StepLog,
    checkpoint: Checkpoint,
}

/// Drives the infrastructure deployment through a [`TransactionRunner`].
pub struct InfraDeployer<'a, R, A> {
    runner: &'a R,
    artifacts: &'a A,
    progress: Option<Box<dyn ProgressSink + 'a>>,
    checkpoints: Option<Box<dyn CheckpointSink + 'a>>,
}

impl<'a, R, A> InfraDeployer<'a, R, A>
where
    R: TransactionRunner,
    A: ArtifactSource,
{
    pub fn new(runner: &'a R, artifacts: &'a A) -> Self {
        Self {
            runner,
            artifacts,
            progress: None,
            checkpoints: None,
        }
    }

    /// Report every step transition to `sink`.
    pub fn with_progress(mut self, sink: impl ProgressSink + 'a) -> Self {
        self.progress = Some(Box::new(sink));
        self
    }

    /// Persist the checkpoint after every confirmed step.
    pub fn with_checkpoints(mut self, sink: impl CheckpointSink + 'a) -> Self {
        self.checkpoints = Some(Box::new(sink));
        self
    }

    /// Deploy the whole infrastructure from scratch.
    pub async fn run(&self) -> Result<InfraReport, InfraError> {
        tracing::info!(operator = %self.runner.sender(), "Starting infrastructure deployment...");
        self.execute(Checkpoint::new(self.runner.sender())).await
    }

    /// Continue a previous run, skipping every step its checkpoint records as confirmed.
    pub async fn resume(&self, checkpoint: Checkpoint) -> Result<InfraReport, InfraError> {
        let operator = self.runner.sender();
        if checkpoint.operator != operator {
            return Err(InfraError {
                failure: InfraFailure::CheckpointMismatch {
                    expected: operator,
                    found: checkpoint.operator,
                },
                steps: StepLog::new().into_inner(),
                checkpoint,
            });
        }

        tracing::info!(
            operator = %operator,
            confirmed_steps = checkpoint.completed.len(),
            "Resuming infrastructure deployment..."
        );
        self.execute(checkpoint).await
    }

    async fn execute(&self, checkpoint: Checkpoint) -> Result<InfraReport, InfraError> {
        let mut run = Run {
            log: StepLog::new(),
            checkpoint,
        };

        // Artifacts are always reloaded: later constructions need their bytecode.
        self.transition(&mut run.log, StepEvent::in_progress(StepName::LoadArtifacts));
        let artifacts = match self.load_artifacts() {
            Ok(artifacts) => artifacts,
            Err(err) => return Err(self.fail(run, StepName::LoadArtifacts, err.into())),
        };
        self.transition(&mut run.log, StepEvent::complete(StepName::LoadArtifacts, None));

        for step in StepName::iter().filter(|s| *s != StepName::LoadArtifacts) {
            if run.checkpoint.is_complete(step) {
                let address = run.checkpoint.address(step);
                tracing::info!(step = %step, address = ?address, "Already confirmed, skipping");
                self.transition(&mut run.log, StepEvent::complete(step, address));
                continue;
            }

            if let Some(dependency) = run.log.unmet_dependency(step) {
                let failure = InfraFailure::MissingDependency { step, dependency };
                return Err(self.fail(run, step, failure));
            }

            self.transition(&mut run.log, StepEvent::in_progress(step));

            match self.execute_step(step, &artifacts, &run.checkpoint).await {
                Ok(address) => {
                    run.checkpoint.record(step, address);
                    self.persist(&run.checkpoint);
                    self.transition(&mut run.log, StepEvent::complete(step, address));
                }
                Err(failure) => return Err(self.fail(run, step, failure)),
            }
        }

        let (Some(addresses), Some(id_factory)) = (
            run.checkpoint.finished(),
            run.checkpoint.address(StepName::IdFactory),
        ) else {
            let failure = InfraFailure::MissingDependency {
                step: StepName::EnablePublicDeployment,
                dependency: StepName::Gateway,
            };
            return Err(self.fail(run, StepName::EnablePublicDeployment, failure));
        };

        tracing::info!(
            gateway = %addresses.trex_gateway,
            factory = %addresses.trex_factory,
            authority = %addresses.implementation_authority,
            "Infrastructure deployment complete"
        );

        Ok(InfraReport {
            addresses,
            id_factory,
            steps: run.log.into_inner(),
        })
    }

    fn load_artifacts(&self) -> Result<HashMap<ContractName, Artifact>, ArtifactError> {
        ContractName::iter()
            .map(|name| {
                let artifact = self.artifacts.artifact(name)?;
                artifact.validate(name)?;
                Ok((name, artifact))
            })
            .collect()
    }

    async fn execute_step(
        &self,
        step: StepName,
        artifacts: &HashMap<ContractName, Artifact>,
        done: &Checkpoint,
    ) -> Result<Option<Address>, InfraFailure> {
        if let Some(name) = step.constructs() {
            let artifact = artifacts.get(&name).ok_or(ArtifactError::NotFound(name))?;
            let args = self.constructor_args(step, done)?;
            let request = TxRequest::create(name.artifact_name(), artifact.init_code(&args));

            let receipt = self.submit(step, request).await?;
            return receipt
                .contract_address
                .map(Some)
                .ok_or(InfraFailure::MissingAddress { step });
        }

        if let Some((to, calldata)) = self.configuration_call(step, done)? {
            self.submit(step, TxRequest::call(step.to_string(), to, calldata))
                .await?;
        }
        Ok(None)
    }

    /// ABI-encoded constructor arguments for a construction step.
    fn constructor_args(&self, step: StepName, done: &Checkpoint) -> Result<Vec<u8>, InfraFailure> {
        let require = |dependency| address_of(done, step, dependency);

        Ok(match step {
            StepName::ImplementationAuthority => TREXImplementationAuthority::constructorCall {
                referenceStatus: true,
                trexFactory: Address::ZERO,
                iaFactory: Address::ZERO,
            }
            .abi_encode(),
            StepName::IdFactory => IdFactory::constructorCall {
                implementationAuthority: require(StepName::ImplementationAuthority)?,
            }
            .abi_encode(),
            StepName::TrexFactory => TREXFactory::constructorCall {
                implementationAuthority_: require(StepName::ImplementationAuthority)?,
                idFactory_: require(StepName::IdFactory)?,
            }
            .abi_encode(),
            StepName::Gateway => TREXGateway::constructorCall {
                factory: require(StepName::TrexFactory)?,
                owner: self.runner.sender(),
            }
            .abi_encode(),
            // Implementation contracts take no constructor arguments.
            _ => Vec::new(),
        })
    }

    /// Target and calldata for a configuration step.
    fn configuration_call(
        &self,
        step: StepName,
        done: &Checkpoint,
    ) -> Result<Option<(Address, Vec<u8>)>, InfraFailure> {
        let require = |dependency| address_of(done, step, dependency);

        let call = match step {
            StepName::RegisterVersion => {
                let implementations =
                    done.implementations()
                        .ok_or(InfraFailure::MissingDependency {
                            step,
                            dependency: StepName::Token,
                        })?;
                let (major, minor, patch) = TREX_VERSION;
                let call = TREXImplementationAuthority::addAndUseTREXVersionCall {
                    _version: Version {
                        major,
                        minor,
                        patch,
                    },
                    _trex: implementations.into(),
                };
                (require(StepName::ImplementationAuthority)?, call.abi_encode())
            }
            StepName::BindFactory => {
                let call = TREXImplementationAuthority::setTREXFactoryCall {
                    trexFactory: require(StepName::TrexFactory)?,
                };
                (require(StepName::ImplementationAuthority)?, call.abi_encode())
            }
            StepName::TransferOwnership => {
                let call = TREXFactory::transferOwnershipCall {
                    newOwner: require(StepName::Gateway)?,
                };
                (require(StepName::TrexFactory)?, call.abi_encode())
            }
            StepName::EnablePublicDeployment => {
                let call = TREXGateway::setPublicDeploymentStatusCall { _isEnabled: true };
                (require(StepName::Gateway)?, call.abi_encode())
            }
            _ => return Ok(None),
        };
        Ok(Some(call))
    }

    async fn submit(
        &self,
        step: StepName,
        request: TxRequest,
    ) -> Result<TxReceipt, InfraFailure> {
        self.runner
            .submit_and_confirm(request, TxOptions::default())
            .await
            .map_err(|source| InfraFailure::Step { step, source })
    }

    fn transition(&self, log: &mut StepLog, event: StepEvent) {
        match event.status {
            StepStatus::InProgress => tracing::info!(step = %event.step, "Running step..."),
            StepStatus::Complete => {
                tracing::info!(step = %event.step, address = ?event.address, "Step complete")
            }
            StepStatus::Error => {
                tracing::error!(step = %event.step, error = ?event.error, "Step failed")
            }
            StepStatus::Pending => {}
        }

        log.apply(&event);
        progress::notify(self.progress.as_deref(), &event);
    }

    fn persist(&self, checkpoint: &Checkpoint) {
        if let Some(sink) = &self.checkpoints {
            if let Err(err) = sink.record(checkpoint) {
                tracing::warn!(error = %err, "Failed to persist checkpoint, continuing");
            }
        }
    }

    fn fail(&self, mut run: Run, step: StepName, failure: InfraFailure) -> InfraError {
        self.transition(&mut run.log, StepEvent::error(step, failure.to_string()));

        InfraError {
            failure,
            steps: run.log.into_inner(),
            checkpoint: run.checkpoint,
        }
    }
}

/// Address produced by an earlier step that `step` needs.
fn address_of(done: &Checkpoint, step: StepName, dependency: StepName) -> Result<Address, InfraFailure> {
    done.address(dependency)
        .ok_or(InfraFailure::MissingDependency { step, dependency })
}
