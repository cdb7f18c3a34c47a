//! trexup-deploy - Deployment library for T-REX (ERC-3643) security tokens.
//!
//! This crate deploys the shared T-REX infrastructure (implementations, implementation
//! authority, factories and gateway) onto an EVM network, caches the resulting addresses per
//! (operator, chain), and instantiates token suites through the deployed gateway.

pub mod addresses;
pub mod artifacts;
pub mod contracts;
pub mod explorer;
pub mod infra;
pub mod runner;
pub mod store;
pub mod suite;

mod config;
pub use config::{DEFAULT_RPC_URL, DeployConfig, TREXUP_CONF_FILENAME};

pub use addresses::{DeployedSuite, DeploymentRecord, ImplementationSet, InfrastructureAddressSet};
pub use artifacts::{Artifact, ArtifactError, ArtifactSource, HardhatArtifacts, InMemoryArtifacts};
pub use contracts::{ContractName, TREX_VERSION};
pub use explorer::{explorer_base, explorer_url};
pub use infra::{
    ChannelSink, Checkpoint, CheckpointSink, DeploymentStep, InfraDeployer, InfraError,
    InfraFailure, InfraReport, ProgressSink, StepEvent, StepName, StepStatus, progress_channel,
};
pub use runner::{
    JsonRpcClient, LogEntry, RpcError, RpcRunner, TransactionRunner, TxError, TxKind, TxOptions,
    TxReceipt, TxRequest,
};
pub use store::{
    CacheKey, CheckpointFile, DeploymentCache, DeploymentStore, FileStore, MemoryStore,
    StoreError, Versioned, WriteMode,
};
pub use suite::{
    CompliancePreset, FALLBACK_GAS_LIMIT, SuiteError, TokenConfiguration, TokenSuiteDeployer,
    claim_topics, gas_with_margin,
};
