//! Instantiating a configured token suite through a deployed gateway.

mod config;

use alloy_core::{
    primitives::{Address, Bytes},
    sol_types::{SolCall, SolEvent},
};

pub use config::{
    CompliancePreset, DEFAULT_DECIMALS, DEFAULT_MAX_INVESTORS, TokenConfiguration, claim_topics,
};

use crate::{
    addresses::{DeployedSuite, InfrastructureAddressSet},
    contracts::{TREXFactory, TREXGateway},
    runner::{LogEntry, TransactionRunner, TxError, TxOptions, TxRequest},
};

/// Gas limit used when estimation fails.
pub const FALLBACK_GAS_LIMIT: u64 = 8_000_000;

/// Estimated gas plus a 20% margin, never below the estimate.
pub fn gas_with_margin(estimate: u64) -> u64 {
    estimate.saturating_add(estimate / 5)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuiteError {
    #[error("You are not authorized to deploy tokens.")]
    NotAuthorized,

    #[error("Insufficient funds for deployment. Please add more funds to your wallet.")]
    InsufficientFunds,

    #[error("Transaction was rejected by user.")]
    SubmissionRejected,

    #[error("TREXSuiteDeployed event not found in the transaction logs")]
    SuiteEventMissing,

    #[error("Invalid token configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),
}

impl From<TxError> for SuiteError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::InsufficientFunds => SuiteError::InsufficientFunds,
            TxError::SubmissionRejected => SuiteError::SubmissionRejected,
            other => SuiteError::DeploymentFailed(other.to_string()),
        }
    }
}

/// Deploys token suites through one infrastructure's gateway.
pub struct TokenSuiteDeployer<'a, R> {
    runner: &'a R,
    infrastructure: InfrastructureAddressSet,
}

impl<'a, R: TransactionRunner> TokenSuiteDeployer<'a, R> {
    pub fn new(runner: &'a R, infrastructure: InfrastructureAddressSet) -> Self {
        Self {
            runner,
            infrastructure,
        }
    }

    /// Instantiate one suite and return the addresses its factory reported.
    pub async fn deploy(&self, config: &TokenConfiguration) -> Result<DeployedSuite, SuiteError> {
        config.validate()?;

        let caller = self.runner.sender();
        let gateway = self.infrastructure.trex_gateway;
        tracing::info!(
            name = %config.name,
            symbol = %config.symbol,
            gateway = %gateway,
            "Deploying token suite..."
        );

        self.authorize(caller).await?;

        let call = TREXGateway::deployTREXSuiteCall {
            _tokenDetails: config.token_details(caller),
            _claimDetails: config.claim_details(),
        };
        let request = TxRequest::call("deployTREXSuite", gateway, call.abi_encode());
        let gas_limit = self.gas_limit(&request).await;

        let receipt = self
            .runner
            .submit_and_confirm(request, TxOptions::with_gas_limit(gas_limit))
            .await?;

        let Some(event) = find_suite_event(&receipt.logs) else {
            tracing::error!(tx_hash = %receipt.tx_hash, logs = receipt.logs.len(), "No TREXSuiteDeployed event");
            return Err(SuiteError::SuiteEventMissing);
        };

        let suite = DeployedSuite {
            token: event._token,
            identity_registry: event._ir,
            identity_registry_storage: event._irs,
            compliance: event._mc,
            claim_topics_registry: event._ctr,
            trusted_issuers_registry: event._tir,
            deployer: caller,
            timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
        };

        tracing::info!(token = %suite.token, tx_hash = %receipt.tx_hash, "Token suite deployed");
        Ok(suite)
    }

    /// Public deployment must be enabled, or `caller` must be an allow-listed deployer.
    async fn authorize(&self, caller: Address) -> Result<(), SuiteError> {
        let (public, deployer) = futures::try_join!(
            self.view(TREXGateway::getPublicDeploymentStatusCall {}),
            self.view(TREXGateway::isDeployerCall { deployer: caller }),
        )?;

        tracing::debug!(public = public._0, deployer = deployer._0, "Gateway authorization");
        if public._0 || deployer._0 {
            Ok(())
        } else {
            Err(SuiteError::NotAuthorized)
        }
    }

    async fn view<C: SolCall + Send + Sync>(&self, call: C) -> Result<C::Return, SuiteError> {
        let calldata = Bytes::from(call.abi_encode());
        let data = self
            .runner
            .call(self.infrastructure.trex_gateway, calldata)
            .await?;

        C::abi_decode_returns(&data, true).map_err(|err| {
            SuiteError::DeploymentFailed(format!("Failed to decode {} result: {err}", C::SIGNATURE))
        })
    }

    async fn gas_limit(&self, request: &TxRequest) -> u64 {
        match self.runner.estimate_gas(request).await {
            Ok(estimate) => {
                let limit = gas_with_margin(estimate);
                tracing::debug!(estimate, limit, "Gas estimated");
                limit
            }
            Err(err) => {
                tracing::warn!(error = %err, fallback = FALLBACK_GAS_LIMIT, "Could not estimate gas, using default");
                FALLBACK_GAS_LIMIT
            }
        }
    }
}

/// First log that decodes as the factory's suite event, whichever contract emitted it.
fn find_suite_event(logs: &[LogEntry]) -> Option<TREXFactory::TREXSuiteDeployed> {
    logs.iter()
        .filter(|log| log.topics.first() == Some(&TREXFactory::TREXSuiteDeployed::SIGNATURE_HASH))
        .find_map(|log| {
            TREXFactory::TREXSuiteDeployed::decode_raw_log(log.topics.iter().copied(), &log.data, true)
                .ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::{primitives::B256, sol_types::SolValue};

    #[test]
    fn test_gas_margin() {
        assert_eq!(gas_with_margin(1_000_000), 1_200_000);
        assert_eq!(gas_with_margin(5), 6);
        assert_eq!(gas_with_margin(u64::MAX), u64::MAX);

        let large = 3_074_457_345_618_258_602;
        assert!(gas_with_margin(large) >= large);
    }

    #[test]
    fn test_tx_errors_map_to_suite_errors() {
        assert_eq!(SuiteError::from(TxError::InsufficientFunds), SuiteError::InsufficientFunds);
        assert_eq!(SuiteError::from(TxError::SubmissionRejected), SuiteError::SubmissionRejected);
        assert_eq!(
            SuiteError::from(TxError::RevertedExecution("nope".into())),
            SuiteError::DeploymentFailed("Transaction reverted: nope".into())
        );
    }

    #[test]
    fn test_suite_event_is_found_among_other_logs() {
        let addresses: Vec<Address> = (1..=6).map(Address::repeat_byte).collect();
        let data = (
            addresses[1],
            addresses[2],
            addresses[3],
            addresses[4],
            addresses[5],
        )
            .abi_encode_params();

        let logs = vec![
            LogEntry {
                address: Address::repeat_byte(0xee),
                topics: vec![B256::repeat_byte(0x01)],
                data: Bytes::new(),
            },
            LogEntry {
                address: Address::repeat_byte(0xfa),
                topics: vec![
                    TREXFactory::TREXSuiteDeployed::SIGNATURE_HASH,
                    addresses[0].into_word(),
                    B256::repeat_byte(0x5a),
                ],
                data: data.into(),
            },
        ];

        let event = find_suite_event(&logs).unwrap();
        assert_eq!(event._token, addresses[0]);
        assert_eq!(event._mc, addresses[5]);
    }

    #[test]
    fn test_no_suite_event() {
        assert!(find_suite_event(&[]).is_none());
    }
}
