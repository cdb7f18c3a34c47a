//! Submitting transactions and waiting for the ledger to confirm them.
//!
//! A [`TransactionRunner`] is the atomic unit every deployment step is built from: one
//! transaction in, one confirmed receipt (or a classified failure) out. Runners never
//! resubmit; retry policy belongs to whoever drives them.

mod rpc;

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

pub use rpc::{
    DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_SUBMISSION_TIMEOUT,
    JsonRpcClient, RpcError, RpcRunner,
};

/// What a transaction does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxKind {
    /// Construct a new contract from creation code plus encoded constructor arguments.
    Create { init_code: Bytes },
    /// Call an entry point on an existing contract.
    Call { to: Address, calldata: Bytes },
}

/// A single transaction to submit, labelled for logs and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub label: String,
    pub kind: TxKind,
}

impl TxRequest {
    pub fn create(label: impl Into<String>, init_code: Bytes) -> Self {
        Self {
            label: label.into(),
            kind: TxKind::Create { init_code },
        }
    }

    pub fn call(label: impl Into<String>, to: Address, calldata: impl Into<Bytes>) -> Self {
        Self {
            label: label.into(),
            kind: TxKind::Call {
                to,
                calldata: calldata.into(),
            },
        }
    }

    /// Target address, `None` for contract creation.
    pub fn to(&self) -> Option<Address> {
        match &self.kind {
            TxKind::Create { .. } => None,
            TxKind::Call { to, .. } => Some(*to),
        }
    }

    pub fn input(&self) -> &Bytes {
        match &self.kind {
            TxKind::Create { init_code } => init_code,
            TxKind::Call { calldata, .. } => calldata,
        }
    }
}

/// Per-transaction submission options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Explicit gas limit. When `None` the node estimates it.
    pub gas_limit: Option<u64>,
}

impl TxOptions {
    pub fn with_gas_limit(gas_limit: u64) -> Self {
        Self {
            gas_limit: Some(gas_limit),
        }
    }
}

/// A log emitted by a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Outcome of a transaction the ledger has included and executed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    /// Address assigned to a newly constructed contract.
    pub contract_address: Option<Address>,
    pub gas_used: Option<u64>,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    #[error("Transaction was rejected by user.")]
    SubmissionRejected,

    #[error("Insufficient funds for deployment. Please add more funds to your wallet.")]
    InsufficientFunds,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Transaction reverted: {0}")]
    RevertedExecution(String),
}

impl TxError {
    /// Classify a JSON-RPC error object returned by a node or wallet.
    pub fn classify(code: i64, message: &str) -> Self {
        let lower = message.to_lowercase();

        if code == 4001
            || lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains("rejected by user")
        {
            TxError::SubmissionRejected
        } else if lower.contains("insufficient funds") {
            TxError::InsufficientFunds
        } else if code == 3 || lower.contains("execution reverted") || lower.contains("revert") {
            TxError::RevertedExecution(message.to_string())
        } else {
            TxError::NetworkError(message.to_string())
        }
    }
}

/// Submits transactions on behalf of a single signing identity.
///
/// Implementations must not run two submissions concurrently for the same sender;
/// callers await each confirmation before issuing the next transaction.
pub trait TransactionRunner: Send + Sync {
    /// The address transactions are sent from.
    fn sender(&self) -> Address;

    /// Submit exactly one transaction and wait until the ledger includes it.
    fn submit_and_confirm(
        &self,
        request: TxRequest,
        options: TxOptions,
    ) -> impl Future<Output = Result<TxReceipt, TxError>> + Send;

    /// Estimate the gas the transaction would consume.
    fn estimate_gas(&self, request: &TxRequest) -> impl Future<Output = Result<u64, TxError>> + Send;

    /// Execute a read-only call and return the raw return data.
    fn call(&self, to: Address, calldata: Bytes)
    -> impl Future<Output = Result<Bytes, TxError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rejection() {
        assert_eq!(TxError::classify(4001, "whatever"), TxError::SubmissionRejected);
        assert_eq!(
            TxError::classify(-32000, "User denied transaction signature"),
            TxError::SubmissionRejected
        );
    }

    #[test]
    fn test_classify_insufficient_funds() {
        assert_eq!(
            TxError::classify(-32000, "insufficient funds for gas * price + value"),
            TxError::InsufficientFunds
        );
    }

    #[test]
    fn test_classify_revert_and_network() {
        assert!(matches!(
            TxError::classify(3, "execution reverted: Ownable: caller is not the owner"),
            TxError::RevertedExecution(_)
        ));
        assert!(matches!(
            TxError::classify(-32603, "header not found"),
            TxError::NetworkError(_)
        ));
    }

    #[test]
    fn test_request_accessors() {
        let create = TxRequest::create("Token", Bytes::from_static(&[0x60]));
        assert_eq!(create.to(), None);
        assert_eq!(create.input().as_ref(), &[0x60]);

        let to = Address::repeat_byte(0x11);
        let call = TxRequest::call("setTREXFactory", to, vec![0x01, 0x02]);
        assert_eq!(call.to(), Some(to));
    }
}
