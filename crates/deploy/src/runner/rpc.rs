//! Transaction runner backed by an Ethereum JSON-RPC endpoint.
//!
//! Transactions are submitted with `eth_sendTransaction`, so signing is delegated to the
//! node or wallet that holds the operator's key (an unlocked dev account, a signer proxy,
//! a wallet bridge). Confirmation is observed by polling `eth_getTransactionReceipt`.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use url::Url;

use super::{LogEntry, TransactionRunner, TxError, TxOptions, TxReceipt, TxRequest};

/// Default timeout for a single RPC request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default time to wait for a transaction to be included.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Default time to wait for `eth_sendTransaction` to return, which covers manual approval
/// in a wallet or signer proxy.
pub const DEFAULT_SUBMISSION_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error("Failed to reach RPC endpoint: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Response { code: i64, message: String },

    #[error("Unexpected RPC response: {0}")]
    Decode(String),
}

impl From<RpcError> for TxError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Response { code, message } => TxError::classify(code, &message),
            other => TxError::NetworkError(other.to_string()),
        }
    }
}

/// Minimal JSON-RPC 2.0 client over HTTP.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: Url,
}

impl JsonRpcClient {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Client whose requests time out after `timeout` unless a request overrides it.
    pub fn with_timeout(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Make a JSON-RPC call and deserialize the result.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        self.request_with_timeout(method, params, None).await
    }

    /// Like [`JsonRpcClient::request`], with `timeout` replacing the client's own.
    pub async fn request_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<T, RpcError> {
        tracing::trace!(method, url = %self.url, "Sending RPC request");

        let mut builder = self.http.post(self.url.clone()).json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("{method}: {e}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(format!("{method}: {e}")))?;

        if let Some(error) = body.get("error") {
            return Err(RpcError::Response {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        let result = body
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::Decode(format!("{method}: no result in response")))?;

        serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let hex: String = self.request("eth_chainId", vec![]).await?;
        parse_hex_u64(&hex).map_err(RpcError::Decode)
    }

    pub async fn accounts(&self) -> Result<Vec<Address>, RpcError> {
        self.request("eth_accounts", vec![]).await
    }
}

/// Parse a `0x`-prefixed hex quantity.
fn parse_hex_u64(s: &str) -> Result<u64, String> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| format!("invalid hex quantity '{s}': {e}"))
}

/// Deserialize an optional u64 from a hex string (with 0x prefix).
fn deserialize_opt_u64_from_hex<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| parse_hex_u64(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Receipt fields we read from `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    gas_used: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    status: Option<u64>,
    #[serde(default)]
    logs: Vec<LogEntry>,
}

/// Map an included transaction's receipt to the runner's result.
fn confirmed(label: &str, receipt: RpcReceipt) -> Result<TxReceipt, TxError> {
    if receipt.status == Some(0) {
        return Err(TxError::RevertedExecution(format!(
            "{label} reverted in transaction {}",
            receipt.transaction_hash
        )));
    }

    Ok(TxReceipt {
        tx_hash: receipt.transaction_hash,
        contract_address: receipt.contract_address,
        gas_used: receipt.gas_used,
        logs: receipt.logs,
    })
}

/// Why a receipt poll did not produce a receipt.
enum ReceiptPoll {
    Pending,
    Failed(RpcError),
}

/// [`TransactionRunner`] that submits through a JSON-RPC node.
#[derive(Debug, Clone)]
pub struct RpcRunner {
    client: JsonRpcClient,
    from: Address,
    poll_interval: Duration,
    confirmation_timeout: Duration,
    submission_timeout: Duration,
}

impl RpcRunner {
    pub fn new(client: JsonRpcClient, from: Address) -> Self {
        Self {
            client,
            from,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            submission_timeout: DEFAULT_SUBMISSION_TIMEOUT,
        }
    }

    /// Connect using the node's first managed account when no sender is given.
    pub async fn connect(client: JsonRpcClient, from: Option<Address>) -> anyhow::Result<Self> {
        let from = match from {
            Some(from) => from,
            None => *client
                .accounts()
                .await
                .context("Failed to list node accounts")?
                .first()
                .context("Node manages no accounts; pass an operator address explicitly")?,
        };

        tracing::info!(operator = %from, url = %client.url(), "Connected to RPC endpoint");

        Ok(Self::new(client, from))
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn submission_timeout(mut self, timeout: Duration) -> Self {
        self.submission_timeout = timeout;
        self
    }

    pub fn client(&self) -> &JsonRpcClient {
        &self.client
    }

    fn transaction_object(&self, request: &TxRequest, options: TxOptions) -> Value {
        let mut tx = json!({
            "from": self.from,
            "data": request.input(),
        });
        if let Some(to) = request.to() {
            tx["to"] = json!(to);
        }
        if let Some(gas) = options.gas_limit {
            tx["gas"] = json!(format!("0x{gas:x}"));
        }
        tx
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<RpcReceipt, TxError> {
        let max_polls = (self.confirmation_timeout.as_millis()
            / self.poll_interval.as_millis().max(1))
        .max(1) as usize;

        let poll = || async {
            let receipt: Option<RpcReceipt> = self
                .client
                .request("eth_getTransactionReceipt", vec![json!(tx_hash)])
                .await
                .map_err(ReceiptPoll::Failed)?;
            receipt.ok_or(ReceiptPoll::Pending)
        };

        poll.retry(
            ConstantBuilder::default()
                .with_delay(self.poll_interval)
                .with_max_times(max_polls),
        )
        .when(|e| matches!(e, ReceiptPoll::Pending))
        .notify(|_, _| tracing::trace!(tx_hash = %tx_hash, "Transaction not yet included"))
        .await
        .map_err(|e| match e {
            ReceiptPoll::Pending => TxError::NetworkError(format!(
                "Timed out after {}s waiting for transaction {tx_hash}",
                self.confirmation_timeout.as_secs()
            )),
            ReceiptPoll::Failed(err) => err.into(),
        })
    }
}

impl TransactionRunner for RpcRunner {
    fn sender(&self) -> Address {
        self.from
    }

    async fn submit_and_confirm(
        &self,
        request: TxRequest,
        options: TxOptions,
    ) -> Result<TxReceipt, TxError> {
        let tx = self.transaction_object(&request, options);

        tracing::debug!(label = %request.label, gas_limit = ?options.gas_limit, "Submitting transaction");
        let tx_hash: B256 = self
            .client
            .request_with_timeout("eth_sendTransaction", vec![tx], Some(self.submission_timeout))
            .await?;
        tracing::debug!(label = %request.label, tx_hash = %tx_hash, "Waiting for confirmation");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        confirmed(&request.label, receipt)
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, TxError> {
        let tx = self.transaction_object(request, TxOptions::default());
        let hex: String = self.client.request("eth_estimateGas", vec![tx]).await?;
        parse_hex_u64(&hex).map_err(TxError::NetworkError)
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, TxError> {
        let tx = json!({
            "from": self.from,
            "to": to,
            "data": calldata,
        });
        Ok(self
            .client
            .request("eth_call", vec![tx, json!("latest")])
            .await?)
    }
}
