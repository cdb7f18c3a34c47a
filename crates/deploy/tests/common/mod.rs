//! Scripted in-process ledger shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes},
    sol_types::{SolCall, SolEvent, SolValue},
};
use rand::Rng;
use strum::IntoEnumIterator;
use trexup_deploy::{
    Artifact, ContractName, InMemoryArtifacts, LogEntry, TransactionRunner, TxError, TxKind,
    TxOptions, TxReceipt, TxRequest,
    contracts::{TREXFactory, TREXGateway},
};

pub const SUITE_LABEL: &str = "deployTREXSuite";

/// Initialize tracing for tests (idempotent).
pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn random_address() -> Address {
    let mut bytes = [0u8; 20];
    rand::rng().fill(&mut bytes);
    Address::from(bytes)
}

/// Artifacts for every contract, each exposing the entry points the deployment calls.
pub fn artifacts() -> InMemoryArtifacts {
    ContractName::iter().fold(InMemoryArtifacts::new(), |artifacts, name| {
        let functions: Vec<_> = name
            .required_entry_points()
            .iter()
            .map(|entry_point| {
                serde_json::json!({
                    "type": "function",
                    "name": entry_point,
                    "inputs": [],
                    "outputs": [],
                    "stateMutability": "nonpayable",
                })
            })
            .collect();
        let abi: JsonAbi = serde_json::from_value(serde_json::Value::Array(functions))
            .expect("valid ABI json");

        artifacts.with(
            name,
            Artifact {
                abi,
                bytecode: Bytes::from(vec![0x60, 0x80, 0x60, 0x40, name as u8]),
            },
        )
    })
}

/// What the ledger does with the suite instantiation.
#[derive(Debug, Clone)]
pub enum SuiteOutcome {
    /// Emit the factory event with these addresses (token, ir, irs, tir, ctr, mc).
    Emit([Address; 6]),
    /// Succeed without emitting the factory event.
    Silent,
}

#[derive(Debug)]
struct LedgerState {
    submitted: Vec<(TxRequest, TxOptions)>,
    created: u64,
    failures: HashMap<String, TxError>,
    public_deployment: bool,
    allow_listed: bool,
    estimate: Result<u64, TxError>,
    suite: SuiteOutcome,
    view_calls: usize,
}

/// A [`TransactionRunner`] whose responses are scripted by the test.
#[derive(Debug)]
pub struct MockLedger {
    sender: Address,
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new(sender: Address) -> Self {
        Self {
            sender,
            state: Mutex::new(LedgerState {
                submitted: Vec::new(),
                created: 0,
                failures: HashMap::new(),
                public_deployment: true,
                allow_listed: false,
                estimate: Ok(1_000_000),
                suite: SuiteOutcome::Silent,
                view_calls: 0,
            }),
        }
    }

    /// Fail the transaction labelled `label` with `error`.
    pub fn fail_on(self, label: impl Into<String>, error: TxError) -> Self {
        self.state.lock().unwrap().failures.insert(label.into(), error);
        self
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn gateway_access(self, public_deployment: bool, allow_listed: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.public_deployment = public_deployment;
            state.allow_listed = allow_listed;
        }
        self
    }

    pub fn estimate(self, estimate: Result<u64, TxError>) -> Self {
        self.state.lock().unwrap().estimate = estimate;
        self
    }

    pub fn suite_outcome(self, outcome: SuiteOutcome) -> Self {
        self.state.lock().unwrap().suite = outcome;
        self
    }

    pub fn submitted(&self) -> Vec<(TxRequest, TxOptions)> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn submitted_labels(&self) -> Vec<String> {
        self.submitted()
            .into_iter()
            .map(|(request, _)| request.label)
            .collect()
    }

    pub fn view_calls(&self) -> usize {
        self.state.lock().unwrap().view_calls
    }

    /// Decoded arguments of the last suite instantiation submitted.
    pub fn last_suite_call(&self) -> Option<(TREXGateway::deployTREXSuiteCall, TxOptions)> {
        self.submitted()
            .into_iter()
            .rev()
            .find(|(request, _)| request.label == SUITE_LABEL)
            .map(|(request, options)| {
                let call = TREXGateway::deployTREXSuiteCall::abi_decode(request.input(), true)
                    .expect("suite calldata decodes");
                (call, options)
            })
    }

    fn suite_logs(outcome: &SuiteOutcome) -> Vec<LogEntry> {
        let unrelated = LogEntry {
            address: Address::repeat_byte(0xee),
            topics: vec![B256::repeat_byte(0x01)],
            data: Bytes::new(),
        };

        match outcome {
            SuiteOutcome::Silent => vec![unrelated],
            SuiteOutcome::Emit([token, ir, irs, tir, ctr, mc]) => {
                let event = TREXFactory::TREXSuiteDeployed {
                    _token: *token,
                    _ir: *ir,
                    _irs: *irs,
                    _tir: *tir,
                    _ctr: *ctr,
                    _mc: *mc,
                    _salt: B256::repeat_byte(0x5a),
                };
                let log = event.encode_log_data();
                vec![
                    unrelated,
                    LogEntry {
                        address: Address::repeat_byte(0xfa),
                        topics: log.topics().to_vec(),
                        data: log.data,
                    },
                ]
            }
        }
    }
}

impl TransactionRunner for MockLedger {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn submit_and_confirm(
        &self,
        request: TxRequest,
        options: TxOptions,
    ) -> Result<TxReceipt, TxError> {
        let mut state = self.state.lock().unwrap();
        state.submitted.push((request.clone(), options));

        if let Some(error) = state.failures.get(&request.label) {
            return Err(error.clone());
        }

        let contract_address = match request.kind {
            TxKind::Create { .. } => {
                state.created += 1;
                let mut bytes = [0u8; 20];
                bytes[12..].copy_from_slice(&state.created.to_be_bytes());
                Some(Address::from(bytes))
            }
            TxKind::Call { .. } => None,
        };

        let logs = if request.label == SUITE_LABEL {
            Self::suite_logs(&state.suite)
        } else {
            Vec::new()
        };

        Ok(TxReceipt {
            tx_hash: B256::with_last_byte(state.submitted.len() as u8),
            contract_address,
            gas_used: Some(21_000),
            logs,
        })
    }

    async fn estimate_gas(&self, _request: &TxRequest) -> Result<u64, TxError> {
        self.state.lock().unwrap().estimate.clone()
    }

    async fn call(&self, _to: Address, calldata: Bytes) -> Result<Bytes, TxError> {
        let mut state = self.state.lock().unwrap();
        state.view_calls += 1;

        let selector = calldata.get(..4).unwrap_or_default();
        let answer = if selector == TREXGateway::getPublicDeploymentStatusCall::SELECTOR {
            state.public_deployment
        } else if selector == TREXGateway::isDeployerCall::SELECTOR {
            state.allow_listed
        } else {
            return Err(TxError::RevertedExecution("unknown selector".into()));
        };

        Ok(answer.abi_encode().into())
    }
}
