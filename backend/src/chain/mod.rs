//! Carbon-credit ledger access
//!
//! The backend talks to an ERC-721 carbon-credit contract through the
//! [`CreditLedger`] trait. [`CarbonCreditClient`] drives the deployed
//! contract over JSON-RPC; [`SimulatedLedger`] keeps the same state machine
//! in memory for local development and tests.

pub mod approval;
pub mod carbon_credit;
pub mod simulated;

pub use approval::{approve_all_credits, approve_credit, ApprovalOutcome};
pub use carbon_credit::{CarbonCreditClient, ChainConfig, ICarbonCredit};
pub use simulated::SimulatedLedger;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Gas limit for `mintCredit`
pub const MINT_GAS_LIMIT: u64 = 300_000;

/// Gas limit for `approve` and `setApprovalForAll`
pub const APPROVAL_GAS_LIMIT: u64 = 100_000;

/// Gas limit for the operator's `transferFrom`
pub const TRANSFER_GAS_LIMIT: u64 = 150_000;

/// Sepolia
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

/// Errors raised while talking to the credit contract
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Invalid Ethereum address: {0}")]
    InvalidAddress(String),

    #[error("PRIVATE_KEY not set")]
    MissingSigner,

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Connected to chain {actual}, expected {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("Operator {operator} is not approved to transfer token {token_id}")]
    NotApproved { token_id: u64, operator: String },

    #[error("Token {0} does not exist")]
    TokenNotFound(u64),

    #[error("{from} does not own token {token_id}")]
    NotOwner { token_id: u64, from: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract call failed: {0}")]
    ContractCall(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),
}

/// Parse a hex address, accepting any checksum casing
pub fn parse_address(address: &str) -> Result<Address, ChainError> {
    Address::from_str(address.trim()).map_err(|_| ChainError::InvalidAddress(address.to_string()))
}

/// Parse a hex private key with or without the `0x` prefix
pub fn parse_signer(private_key: &str) -> Result<PrivateKeySigner, ChainError> {
    let key = private_key.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    PrivateKeySigner::from_str(key).map_err(|e| ChainError::InvalidKey(e.to_string()))
}

/// Checksummed rendering of an address
pub fn format_address(address: Address) -> String {
    address.to_checksum(None)
}

/// A credit NFT as stored by the contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonCredit {
    pub token_id: u64,
    pub co2_amount_grams: u64,
    pub co2_amount_kg: f64,
    pub timestamp: u64,
    pub activity_type: String,
}

impl CarbonCredit {
    pub fn new(token_id: u64, co2_amount_grams: u64, timestamp: u64, activity_type: String) -> Self {
        Self {
            token_id,
            co2_amount_grams,
            co2_amount_kg: co2_amount_grams as f64 / 1000.0,
            timestamp,
            activity_type,
        }
    }
}

/// Result of a confirmed mint
#[derive(Debug, Clone, Serialize)]
pub struct MintReceipt {
    /// Taken from the `CreditMinted` event; absent if the log could not be decoded
    pub token_id: Option<u64>,
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub co2_grams: u64,
}

/// Result of a confirmed operator transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
}

/// Snapshot of the node connection
#[derive(Debug, Clone, Serialize)]
pub struct ChainStatus {
    pub connected: bool,
    pub chain_id: Option<u64>,
    pub contract_address: String,
    pub latest_block: Option<u64>,
}

/// Whether the backend operator may move a token
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalStatus {
    pub approved: bool,
    pub backend_address: Option<String>,
    pub is_approved_for_all: bool,
}

/// Operations the backend performs against the carbon-credit contract.
///
/// Every call is a single contract interaction; failures are reported to the
/// caller and never retried.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Verify the node serves the configured chain and remember the connection
    async fn connect(&self) -> Result<u64, ChainError>;

    /// Forget the cached connection
    async fn disconnect(&self);

    /// Connection snapshot; never fails, an unreachable node reports `connected: false`
    async fn status(&self) -> ChainStatus;

    fn contract_address(&self) -> String;

    fn chain_id(&self) -> u64;

    /// Address of the backend wallet, if a key is configured
    fn operator_address(&self) -> Option<String>;

    /// Block-explorer link for a transaction sent by this ledger
    fn explorer_tx_url(&self, tx_hash: &str) -> Option<String>;

    /// Mint a credit worth `co2_grams` to `to`
    async fn mint_credit(
        &self,
        to: &str,
        co2_grams: u64,
        activity_type: &str,
    ) -> Result<MintReceipt, ChainError>;

    /// Every credit owned by `wallet`, with its on-chain attributes
    async fn user_credits(&self, wallet: &str) -> Result<Vec<CarbonCredit>, ChainError>;

    /// Number of credits owned by `wallet`
    async fn credit_balance(&self, wallet: &str) -> Result<u64, ChainError>;

    /// Whether the operator may transfer `token_id` on behalf of `owner`
    async fn check_approval(&self, token_id: u64, owner: &str) -> Result<ApprovalStatus, ChainError>;

    /// Move a token from `from` to `to` as the operator
    async fn transfer(&self, from: &str, to: &str, token_id: u64) -> Result<TransferReceipt, ChainError>;

    /// `approve(operator, token_id)` signed by the token owner
    async fn approve(
        &self,
        owner: &PrivateKeySigner,
        operator: &str,
        token_id: u64,
    ) -> Result<String, ChainError>;

    /// `setApprovalForAll(operator, approved)` signed by the token owner
    async fn set_approval_for_all(
        &self,
        owner: &PrivateKeySigner,
        operator: &str,
        approved: bool,
    ) -> Result<String, ChainError>;
}

/// Build the ledger selected by configuration
pub fn ledger_from_config(config: ChainConfig) -> Result<Arc<dyn CreditLedger>, ChainError> {
    if config.simulation {
        let ledger = match config.private_key.as_deref() {
            Some(key) => SimulatedLedger::with_operator(parse_signer(key)?.address()),
            None => SimulatedLedger::new(),
        };
        return Ok(Arc::new(ledger.with_chain(config.chain_id, &config.contract_address)));
    }

    Ok(Arc::new(CarbonCreditClient::new(config)?))
}
