//! In-memory ERC-721 carbon-credit ledger
//!
//! Follows the contract's ownership and approval rules so the marketplace
//! flow behaves the same without a node. Transaction hashes are real-looking
//! 32-byte hex strings derived from an internal nonce.

use super::{
    format_address, parse_address, ApprovalStatus, CarbonCredit, ChainError, ChainStatus,
    CreditLedger, MintReceipt, TransferReceipt, DEFAULT_CHAIN_ID,
};
use crate::chain::carbon_credit::DEFAULT_CONTRACT_ADDRESS;
use alloy::primitives::{keccak256, Address};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone)]
struct SimToken {
    owner: Address,
    co2_grams: u64,
    timestamp: u64,
    activity_type: String,
    approved: Option<Address>,
}

#[derive(Debug, Default)]
struct LedgerState {
    next_token_id: u64,
    block_number: u64,
    tokens: BTreeMap<u64, SimToken>,
    /// (owner, operator) pairs with blanket approval
    operators: HashSet<(Address, Address)>,
    connected: bool,
}

impl LedgerState {
    /// Advance one block and return a fresh tx hash
    fn next_tx(&mut self, tag: &str) -> (String, u64) {
        self.block_number += 1;
        let hash = keccak256(format!("{}:{}:{}", tag, self.block_number, self.next_token_id));
        (format!("{:?}", hash), self.block_number)
    }
}

pub struct SimulatedLedger {
    operator: Address,
    chain_id: u64,
    contract: Address,
    state: RwLock<LedgerState>,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::with_operator(Address::repeat_byte(0xc5))
    }

    pub fn with_operator(operator: Address) -> Self {
        Self {
            operator,
            chain_id: DEFAULT_CHAIN_ID,
            contract: parse_address(DEFAULT_CONTRACT_ADDRESS).unwrap_or(Address::ZERO),
            state: RwLock::new(LedgerState {
                next_token_id: 1,
                connected: true,
                ..Default::default()
            }),
        }
    }

    pub fn with_chain(mut self, chain_id: u64, contract_address: &str) -> Self {
        self.chain_id = chain_id;
        if let Ok(contract) = parse_address(contract_address) {
            self.contract = contract;
        }
        self
    }

    /// Current owner of a token
    pub async fn owner_of(&self, token_id: u64) -> Option<String> {
        let state = self.state.read().await;
        state.tokens.get(&token_id).map(|t| format_address(t.owner))
    }
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CreditLedger for SimulatedLedger {
    async fn connect(&self) -> Result<u64, ChainError> {
        self.state.write().await.connected = true;
        Ok(self.chain_id)
    }

    async fn disconnect(&self) {
        self.state.write().await.connected = false;
    }

    async fn status(&self) -> ChainStatus {
        let state = self.state.read().await;
        ChainStatus {
            connected: state.connected,
            chain_id: Some(self.chain_id),
            contract_address: self.contract_address(),
            latest_block: Some(state.block_number),
        }
    }

    fn contract_address(&self) -> String {
        format_address(self.contract)
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn operator_address(&self) -> Option<String> {
        Some(format_address(self.operator))
    }

    /// Simulated transactions never reach an explorer
    fn explorer_tx_url(&self, _tx_hash: &str) -> Option<String> {
        None
    }

    async fn mint_credit(
        &self,
        to: &str,
        co2_grams: u64,
        activity_type: &str,
    ) -> Result<MintReceipt, ChainError> {
        let owner = parse_address(to)?;
        let mut state = self.state.write().await;

        let token_id = state.next_token_id;
        state.next_token_id += 1;
        state.tokens.insert(
            token_id,
            SimToken {
                owner,
                co2_grams,
                timestamp: chrono::Utc::now().timestamp().max(0) as u64,
                activity_type: activity_type.to_string(),
                approved: None,
            },
        );

        let (transaction_hash, block_number) = state.next_tx("mint");
        info!("Simulated mint of credit #{} ({}g) to {}", token_id, co2_grams, to);

        Ok(MintReceipt {
            token_id: Some(token_id),
            transaction_hash,
            block_number: Some(block_number),
            co2_grams,
        })
    }

    async fn user_credits(&self, wallet: &str) -> Result<Vec<CarbonCredit>, ChainError> {
        let owner = parse_address(wallet)?;
        let state = self.state.read().await;

        Ok(state
            .tokens
            .iter()
            .filter(|(_, t)| t.owner == owner)
            .map(|(id, t)| CarbonCredit::new(*id, t.co2_grams, t.timestamp, t.activity_type.clone()))
            .collect())
    }

    async fn credit_balance(&self, wallet: &str) -> Result<u64, ChainError> {
        let owner = parse_address(wallet)?;
        let state = self.state.read().await;
        Ok(state.tokens.values().filter(|t| t.owner == owner).count() as u64)
    }

    async fn check_approval(&self, token_id: u64, owner: &str) -> Result<ApprovalStatus, ChainError> {
        let owner = parse_address(owner)?;
        let state = self.state.read().await;

        let token = state
            .tokens
            .get(&token_id)
            .ok_or(ChainError::TokenNotFound(token_id))?;
        let is_approved_for_all = state.operators.contains(&(owner, self.operator));

        Ok(ApprovalStatus {
            approved: token.approved == Some(self.operator) || is_approved_for_all,
            backend_address: Some(format_address(self.operator)),
            is_approved_for_all,
        })
    }

    async fn transfer(&self, from: &str, to: &str, token_id: u64) -> Result<TransferReceipt, ChainError> {
        let from_address = parse_address(from)?;
        let to_address = parse_address(to)?;
        let mut state = self.state.write().await;

        let blanket = state.operators.contains(&(from_address, self.operator));
        let token = state
            .tokens
            .get_mut(&token_id)
            .ok_or(ChainError::TokenNotFound(token_id))?;

        if token.owner != from_address {
            return Err(ChainError::NotOwner {
                token_id,
                from: from.to_string(),
            });
        }
        if token.approved != Some(self.operator) && !blanket {
            return Err(ChainError::NotApproved {
                token_id,
                operator: format_address(self.operator),
            });
        }

        token.owner = to_address;
        token.approved = None;

        let (transaction_hash, block_number) = state.next_tx("transfer");
        info!("Simulated transfer of credit #{} from {} to {}", token_id, from, to);

        Ok(TransferReceipt {
            transaction_hash,
            block_number: Some(block_number),
        })
    }

    async fn approve(
        &self,
        owner: &PrivateKeySigner,
        operator: &str,
        token_id: u64,
    ) -> Result<String, ChainError> {
        let operator = parse_address(operator)?;
        let mut state = self.state.write().await;

        let token = state
            .tokens
            .get_mut(&token_id)
            .ok_or(ChainError::TokenNotFound(token_id))?;
        if token.owner != owner.address() {
            return Err(ChainError::NotOwner {
                token_id,
                from: format_address(owner.address()),
            });
        }
        token.approved = Some(operator);

        Ok(state.next_tx("approve").0)
    }

    async fn set_approval_for_all(
        &self,
        owner: &PrivateKeySigner,
        operator: &str,
        approved: bool,
    ) -> Result<String, ChainError> {
        let operator = parse_address(operator)?;
        let mut state = self.state.write().await;

        if approved {
            state.operators.insert((owner.address(), operator));
        } else {
            state.operators.remove(&(owner.address(), operator));
        }

        Ok(state.next_tx("approve_all").0)
    }
}
