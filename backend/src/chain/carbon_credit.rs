//! JSON-RPC client for the deployed CarbonCredit contract

use super::{
    format_address, parse_address, parse_signer, ApprovalStatus, CarbonCredit, ChainError,
    ChainStatus, CreditLedger, MintReceipt, TransferReceipt, APPROVAL_GAS_LIMIT, DEFAULT_CHAIN_ID,
    MINT_GAS_LIMIT, TRANSFER_GAS_LIMIT,
};
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use std::env;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

sol! {
    #[sol(rpc)]
    interface ICarbonCredit {
        struct Credit {
            uint256 co2Amount;
            uint256 timestamp;
            string activityType;
        }

        event CreditMinted(address indexed user, uint256 indexed tokenId, uint256 co2Amount, string activityType);

        function mintCredit(address user, uint256 co2Amount, string activityType) external returns (uint256);
        function getCredit(uint256 tokenId) external view returns (Credit memory);
        function getUserCredits(address user) external view returns (uint256[] memory);
        function balanceOf(address owner) external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
        function approve(address to, uint256 tokenId) external;
        function setApprovalForAll(address operator, bool approved) external;
        function getApproved(uint256 tokenId) external view returns (address);
        function isApprovedForAll(address owner, address operator) external view returns (bool);
        function transferFrom(address from, address to, uint256 tokenId) external;
    }
}

pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x100bd2512011b0e93A01266a646ba8eB4dee5312";
pub const DEFAULT_RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";
pub const DEFAULT_EXPLORER_URL: &str = "https://sepolia.etherscan.io";

/// Chain configuration
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub contract_address: String,
    /// Backend operator key; without it the client is read-only
    pub private_key: Option<String>,
    pub chain_id: u64,
    /// Use the in-memory ledger instead of a node
    pub simulation: bool,
    pub explorer_url: String,
}

impl ChainConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let rpc_url = env::var("RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
        let contract_address =
            env::var("CONTRACT_ADDRESS").unwrap_or_else(|_| DEFAULT_CONTRACT_ADDRESS.to_string());
        let private_key = env::var("PRIVATE_KEY").ok().filter(|k| !k.trim().is_empty());

        let chain_id = match env::var("CHAIN_ID") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| format!("Invalid CHAIN_ID: {}", raw))?,
            Err(_) => DEFAULT_CHAIN_ID,
        };

        let simulation = env::var("CHAIN_SIMULATION")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let explorer_url =
            env::var("EXPLORER_URL").unwrap_or_else(|_| DEFAULT_EXPLORER_URL.to_string());

        parse_address(&contract_address).map_err(|e| e.to_string())?;

        Ok(Self {
            rpc_url,
            contract_address,
            private_key,
            chain_id,
            simulation,
            explorer_url,
        })
    }

    /// Explorer link for a transaction
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            contract_address: DEFAULT_CONTRACT_ADDRESS.to_string(),
            private_key: None,
            chain_id: DEFAULT_CHAIN_ID,
            simulation: false,
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
        }
    }
}

/// Client for the CarbonCredit contract.
///
/// Providers are built per call; the only cached state is the chain id
/// confirmed by [`CreditLedger::connect`].
pub struct CarbonCreditClient {
    config: ChainConfig,
    contract: Address,
    signer: Option<PrivateKeySigner>,
    connected_chain: RwLock<Option<u64>>,
}

impl CarbonCreditClient {
    pub fn new(config: ChainConfig) -> Result<Self, ChainError> {
        let contract = parse_address(&config.contract_address)?;
        let signer = config.private_key.as_deref().map(parse_signer).transpose()?;

        match &signer {
            Some(s) => info!("Chain operator: {}", format_address(s.address())),
            None => warn!("PRIVATE_KEY not set - chain client is read-only"),
        }

        Ok(Self {
            config,
            contract,
            signer,
            connected_chain: RwLock::new(None),
        })
    }

    fn rpc_url(&self) -> Result<Url, ChainError> {
        self.config
            .rpc_url
            .parse()
            .map_err(|_| ChainError::InvalidRpcUrl(self.config.rpc_url.clone()))
    }

    /// Read-only provider
    fn provider(&self) -> Result<impl Provider, ChainError> {
        Ok(ProviderBuilder::new().connect_http(self.rpc_url()?))
    }

    /// Provider that signs with the given key
    fn signing_provider(&self, signer: &PrivateKeySigner) -> Result<impl Provider, ChainError> {
        let wallet = EthereumWallet::from(signer.clone());
        Ok(ProviderBuilder::new().wallet(wallet).connect_http(self.rpc_url()?))
    }

    fn operator(&self) -> Result<&PrivateKeySigner, ChainError> {
        self.signer.as_ref().ok_or(ChainError::MissingSigner)
    }

    async fn fetch_credit(&self, token_id: U256) -> Result<CarbonCredit, ChainError> {
        let provider = self.provider()?;
        let contract = ICarbonCredit::new(self.contract, &provider);

        let credit = contract
            .getCredit(token_id)
            .call()
            .await
            .map_err(|e| ChainError::ContractCall(e.to_string()))?;

        Ok(CarbonCredit::new(
            token_id.saturating_to::<u64>(),
            credit.co2Amount.saturating_to::<u64>(),
            credit.timestamp.saturating_to::<u64>(),
            credit.activityType,
        ))
    }
}

#[async_trait]
impl CreditLedger for CarbonCreditClient {
    async fn connect(&self) -> Result<u64, ChainError> {
        let provider = self.provider()?;
        let actual = provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        if actual != self.config.chain_id {
            return Err(ChainError::ChainIdMismatch {
                expected: self.config.chain_id,
                actual,
            });
        }

        *self.connected_chain.write().await = Some(actual);
        info!("Connected to chain {} at {}", actual, self.config.rpc_url);
        Ok(actual)
    }

    async fn disconnect(&self) {
        *self.connected_chain.write().await = None;
        debug!("Chain connection state cleared");
    }

    async fn status(&self) -> ChainStatus {
        let contract_address = self.contract_address();

        let provider = match self.provider() {
            Ok(p) => p,
            Err(_) => {
                return ChainStatus {
                    connected: false,
                    chain_id: None,
                    contract_address,
                    latest_block: None,
                }
            }
        };

        let chain_id = provider.get_chain_id().await;
        let latest_block = provider.get_block_number().await;

        match (chain_id, latest_block) {
            (Ok(chain_id), Ok(block)) => ChainStatus {
                connected: true,
                chain_id: Some(chain_id),
                contract_address,
                latest_block: Some(block),
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!("Chain node unreachable: {}", e);
                ChainStatus {
                    connected: false,
                    chain_id: None,
                    contract_address,
                    latest_block: None,
                }
            }
        }
    }

    fn contract_address(&self) -> String {
        format_address(self.contract)
    }

    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    fn operator_address(&self) -> Option<String> {
        self.signer.as_ref().map(|s| format_address(s.address()))
    }

    fn explorer_tx_url(&self, tx_hash: &str) -> Option<String> {
        Some(self.config.tx_url(tx_hash))
    }

    async fn mint_credit(
        &self,
        to: &str,
        co2_grams: u64,
        activity_type: &str,
    ) -> Result<MintReceipt, ChainError> {
        let signer = self.operator()?;
        let recipient = parse_address(to)?;

        info!("Minting {}g CO2 credit to {} for {}", co2_grams, to, activity_type);

        let provider = self.signing_provider(signer)?;
        let contract = ICarbonCredit::new(self.contract, &provider);

        let pending_tx = contract
            .mintCredit(recipient, U256::from(co2_grams), activity_type.to_string())
            .gas(MINT_GAS_LIMIT)
            .send()
            .await
            .map_err(|e| ChainError::Transaction(e.to_string()))?;

        let tx_hash = *pending_tx.tx_hash();

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| ChainError::Transaction(e.to_string()))?;

        if !receipt.status() {
            return Err(ChainError::Transaction(format!(
                "Transaction failed on chain. Tx hash: {:?}",
                tx_hash
            )));
        }

        let token_id = receipt.inner.logs().iter().find_map(|log| {
            log.log_decode::<ICarbonCredit::CreditMinted>()
                .ok()
                .map(|decoded| decoded.inner.data.tokenId.saturating_to::<u64>())
        });

        if token_id.is_none() {
            warn!("CreditMinted event missing from receipt {:?}", tx_hash);
        }

        Ok(MintReceipt {
            token_id,
            transaction_hash: format!("{:?}", tx_hash),
            block_number: receipt.block_number,
            co2_grams,
        })
    }

    async fn user_credits(&self, wallet: &str) -> Result<Vec<CarbonCredit>, ChainError> {
        let owner = parse_address(wallet)?;
        let provider = self.provider()?;
        let contract = ICarbonCredit::new(self.contract, &provider);

        let token_ids = contract
            .getUserCredits(owner)
            .call()
            .await
            .map_err(|e| ChainError::ContractCall(e.to_string()))?;

        let mut credits = Vec::with_capacity(token_ids.len());
        for token_id in token_ids {
            credits.push(self.fetch_credit(token_id).await?);
        }

        Ok(credits)
    }

    async fn credit_balance(&self, wallet: &str) -> Result<u64, ChainError> {
        let owner = parse_address(wallet)?;
        let provider = self.provider()?;
        let contract = ICarbonCredit::new(self.contract, &provider);

        let balance = contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| ChainError::ContractCall(e.to_string()))?;

        Ok(balance.saturating_to::<u64>())
    }

    async fn check_approval(&self, token_id: u64, owner: &str) -> Result<ApprovalStatus, ChainError> {
        let owner = parse_address(owner)?;
        let operator = match &self.signer {
            Some(s) => s.address(),
            None => {
                return Ok(ApprovalStatus {
                    approved: false,
                    backend_address: None,
                    is_approved_for_all: false,
                })
            }
        };

        let provider = self.provider()?;
        let contract = ICarbonCredit::new(self.contract, &provider);

        let approved_address = contract
            .getApproved(U256::from(token_id))
            .call()
            .await
            .map_err(|e| ChainError::ContractCall(e.to_string()))?;

        let is_approved_for_all = contract
            .isApprovedForAll(owner, operator)
            .call()
            .await
            .map_err(|e| ChainError::ContractCall(e.to_string()))?;

        Ok(ApprovalStatus {
            approved: approved_address == operator || is_approved_for_all,
            backend_address: Some(format_address(operator)),
            is_approved_for_all,
        })
    }

    async fn transfer(&self, from: &str, to: &str, token_id: u64) -> Result<TransferReceipt, ChainError> {
        let signer = self.operator()?;
        let from_address = parse_address(from)?;
        let to_address = parse_address(to)?;

        let provider = self.provider()?;
        let owner = ICarbonCredit::new(self.contract, &provider)
            .ownerOf(U256::from(token_id))
            .call()
            .await
            .map_err(|e| ChainError::ContractCall(e.to_string()))?;
        if owner != from_address {
            return Err(ChainError::NotOwner {
                token_id,
                from: from.to_string(),
            });
        }

        let approval = self.check_approval(token_id, from).await?;
        if !approval.approved {
            return Err(ChainError::NotApproved {
                token_id,
                operator: format_address(signer.address()),
            });
        }

        info!("Transferring credit #{} from {} to {}", token_id, from, to);

        let provider = self.signing_provider(signer)?;
        let contract = ICarbonCredit::new(self.contract, &provider);

        let pending_tx = contract
            .transferFrom(from_address, to_address, U256::from(token_id))
            .gas(TRANSFER_GAS_LIMIT)
            .send()
            .await
            .map_err(|e| ChainError::Transaction(e.to_string()))?;

        let tx_hash = *pending_tx.tx_hash();

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| ChainError::Transaction(e.to_string()))?;

        if !receipt.status() {
            return Err(ChainError::Transaction(format!(
                "Transfer reverted. Tx hash: {:?}",
                tx_hash
            )));
        }

        Ok(TransferReceipt {
            transaction_hash: format!("{:?}", tx_hash),
            block_number: receipt.block_number,
        })
    }

    async fn approve(
        &self,
        owner: &PrivateKeySigner,
        operator: &str,
        token_id: u64,
    ) -> Result<String, ChainError> {
        let operator = parse_address(operator)?;
        let provider = self.signing_provider(owner)?;
        let contract = ICarbonCredit::new(self.contract, &provider);

        let pending_tx = contract
            .approve(operator, U256::from(token_id))
            .gas(APPROVAL_GAS_LIMIT)
            .send()
            .await
            .map_err(|e| ChainError::Transaction(e.to_string()))?;

        Ok(format!("{:?}", pending_tx.tx_hash()))
    }

    async fn set_approval_for_all(
        &self,
        owner: &PrivateKeySigner,
        operator: &str,
        approved: bool,
    ) -> Result<String, ChainError> {
        let operator = parse_address(operator)?;
        let provider = self.signing_provider(owner)?;
        let contract = ICarbonCredit::new(self.contract, &provider);

        let pending_tx = contract
            .setApprovalForAll(operator, approved)
            .gas(APPROVAL_GAS_LIMIT)
            .send()
            .await
            .map_err(|e| ChainError::Transaction(e.to_string()))?;

        Ok(format!("{:?}", pending_tx.tx_hash()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_targets_sepolia() {
        let config = ChainConfig::default();
        assert_eq!(config.chain_id, 11_155_111);
        assert!(!config.simulation);
        assert!(config.private_key.is_none());
    }

    #[test]
    fn test_tx_url() {
        let config = ChainConfig {
            explorer_url: "https://sepolia.etherscan.io/".into(),
            ..Default::default()
        };
        assert_eq!(config.tx_url("0xabc"), "https://sepolia.etherscan.io/tx/0xabc");

        let client = CarbonCreditClient::new(config).unwrap();
        assert_eq!(
            client.explorer_tx_url("0xdef").as_deref(),
            Some("https://sepolia.etherscan.io/tx/0xdef")
        );
    }

    #[tokio::test]
    async fn test_client_without_key_is_read_only() {
        let client = CarbonCreditClient::new(ChainConfig::default()).unwrap();
        assert!(client.operator_address().is_none());

        let err = client
            .mint_credit("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4", 1000, "tree_planting")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "PRIVATE_KEY not set");
    }

    #[test]
    fn test_invalid_contract_address_rejected() {
        let config = ChainConfig {
            contract_address: "0x1234".into(),
            ..Default::default()
        };
        assert!(matches!(
            CarbonCreditClient::new(config),
            Err(ChainError::InvalidAddress(_))
        ));
    }
}
