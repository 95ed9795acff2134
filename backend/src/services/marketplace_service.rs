//! Credit marketplace.
//!
//! Listings live on the activity rows that minted the credits. A sale moves
//! the NFT through the operator wallet, marks the listing sold and records a
//! `marketplace_purchase` activity for the buyer.

use crate::chain::{ApprovalStatus, CarbonCredit, CreditLedger, TransferReceipt};
use crate::error::{AppError, AppResult};
use crate::models::{Activity, MarketplaceStatus, NewActivity, MARKETPLACE_PURCHASE};
use crate::repositories::ActivityRepository;
use crate::services::AuditTrailService;
use crate::websocket::{WebSocketServer, WsMessage};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Price shown for listings stored without one
pub const DEFAULT_PRICE_ETH: f64 = 0.01;

const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub token_id: Option<i64>,
    pub seller: String,
    pub seller_wallet: String,
    pub price_eth: f64,
    pub co2_amount: i64,
    pub activity_type: String,
    pub created_at: String,
    pub is_active: bool,
    pub transaction_hash: Option<String>,
}

fn price_or_default(price: Option<Decimal>) -> f64 {
    price.and_then(|p| p.to_f64()).unwrap_or(DEFAULT_PRICE_ETH)
}

impl From<&Activity> for Listing {
    fn from(activity: &Activity) -> Self {
        Self {
            id: activity.id.to_string(),
            token_id: activity.token_id,
            seller: activity.username.clone(),
            seller_wallet: activity
                .owner_wallet()
                .unwrap_or_else(|| "0x0000...0000".to_string()),
            price_eth: price_or_default(activity.listing_price),
            co2_amount: activity.co2_grams(),
            activity_type: activity.activity_type.clone(),
            created_at: activity.timestamp.format("%Y-%m-%d").to_string(),
            is_active: activity.status_enum() == MarketplaceStatus::Listed,
            transaction_hash: activity.transaction_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListingRequest {
    pub token_id: Option<i64>,
    pub seller_wallet: Option<String>,
    pub price_eth: Option<f64>,
    pub seller: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedListing {
    pub success: bool,
    pub message: String,
    pub listing_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyListingRequest {
    pub buyer_wallet: Option<String>,
    pub buyer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub success: bool,
    pub message: String,
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub token_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

/// Token and seller of a listing that is ready to be sold
#[derive(Debug, Clone, PartialEq)]
pub struct SaleTerms {
    pub token_id: i64,
    pub chain_token: u64,
    pub seller_wallet: String,
}

impl SaleTerms {
    pub fn from_listing(listing: &Activity) -> AppResult<Self> {
        let invalid = || AppError::Validation("Invalid listing - no NFT token found".to_string());

        let token_id = match (listing.token_id, listing.transaction_hash.as_deref()) {
            (Some(id), Some(_)) => id,
            _ => return Err(invalid()),
        };
        let chain_token = u64::try_from(token_id).map_err(|_| invalid())?;

        if listing.status_enum() != MarketplaceStatus::Listed {
            return Err(AppError::Validation("Listing is no longer available".to_string()));
        }

        let seller_wallet = listing
            .owner_wallet()
            .ok_or_else(|| AppError::Validation("Seller wallet not found".to_string()))?;

        Ok(Self {
            token_id,
            chain_token,
            seller_wallet,
        })
    }
}

/// Move the credit to the buyer through the operator; every chain failure is a 400
pub async fn transfer_credit(
    ledger: &dyn CreditLedger,
    terms: &SaleTerms,
    buyer_wallet: &str,
) -> AppResult<TransferReceipt> {
    ledger
        .transfer(&terms.seller_wallet, buyer_wallet, terms.chain_token)
        .await
        .map_err(|e| {
            warn!("Transfer of NFT #{} failed: {}", terms.token_id, e);
            AppError::Validation(format!("Blockchain transfer failed: {}", e))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Sale,
    Purchase,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub token_id: Option<i64>,
    pub activity_type: String,
    pub co2_amount: i64,
    pub price_eth: f64,
    pub timestamp: String,
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller: Option<String>,
    pub status: String,
}

impl HistoryEntry {
    pub fn sale(activity: &Activity) -> Self {
        Self {
            id: activity.id.to_string(),
            kind: HistoryKind::Sale,
            token_id: activity.token_id,
            activity_type: activity.activity_type.clone(),
            co2_amount: activity.co2_grams(),
            price_eth: price_or_default(activity.listing_price),
            timestamp: activity.timestamp.format(HISTORY_TIME_FORMAT).to_string(),
            transaction_hash: activity.transaction_hash.clone(),
            seller: None,
            status: "sold".to_string(),
        }
    }

    /// Seller, original type and price come from the purchase payload
    pub fn purchase(activity: &Activity) -> Self {
        Self {
            id: activity.id.to_string(),
            kind: HistoryKind::Purchase,
            token_id: activity.token_id,
            activity_type: activity
                .data_str("original_activity_type")
                .unwrap_or("unknown")
                .to_string(),
            co2_amount: activity.co2_grams(),
            price_eth: activity
                .data
                .get("price_paid")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_PRICE_ETH),
            timestamp: activity.timestamp.format(HISTORY_TIME_FORMAT).to_string(),
            transaction_hash: activity.transaction_hash.clone(),
            seller: Some(activity.data_str("seller").unwrap_or("Unknown").to_string()),
            status: "purchased".to_string(),
        }
    }
}

/// Sales and purchases of a wallet, newest first
pub fn merge_history(sold: &[Activity], purchased: &[Activity]) -> Vec<HistoryEntry> {
    let mut history: Vec<HistoryEntry> = sold
        .iter()
        .map(HistoryEntry::sale)
        .chain(purchased.iter().map(HistoryEntry::purchase))
        .collect();
    // the timestamp format sorts lexically
    history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    history
}

/// Operator contract details the client needs to request an approval
#[derive(Debug, Clone, Serialize)]
pub struct ContractInfo {
    pub success: bool,
    pub contract_address: String,
    pub marketplace_operator: Option<String>,
    pub chain_id: u64,
}

fn required<T>(value: Option<T>) -> AppResult<T> {
    value.ok_or_else(|| AppError::Validation("Missing required fields".to_string()))
}

fn required_text(value: Option<String>) -> AppResult<String> {
    required(value.filter(|v| !v.trim().is_empty()))
}

pub struct MarketplaceService {
    activity_repo: Arc<ActivityRepository>,
    ledger: Arc<dyn CreditLedger>,
    ws_server: WebSocketServer,
    audit: Arc<AuditTrailService>,
}

impl MarketplaceService {
    pub fn new(
        activity_repo: Arc<ActivityRepository>,
        ledger: Arc<dyn CreditLedger>,
        ws_server: WebSocketServer,
        audit: Arc<AuditTrailService>,
    ) -> Self {
        Self {
            activity_repo,
            ledger,
            ws_server,
            audit,
        }
    }

    pub async fn listings(&self) -> AppResult<Vec<Listing>> {
        let listed = self.activity_repo.find_listed().await?;
        Ok(listed
            .iter()
            .filter(|a| a.is_tradeable())
            .map(Listing::from)
            .collect())
    }

    /// Credits held by a wallet, read from the contract
    pub async fn user_nft_credits(&self, wallet: &str) -> AppResult<Vec<CarbonCredit>> {
        Ok(self.ledger.user_credits(wallet).await?)
    }

    pub async fn create_listing(&self, request: CreateListingRequest) -> AppResult<CreatedListing> {
        let token_id = required(request.token_id.filter(|id| *id != 0))?;
        let seller_wallet = required_text(request.seller_wallet)?;
        let price_eth = required(request.price_eth.filter(|p| *p != 0.0))?;
        let seller = required_text(request.seller)?;

        let price = Decimal::from_f64(price_eth)
            .filter(|p| p.is_sign_positive())
            .ok_or_else(|| AppError::Validation("Invalid price".to_string()))?;

        let activity = self
            .activity_repo
            .find_by_token_and_wallet(token_id, &seller_wallet)
            .await?
            .ok_or_else(|| AppError::NotFound("NFT not found or you don't own it".to_string()))?;

        let listing = self.activity_repo.mark_listed(activity.id, price).await?;

        info!("Listing created: token #{} by {} at {} ETH", token_id, seller, price);
        self.audit.log_listing_created(&listing, &seller).await;
        self.ws_server
            .broadcast_to_marketplace(WsMessage::ListingCreated {
                listing_id: listing.id.to_string(),
                token_id,
                seller,
                price_eth,
            })
            .await;

        Ok(CreatedListing {
            success: true,
            message: "Listing created successfully".to_string(),
            listing_id: listing.id.to_string(),
        })
    }

    pub async fn buy_listing(&self, listing_id: Uuid, request: BuyListingRequest) -> AppResult<Purchase> {
        let buyer_wallet = required_text(request.buyer_wallet)?;
        let buyer = required_text(request.buyer)?;

        let listing = self
            .activity_repo
            .find_by_id(listing_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Listing not found".to_string()))?;

        let terms = SaleTerms::from_listing(&listing)?;
        let token_id = terms.token_id;
        let seller_wallet = terms.seller_wallet.clone();

        info!(
            "Processing marketplace purchase: NFT #{} from {} to {}",
            token_id, seller_wallet, buyer_wallet
        );

        let receipt = transfer_credit(self.ledger.as_ref(), &terms, &buyer_wallet).await?;

        let price_paid = price_or_default(listing.listing_price);
        let mut purchase = NewActivity::new(
            &buyer,
            MARKETPLACE_PURCHASE,
            &format!("Bought carbon credit #{}", token_id),
            json!({
                "listing_id": listing.id.to_string(),
                "seller": listing.username,
                "seller_wallet": seller_wallet,
                "buyer_wallet": buyer_wallet,
                "token_id": token_id,
                "co2_amount": listing.predicted_emission,
                "original_activity_type": listing.activity_type,
                "price_paid": price_paid,
            }),
        );
        purchase.predicted_emission = listing.predicted_emission;
        purchase.user_wallet = Some(buyer_wallet.clone());
        purchase.token_id = Some(token_id);
        purchase.transaction_hash = Some(receipt.transaction_hash.clone());

        let (sold, bought) = self
            .activity_repo
            .record_sale(listing.id, &purchase)
            .await
            .map_err(|e| {
                error!(
                    "NFT #{} moved on-chain in {} but listing {} was not marked sold: {}",
                    token_id, receipt.transaction_hash, listing.id, e
                );
                e
            })?;

        self.audit
            .log_listing_sold(&sold, &bought, &receipt.transaction_hash)
            .await;

        let message = WsMessage::ListingSold {
            listing_id: sold.id.to_string(),
            token_id,
            buyer,
            seller_wallet: seller_wallet.clone(),
            buyer_wallet: buyer_wallet.clone(),
            transaction_hash: receipt.transaction_hash.clone(),
        };
        self.ws_server.broadcast_to_marketplace(message.clone()).await;
        self.ws_server.broadcast_to_wallet(&seller_wallet, message.clone()).await;
        self.ws_server.broadcast_to_wallet(&buyer_wallet, message).await;

        Ok(Purchase {
            success: true,
            message: "Purchase completed successfully on blockchain".to_string(),
            explorer_url: self.ledger.explorer_tx_url(&receipt.transaction_hash),
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            token_id,
        })
    }

    pub async fn check_approval(&self, token_id: u64, owner: &str) -> AppResult<ApprovalStatus> {
        Ok(self.ledger.check_approval(token_id, owner).await?)
    }

    pub fn contract_info(&self) -> ContractInfo {
        ContractInfo {
            success: true,
            contract_address: self.ledger.contract_address(),
            marketplace_operator: self.ledger.operator_address(),
            chain_id: self.ledger.chain_id(),
        }
    }

    pub async fn history(&self, wallet: &str) -> AppResult<Vec<HistoryEntry>> {
        let sold = self.activity_repo.find_sold_by_wallet(wallet).await?;
        let purchased = self.activity_repo.find_purchases_by_wallet(wallet).await?;
        Ok(merge_history(&sold, &purchased))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SELLER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const BUYER: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";

    fn activity(day: u32, hour: u32) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            username: "demo_user".to_string(),
            activity_type: "tree_planting".to_string(),
            description: "Planted 3 trees".to_string(),
            data: json!({}),
            predicted_emission: 60.0,
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            transaction_hash: Some("0xabc".to_string()),
            token_id: Some(7),
            user_wallet: Some("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4".to_string()),
            marketplace_status: "listed".to_string(),
            listing_price: None,
        }
    }

    #[test]
    fn test_listing_view() {
        let mut a = activity(5, 9);
        let listing = Listing::from(&a);
        assert_eq!(listing.price_eth, DEFAULT_PRICE_ETH);
        assert_eq!(listing.co2_amount, 60_000);
        assert_eq!(listing.created_at, "2024-03-05");
        assert!(listing.is_active);

        a.listing_price = Decimal::from_f64(0.25);
        a.marketplace_status = "sold".to_string();
        let listing = Listing::from(&a);
        assert_eq!(listing.price_eth, 0.25);
        assert!(!listing.is_active);

        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["tokenId"], 7);
        assert_eq!(json["sellerWallet"], "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4");
    }

    #[test]
    fn test_purchase_entry_reads_payload() {
        let mut a = activity(6, 10);
        a.activity_type = MARKETPLACE_PURCHASE.to_string();
        a.data = json!({
            "seller": "eco_warrior",
            "price_paid": 0.05,
            "original_activity_type": "recycling",
        });

        let entry = HistoryEntry::purchase(&a);
        assert_eq!(entry.kind, HistoryKind::Purchase);
        assert_eq!(entry.seller.as_deref(), Some("eco_warrior"));
        assert_eq!(entry.price_eth, 0.05);
        assert_eq!(entry.activity_type, "recycling");
        assert_eq!(entry.timestamp, "2024-03-06 10:00:00");
        assert_eq!(entry.status, "purchased");
    }

    #[test]
    fn test_history_newest_first() {
        let sold = vec![activity(2, 8)];
        let mut bought = activity(9, 12);
        bought.data = json!({});
        let history = merge_history(&sold, &[bought]);

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, HistoryKind::Purchase);
        assert_eq!(history[0].seller.as_deref(), Some("Unknown"));
        assert_eq!(history[1].kind, HistoryKind::Sale);

        let json = serde_json::to_value(&history[1]).unwrap();
        assert_eq!(json["type"], "sale");
        assert!(json.get("seller").is_none());
    }

    #[test]
    fn test_sale_terms_from_listing() {
        let terms = SaleTerms::from_listing(&activity(5, 9)).unwrap();
        assert_eq!(terms.token_id, 7);
        assert_eq!(terms.chain_token, 7);
        assert_eq!(terms.seller_wallet, "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4");
    }

    #[test]
    fn test_sale_terms_reject_unsellable_listings() {
        let mut no_token = activity(5, 9);
        no_token.token_id = None;
        assert_eq!(
            SaleTerms::from_listing(&no_token).unwrap_err().to_string(),
            "Invalid listing - no NFT token found"
        );

        let mut sold = activity(5, 9);
        sold.marketplace_status = "sold".to_string();
        let err = SaleTerms::from_listing(&sold).unwrap_err();
        assert_eq!(err.to_string(), "Listing is no longer available");
        assert_eq!(err.status_code(), 400);

        let mut no_wallet = activity(5, 9);
        no_wallet.user_wallet = None;
        assert_eq!(
            SaleTerms::from_listing(&no_wallet).unwrap_err().to_string(),
            "Seller wallet not found"
        );

        let mut from_payload = no_wallet.clone();
        from_payload.data = json!({ "user_wallet": "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC" });
        assert_eq!(
            SaleTerms::from_listing(&from_payload).unwrap().seller_wallet,
            "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC"
        );
    }

    #[tokio::test]
    async fn test_transfer_needs_operator_approval() {
        use crate::chain::{format_address, parse_signer, SimulatedLedger};

        let ledger = SimulatedLedger::new();
        let owner = parse_signer(SELLER_KEY).unwrap();
        let seller_wallet = format_address(owner.address());
        let minted = ledger.mint_credit(&seller_wallet, 60_000, "tree_planting").await.unwrap();
        let terms = SaleTerms {
            token_id: minted.token_id.unwrap() as i64,
            chain_token: minted.token_id.unwrap(),
            seller_wallet,
        };

        let err = transfer_credit(&ledger, &terms, BUYER).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().starts_with("Blockchain transfer failed"));

        let operator = ledger.operator_address().unwrap();
        ledger.set_approval_for_all(&owner, &operator, true).await.unwrap();

        let receipt = transfer_credit(&ledger, &terms, BUYER).await.unwrap();
        assert!(receipt.transaction_hash.starts_with("0x"));
        assert_eq!(
            ledger.owner_of(terms.chain_token).await.unwrap().to_lowercase(),
            BUYER.to_lowercase()
        );

        let err = transfer_credit(&ledger, &terms, BUYER).await.unwrap_err();
        assert!(err.to_string().contains("does not own token"));
    }

    #[test]
    fn test_purchase_omits_missing_explorer_link() {
        let purchase = Purchase {
            success: true,
            message: "ok".to_string(),
            transaction_hash: "0xabc".to_string(),
            block_number: Some(3),
            token_id: 7,
            explorer_url: None,
        };
        let json = serde_json::to_value(&purchase).unwrap();
        assert_eq!(json["transactionHash"], "0xabc");
        assert!(json.get("explorerUrl").is_none());
    }

    #[test]
    fn test_required_fields() {
        assert!(required_text(Some("  ".to_string())).is_err());
        assert_eq!(required_text(Some("demo_user".to_string())).unwrap(), "demo_user");
        let err = required::<i64>(None).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields");
    }
}
