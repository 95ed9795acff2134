use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Activity types that offset carbon and are eligible for a credit NFT
pub const OFFSET_ACTIVITY_TYPES: [&str; 4] = [
    "tree_planting",
    "renewable_energy",
    "recycling",
    "carbon_offset",
];

/// Placeholder wallet sent by clients without a connected wallet
pub const ZERO_WALLET: &str = "0x0000000000000000000000000000000000000000";

/// Activity type recorded for credits bought in the marketplace
pub const MARKETPLACE_PURCHASE: &str = "marketplace_purchase";

/// Marketplace state of an activity's credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketplaceStatus {
    NotListed,
    Listed,
    Sold,
}

impl MarketplaceStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "not_listed" => Ok(MarketplaceStatus::NotListed),
            "listed" => Ok(MarketplaceStatus::Listed),
            "sold" => Ok(MarketplaceStatus::Sold),
            _ => Err(format!("Invalid marketplace status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketplaceStatus::NotListed => "not_listed",
            MarketplaceStatus::Listed => "listed",
            MarketplaceStatus::Sold => "sold",
        }
    }
}

/// True when the type alone marks an activity as an offset
pub fn is_offset_type(activity_type: &str) -> bool {
    OFFSET_ACTIVITY_TYPES.contains(&activity_type)
}

/// True for a wallet that can receive a credit
pub fn is_usable_wallet(wallet: Option<&str>) -> bool {
    matches!(wallet, Some(w) if !w.trim().is_empty() && !w.eq_ignore_ascii_case(ZERO_WALLET))
}

/// A logged activity together with its emission estimate and credit state
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Activity {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub username: String,
    pub activity_type: String,
    pub description: String,
    pub data: Value, // JSONB: the payload exactly as submitted
    pub predicted_emission: f64,
    pub timestamp: NaiveDateTime,
    pub transaction_hash: Option<String>,
    pub token_id: Option<i64>,
    pub user_wallet: Option<String>,
    pub marketplace_status: String, // Stored as TEXT, use MarketplaceStatus enum for type safety
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub listing_price: Option<Decimal>,
}

impl Activity {
    /// Emission converted to the contract's unit (whole grams)
    pub fn co2_grams(&self) -> i64 {
        (self.predicted_emission * 1000.0) as i64
    }

    pub fn status_enum(&self) -> MarketplaceStatus {
        MarketplaceStatus::from_str(&self.marketplace_status).unwrap_or(MarketplaceStatus::NotListed)
    }

    /// Excludes rows whose hash column holds a status message instead of a hash
    pub fn is_tradeable(&self) -> bool {
        match (&self.token_id, self.transaction_hash.as_deref()) {
            (Some(_), Some(hash)) => !hash.starts_with("Error") && !hash.starts_with("Emission"),
            _ => false,
        }
    }

    /// Wallet that owns this activity's credit, falling back to the submitted payload
    pub fn owner_wallet(&self) -> Option<String> {
        self.user_wallet
            .clone()
            .filter(|w| !w.is_empty())
            .or_else(|| {
                self.data
                    .get("user_wallet")
                    .and_then(Value::as_str)
                    .filter(|w| !w.is_empty())
                    .map(str::to_string)
            })
    }

    /// Read a string field from the JSON payload
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Insert shape for an activity
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub username: String,
    pub activity_type: String,
    pub description: String,
    pub data: Value,
    pub predicted_emission: f64,
    pub transaction_hash: Option<String>,
    pub token_id: Option<i64>,
    pub user_wallet: Option<String>,
    pub marketplace_status: MarketplaceStatus,
}

impl NewActivity {
    pub fn new(username: &str, activity_type: &str, description: &str, data: Value) -> Self {
        Self {
            username: username.to_string(),
            activity_type: activity_type.to_string(),
            description: description.to_string(),
            data,
            predicted_emission: 0.0,
            transaction_hash: None,
            token_id: None,
            user_wallet: None,
            marketplace_status: MarketplaceStatus::NotListed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity(token_id: Option<i64>, hash: Option<&str>) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            username: "demo_user".to_string(),
            activity_type: "tree_planting".to_string(),
            description: "Planted 3 trees".to_string(),
            data: json!({ "user_wallet": "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4" }),
            predicted_emission: 60.0,
            timestamp: chrono::Utc::now().naive_utc(),
            transaction_hash: hash.map(str::to_string),
            token_id,
            user_wallet: None,
            marketplace_status: "not_listed".to_string(),
            listing_price: None,
        }
    }

    #[test]
    fn test_offset_types() {
        assert!(is_offset_type("tree_planting"));
        assert!(is_offset_type("carbon_offset"));
        assert!(!is_offset_type("driving"));
        assert!(!is_offset_type("marketplace_purchase"));
    }

    #[test]
    fn test_usable_wallet() {
        assert!(is_usable_wallet(Some("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4")));
        assert!(!is_usable_wallet(Some(ZERO_WALLET)));
        assert!(!is_usable_wallet(Some("")));
        assert!(!is_usable_wallet(None));
    }

    #[test]
    fn test_co2_grams_truncates() {
        let mut a = activity(None, None);
        a.predicted_emission = 4.2;
        assert_eq!(a.co2_grams(), 4200);
        a.predicted_emission = 0.0015;
        assert_eq!(a.co2_grams(), 1);
    }

    #[test]
    fn test_tradeable_excludes_status_messages() {
        assert!(activity(Some(1), Some("0xabc")).is_tradeable());
        assert!(!activity(Some(1), Some("Error: reverted")).is_tradeable());
        assert!(!activity(Some(1), Some("Emission logged (no NFT for emitting activities)")).is_tradeable());
        assert!(!activity(None, Some("0xabc")).is_tradeable());
    }

    #[test]
    fn test_owner_wallet_falls_back_to_payload() {
        let a = activity(Some(1), Some("0xabc"));
        assert_eq!(
            a.owner_wallet().as_deref(),
            Some("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4")
        );
    }

    #[test]
    fn test_marketplace_status_round_trip() {
        for status in [MarketplaceStatus::NotListed, MarketplaceStatus::Listed, MarketplaceStatus::Sold] {
            assert_eq!(MarketplaceStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(MarketplaceStatus::from_str("pending").is_err());
    }

    #[test]
    fn test_serializes_username_as_user() {
        let json = serde_json::to_value(activity(None, None)).unwrap();
        assert_eq!(json["user"], "demo_user");
        assert!(json.get("username").is_none());
        assert!(json["listing_price"].is_null());
    }
}
