use crate::chain::CreditLedger;
use crate::error::AppResult;
use crate::models::{is_offset_type, is_usable_wallet, Activity, NewActivity, ProfileIncrement};
use crate::repositories::{ActivityRepository, ProfileRepository};
use crate::services::prediction::{fallback_estimate, EmissionPredictor, PredictionRequest};
use crate::services::AuditTrailService;
use crate::websocket::{WebSocketServer, WsMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stored in place of a hash for activities that add emissions
pub const EMISSION_LOGGED: &str = "Emission logged (no NFT for emitting activities)";

/// Stored in place of a hash for offsets submitted without a wallet
pub const NO_WALLET_CONNECTED: &str = "No wallet connected";

fn anonymous() -> String {
    "anonymous".to_string()
}

fn unknown() -> String {
    "unknown".to_string()
}

/// Fields read from a log request; the raw payload is stored alongside
#[derive(Debug, Clone, Deserialize)]
pub struct LogActivityRequest {
    #[serde(default = "anonymous")]
    pub user: String,
    #[serde(default = "unknown")]
    pub activity_type: String,
    #[serde(default, alias = "description")]
    pub activity: String,
    #[serde(default)]
    pub is_offset: bool,
    #[serde(default)]
    pub user_wallet: Option<String>,
}

impl LogActivityRequest {
    /// Offsets are flagged by the client or implied by the type
    pub fn is_offset(&self) -> bool {
        self.is_offset || is_offset_type(&self.activity_type)
    }
}

/// What happens on-chain for a freshly logged activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditStep {
    Mint { wallet: String },
    Emission,
    NoWallet,
}

impl CreditStep {
    pub fn decide(is_offset: bool, wallet: Option<&str>) -> Self {
        if !is_offset {
            return CreditStep::Emission;
        }
        match wallet {
            Some(w) if is_usable_wallet(Some(w)) => CreditStep::Mint {
                wallet: w.to_string(),
            },
            _ => CreditStep::NoWallet,
        }
    }
}

/// Response body of `POST /api/log/`
#[derive(Debug, Clone, Serialize)]
pub struct LoggedActivity {
    #[serde(flatten)]
    pub activity: Activity,
    pub is_offset: bool,
    /// Explorer link for a minted credit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

/// Logs activities, predicts their emissions and mints credits for offsets
pub struct ActivityService {
    activity_repo: Arc<ActivityRepository>,
    profile_repo: Arc<ProfileRepository>,
    predictor: Arc<dyn EmissionPredictor>,
    ledger: Arc<dyn CreditLedger>,
    ws_server: WebSocketServer,
    audit: Arc<AuditTrailService>,
}

impl ActivityService {
    pub fn new(
        activity_repo: Arc<ActivityRepository>,
        profile_repo: Arc<ProfileRepository>,
        predictor: Arc<dyn EmissionPredictor>,
        ledger: Arc<dyn CreditLedger>,
        ws_server: WebSocketServer,
        audit: Arc<AuditTrailService>,
    ) -> Self {
        Self {
            activity_repo,
            profile_repo,
            predictor,
            ledger,
            ws_server,
            audit,
        }
    }

    /// Emission in kg CO2e, from the AI engine or the local fallback
    pub async fn predict(&self, activity_type: &str, activity: &str) -> f64 {
        let request = PredictionRequest {
            activity: activity.to_string(),
            activity_type: activity_type.to_string(),
        };

        match self.predictor.predict(&request).await {
            Ok(emission) => emission,
            Err(e) => {
                warn!("AI engine unavailable, using fallback estimate: {}", e);
                fallback_estimate(activity_type, activity)
            }
        }
    }

    /// Log an activity from a raw JSON payload
    pub async fn log_activity(&self, payload: Value) -> AppResult<LoggedActivity> {
        let request: LogActivityRequest = serde_json::from_value(payload.clone())?;
        let is_offset = request.is_offset();

        info!(
            "Logging activity: user={}, type={}, offset={}",
            request.user, request.activity_type, is_offset
        );

        let predicted_emission = self.predict(&request.activity_type, &request.activity).await;

        let mut new_activity = NewActivity::new(
            &request.user,
            &request.activity_type,
            &request.activity,
            payload,
        );
        new_activity.predicted_emission = predicted_emission;
        new_activity.user_wallet = request.user_wallet.clone().filter(|w| !w.is_empty());

        let activity = self.activity_repo.create(&new_activity).await?;

        let (activity, minted) = match CreditStep::decide(is_offset, request.user_wallet.as_deref()) {
            CreditStep::Mint { wallet } => self.mint_for(activity, &wallet).await?,
            CreditStep::Emission => (
                self.activity_repo
                    .update_chain_result(activity.id, EMISSION_LOGGED, None)
                    .await?,
                false,
            ),
            CreditStep::NoWallet => (
                self.activity_repo
                    .update_chain_result(activity.id, NO_WALLET_CONNECTED, None)
                    .await?,
                false,
            ),
        };

        let increment = ProfileIncrement::for_activity(activity.predicted_emission, is_offset, minted);
        if let Some(profile) = self.profile_repo.add_activity(&activity.username, &increment).await? {
            debug!("Profile {} now at {} xp, level {}", profile.id, profile.xp, profile.level);
        }

        self.ws_server
            .broadcast_to_user(
                &activity.username,
                WsMessage::ActivityLogged {
                    activity_id: activity.id.to_string(),
                    user: activity.username.clone(),
                    activity_type: activity.activity_type.clone(),
                    predicted_emission: activity.predicted_emission,
                    is_offset,
                },
            )
            .await;

        let explorer_url = if minted {
            activity
                .transaction_hash
                .as_deref()
                .and_then(|hash| self.ledger.explorer_tx_url(hash))
        } else {
            None
        };

        Ok(LoggedActivity {
            activity,
            is_offset,
            explorer_url,
        })
    }

    /// Mint the credit for an offset; a chain failure is stored, not raised
    async fn mint_for(&self, activity: Activity, wallet: &str) -> AppResult<(Activity, bool)> {
        let co2_grams = activity.co2_grams().max(0) as u64;

        match self
            .ledger
            .mint_credit(wallet, co2_grams, &activity.activity_type)
            .await
        {
            Ok(receipt) => {
                let token_id = receipt.token_id.map(|id| id as i64);
                let updated = self
                    .activity_repo
                    .update_chain_result(activity.id, &receipt.transaction_hash, token_id)
                    .await?;

                info!(
                    "Minted credit {:?} for activity {}: {}",
                    receipt.token_id, updated.id, receipt.transaction_hash
                );

                self.audit
                    .log_credit_minted(&updated, wallet, &receipt.transaction_hash)
                    .await;

                let message = WsMessage::CreditMinted {
                    activity_id: updated.id.to_string(),
                    user: updated.username.clone(),
                    wallet: wallet.to_string(),
                    token_id: receipt.token_id,
                    co2_grams,
                    transaction_hash: receipt.transaction_hash.clone(),
                };
                self.ws_server.broadcast_to_wallet(wallet, message.clone()).await;
                self.ws_server.broadcast_to_user(&updated.username, message).await;

                Ok((updated, true))
            }
            Err(e) => {
                warn!("Minting failed for activity {}: {}", activity.id, e);
                let updated = self
                    .activity_repo
                    .update_chain_result(activity.id, &format!("Error: {}", e), None)
                    .await?;
                Ok((updated, false))
            }
        }
    }

    /// All activities of a user, newest first
    pub async fn get_user_activities(&self, username: &str) -> AppResult<Vec<Activity>> {
        Ok(self.activity_repo.find_by_user(username).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ZERO_WALLET;
    use serde_json::json;

    const WALLET: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4";

    #[test]
    fn test_request_defaults() {
        let request: LogActivityRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request.user, "anonymous");
        assert_eq!(request.activity_type, "unknown");
        assert_eq!(request.activity, "");
        assert!(!request.is_offset());
    }

    #[test]
    fn test_offset_flag_or_type() {
        let typed: LogActivityRequest =
            serde_json::from_value(json!({ "activity_type": "recycling" })).unwrap();
        assert!(typed.is_offset());

        let flagged: LogActivityRequest = serde_json::from_value(
            json!({ "activity_type": "driving", "is_offset": true, "activity": "carpool" }),
        )
        .unwrap();
        assert!(flagged.is_offset());
    }

    #[test]
    fn test_credit_step() {
        assert_eq!(
            CreditStep::decide(true, Some(WALLET)),
            CreditStep::Mint {
                wallet: WALLET.to_string()
            }
        );
        assert_eq!(CreditStep::decide(true, Some(ZERO_WALLET)), CreditStep::NoWallet);
        assert_eq!(CreditStep::decide(true, None), CreditStep::NoWallet);
        assert_eq!(CreditStep::decide(false, Some(WALLET)), CreditStep::Emission);
    }

    #[test]
    fn test_logged_activity_shape() {
        let activity = Activity {
            id: uuid::Uuid::new_v4(),
            username: "demo_user".to_string(),
            activity_type: "driving".to_string(),
            description: "drove 20 km".to_string(),
            data: json!({ "user": "demo_user", "activity": "drove 20 km" }),
            predicted_emission: 4.0,
            timestamp: chrono::Utc::now().naive_utc(),
            transaction_hash: Some(EMISSION_LOGGED.to_string()),
            token_id: None,
            user_wallet: None,
            marketplace_status: "not_listed".to_string(),
            listing_price: None,
        };

        let json = serde_json::to_value(LoggedActivity {
            activity,
            is_offset: false,
            explorer_url: None,
        })
        .unwrap();

        for key in [
            "id",
            "user",
            "activity_type",
            "data",
            "predicted_emission",
            "timestamp",
            "transaction_hash",
            "token_id",
            "user_wallet",
            "is_offset",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["is_offset"], false);
        assert!(json.get("explorer_url").is_none());
    }
}
