use crate::error::{AppError, AppResult};
use crate::models::Activity;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Chain hash used before the first entry of a file
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: i64,
    pub event_type: String, // "credit_minted", "listing_created", "listing_sold", ...
    pub actor: Option<String>,
    pub wallet: Option<String>,
    pub details: serde_json::Value,
    /// Hash of the previous entry
    pub prev_hash: String,
    /// SHA-256 over `prev_hash` and this entry's content
    pub hash: String,
}

impl AuditLogEntry {
    fn compute_hash(
        prev_hash: &str,
        timestamp: i64,
        event_type: &str,
        actor: Option<&str>,
        wallet: Option<&str>,
        details: &serde_json::Value,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prev_hash.as_bytes());
        hasher.update(timestamp.to_be_bytes());
        hasher.update(event_type.as_bytes());
        hasher.update(actor.unwrap_or_default().as_bytes());
        hasher.update(wallet.unwrap_or_default().as_bytes());
        hasher.update(details.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// True when the stored hash matches the entry's content
    pub fn is_intact(&self) -> bool {
        self.hash
            == Self::compute_hash(
                &self.prev_hash,
                self.timestamp,
                &self.event_type,
                self.actor.as_deref(),
                self.wallet.as_deref(),
                &self.details,
            )
    }
}

struct AuditState {
    file: std::fs::File,
    last_hash: String,
}

/// Append-only JSON-lines audit trail, one file per day
pub struct AuditTrailService {
    log_file: PathBuf,
    state: Arc<Mutex<AuditState>>,
}

impl AuditTrailService {
    /// Create a new audit trail service
    pub fn new(log_directory: PathBuf) -> AppResult<Self> {
        std::fs::create_dir_all(&log_directory)
            .map_err(|e| AppError::Message(format!("Failed to create log directory: {}", e)))?;

        let date = chrono::Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("audit_{}.log", date));

        // Continue the chain if today's file already has entries
        let last_hash = last_hash_in(&log_file).unwrap_or_else(|| GENESIS_HASH.to_string());

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| AppError::Message(format!("Failed to open audit log file: {}", e)))?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            log_file,
            state: Arc::new(Mutex::new(AuditState { file, last_hash })),
        })
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Append an entry, chaining it to the previous one
    pub async fn log(
        &self,
        event_type: &str,
        actor: Option<&str>,
        wallet: Option<&str>,
        details: serde_json::Value,
    ) -> AppResult<AuditLogEntry> {
        let mut state = self.state.lock().await;

        let timestamp = chrono::Utc::now().timestamp();
        let hash = AuditLogEntry::compute_hash(
            &state.last_hash,
            timestamp,
            event_type,
            actor,
            wallet,
            &details,
        );

        let entry = AuditLogEntry {
            timestamp,
            event_type: event_type.to_string(),
            actor: actor.map(str::to_string),
            wallet: wallet.map(str::to_string),
            details,
            prev_hash: state.last_hash.clone(),
            hash,
        };

        let json = serde_json::to_string(&entry)?;
        writeln!(state.file, "{}", json)?;
        state.file.flush()?;

        state.last_hash = entry.hash.clone();
        Ok(entry)
    }

    /// Audit failures never abort the request that triggered them
    async fn record(
        &self,
        event_type: &str,
        actor: Option<&str>,
        wallet: Option<&str>,
        details: serde_json::Value,
    ) {
        if let Err(e) = self.log(event_type, actor, wallet, details).await {
            warn!("Audit log write failed for {}: {}", event_type, e);
        }
    }

    pub async fn log_signup(&self, account: &str, account_type: &str) {
        self.record(
            "account_created",
            Some(account),
            None,
            serde_json::json!({ "account_type": account_type }),
        )
        .await
    }

    pub async fn log_wallet_linked(&self, account: &str, wallet: &str) {
        self.record("wallet_linked", Some(account), Some(wallet), serde_json::json!({}))
            .await
    }

    pub async fn log_credit_minted(&self, activity: &Activity, wallet: &str, tx_hash: &str) {
        self.record(
            "credit_minted",
            Some(&activity.username),
            Some(wallet),
            serde_json::json!({
                "activity_id": activity.id.to_string(),
                "activity_type": activity.activity_type,
                "token_id": activity.token_id,
                "co2_grams": activity.co2_grams(),
                "tx_hash": tx_hash,
            }),
        )
        .await
    }

    pub async fn log_listing_created(&self, listing: &Activity, seller: &str) {
        self.record(
            "listing_created",
            Some(seller),
            listing.user_wallet.as_deref(),
            serde_json::json!({
                "listing_id": listing.id.to_string(),
                "token_id": listing.token_id,
                "price_eth": listing.listing_price.map(|p| p.to_string()),
            }),
        )
        .await
    }

    pub async fn log_listing_sold(&self, listing: &Activity, purchase: &Activity, tx_hash: &str) {
        self.record(
            "listing_sold",
            Some(&purchase.username),
            purchase.user_wallet.as_deref(),
            serde_json::json!({
                "listing_id": listing.id.to_string(),
                "purchase_id": purchase.id.to_string(),
                "token_id": listing.token_id,
                "seller": listing.username,
                "seller_wallet": listing.owner_wallet(),
                "price_eth": listing.listing_price.map(|p| p.to_string()),
                "tx_hash": tx_hash,
            }),
        )
        .await
    }
}

/// Hash of the last entry in an existing log file
fn last_hash_in(path: &Path) -> Option<String> {
    let file = std::fs::File::open(path).ok()?;
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter(|line| !line.trim().is_empty())
        .last()
        .and_then(|line| serde_json::from_str::<AuditLogEntry>(&line).ok())
        .map(|entry| entry.hash)
}

/// Verify every entry in a log file and its links; returns the entry count
pub fn verify_log_file(path: &Path) -> AppResult<usize> {
    let file = std::fs::File::open(path)
        .map_err(|e| AppError::Message(format!("Failed to open audit log: {}", e)))?;

    let mut prev = GENESIS_HASH.to_string();
    let mut count = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditLogEntry = serde_json::from_str(&line)?;
        if entry.prev_hash != prev || !entry.is_intact() {
            return Err(AppError::Message(format!(
                "Audit chain broken at line {}",
                index + 1
            )));
        }
        prev = entry.hash;
        count += 1;
    }

    Ok(count)
}
