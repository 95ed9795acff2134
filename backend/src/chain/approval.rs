//! Owner-side approval helpers.
//!
//! A seller grants the marketplace operator the right to move their credits
//! with a single `approve` or `setApprovalForAll` transaction. The helpers
//! never fail; the outcome carries either the tx hash or the error text.

use super::{parse_signer, CreditLedger};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub success: bool,
    #[serde(rename = "txHash", skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApprovalOutcome {
    fn ok(tx_hash: String) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_hash: None,
            error: Some(error.into()),
        }
    }
}

/// Approve `operator` to transfer one credit
pub async fn approve_credit(
    ledger: &dyn CreditLedger,
    owner_key: &str,
    operator: &str,
    token_id: u64,
) -> ApprovalOutcome {
    let owner = match parse_signer(owner_key) {
        Ok(signer) => signer,
        Err(e) => return ApprovalOutcome::failed(e.to_string()),
    };

    match ledger.approve(&owner, operator, token_id).await {
        Ok(tx_hash) => {
            info!("Approved {} for credit #{}: {}", operator, token_id, tx_hash);
            ApprovalOutcome::ok(tx_hash)
        }
        Err(e) => {
            error!("Approval error: {}", e);
            ApprovalOutcome::failed(e.to_string())
        }
    }
}

/// Approve `operator` to transfer every credit the owner holds
pub async fn approve_all_credits(
    ledger: &dyn CreditLedger,
    owner_key: &str,
    operator: &str,
) -> ApprovalOutcome {
    let owner = match parse_signer(owner_key) {
        Ok(signer) => signer,
        Err(e) => return ApprovalOutcome::failed(e.to_string()),
    };

    match ledger.set_approval_for_all(&owner, operator, true).await {
        Ok(tx_hash) => {
            info!("Approved {} for all credits: {}", operator, tx_hash);
            ApprovalOutcome::ok(tx_hash)
        }
        Err(e) => {
            error!("Approval error: {}", e);
            ApprovalOutcome::failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{format_address, SimulatedLedger};

    const OWNER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    #[tokio::test]
    async fn test_approve_credit_reports_hash() {
        let ledger = SimulatedLedger::new();
        let owner = format_address(parse_signer(OWNER_KEY).unwrap().address());
        let operator = ledger.operator_address().unwrap();
        ledger.mint_credit(&owner, 1_000, "tree_planting").await.unwrap();

        let outcome = approve_credit(&ledger, OWNER_KEY, &operator, 1).await;
        assert!(outcome.success);
        assert!(outcome.tx_hash.unwrap().starts_with("0x"));
        assert!(ledger.check_approval(1, &owner).await.unwrap().approved);
    }

    #[tokio::test]
    async fn test_failures_become_error_strings() {
        let ledger = SimulatedLedger::new();
        let operator = ledger.operator_address().unwrap();

        let bad_key = approve_all_credits(&ledger, "not-a-key", &operator).await;
        assert!(!bad_key.success);
        assert!(bad_key.error.unwrap().starts_with("Invalid private key"));

        let missing = approve_credit(&ledger, OWNER_KEY, &operator, 42).await;
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("Token 42 does not exist"));
    }

    #[tokio::test]
    async fn test_approve_all_serializes_camel_case_hash() {
        let ledger = SimulatedLedger::new();
        let operator = ledger.operator_address().unwrap();

        let outcome = approve_all_credits(&ledger, OWNER_KEY, &operator).await;
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], true);
        assert!(json["txHash"].is_string());
        assert!(json.get("error").is_none());
    }
}
