use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};
use crate::models::AccountType;
use alloy::primitives::Signature;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// bcrypt work factor for stored passwords
pub const PASSWORD_HASH_COST: u32 = 10;

/// How far a signed wallet message may drift from the server clock
pub const SIGNATURE_MAX_AGE_SECS: i64 = 300;

static GSTIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z]{1}[1-9A-Z]{1}Z[0-9A-Z]{1}$")
        .expect("GSTIN pattern is valid")
});

/// Check a GSTIN against the registered format
pub fn validate_gstin(gstin: &str) -> AppResult<()> {
    if GSTIN_PATTERN.is_match(gstin) {
        Ok(())
    } else {
        Err(AppError::Validation("Invalid GSTIN format".to_string()))
    }
}

pub fn hash_password(password: &str) -> AppResult<String> {
    Ok(bcrypt::hash(password, PASSWORD_HASH_COST)?)
}

/// Compare a password with a stored hash; a malformed hash never matches
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

/// Session payload, mirroring the fields the browser client reads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub sub: String,
    pub id: Uuid,
    pub username: String,
    #[serde(rename = "walletAddress")]
    pub wallet_address: Option<String>,
    #[serde(rename = "accountType")]
    pub account_type: AccountType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gstin: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Identity a session is issued for
#[derive(Debug, Clone)]
pub struct SessionSubject {
    pub id: Uuid,
    pub username: String,
    pub wallet_address: Option<String>,
    pub account_type: AccountType,
    pub gstin: Option<String>,
}

/// Issues and verifies HS256 session tokens
#[derive(Clone)]
pub struct SessionManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    max_age_secs: i64,
}

impl SessionManager {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.session_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.session_secret.as_bytes()),
            max_age_secs: config.session_max_age_secs as i64,
        }
    }

    pub fn issue(&self, subject: &SessionSubject) -> AppResult<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            sub: subject.id.to_string(),
            id: subject.id,
            username: subject.username.clone(),
            wallet_address: subject.wallet_address.clone(),
            account_type: subject.account_type,
            gstin: subject.gstin.clone(),
            iat: now,
            exp: now + self.max_age_secs,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> AppResult<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized("Invalid or expired session".to_string()))
    }

    /// Verify the bearer token carried by a request
    pub fn from_headers(&self, headers: &HeaderMap) -> AppResult<SessionClaims> {
        let token = bearer_token(headers)?;
        self.verify(token)
    }
}

/// Extract the token from an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing session token".to_string()))
}

/// Create a message to sign for authentication
pub fn create_auth_message(wallet_address: &str, action: &str, timestamp: i64) -> String {
    format!("carbonsmart_auth:{}:{}:{}", wallet_address, action, timestamp)
}

/// Verify an EIP-191 `personal_sign` signature over `message`
pub fn verify_signature(wallet_address: &str, message: &str, signature: &str) -> AppResult<()> {
    let expected = crate::chain::parse_address(wallet_address)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let signature = Signature::from_str(signature.trim())
        .map_err(|e| AppError::Validation(format!("Invalid signature: {}", e)))?;

    let recovered = signature
        .recover_address_from_msg(message)
        .map_err(|e| AppError::Validation(format!("Invalid signature: {}", e)))?;

    if recovered != expected {
        return Err(AppError::Unauthorized(
            "Signature does not match wallet address".to_string(),
        ));
    }

    Ok(())
}

/// Verify authentication message with timestamp
///
/// Checks that:
/// 1. Timestamp is recent (within 5 minutes)
/// 2. Signature was produced by the wallet
pub fn verify_auth_with_timestamp(
    wallet_address: &str,
    action: &str,
    timestamp: i64,
    signature: &str,
) -> AppResult<()> {
    let now = chrono::Utc::now().timestamp();
    if (now - timestamp).abs() > SIGNATURE_MAX_AGE_SECS {
        return Err(AppError::Unauthorized("Signature timestamp expired".to_string()));
    }

    let message = create_auth_message(wallet_address, action, timestamp);
    verify_signature(wallet_address, &message, signature)
}
