use crate::auth::{self, SessionClaims, SessionManager, SessionSubject};
use crate::chain::{format_address, parse_address};
use crate::error::{AppError, AppResult};
use crate::models::{AccountType, Company, NewProfile, Profile, User};
use crate::repositories::{CompanyRepository, ProfileRepository, UserRepository};
use crate::services::AuditTrailService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Action name bound into the signed wallet-link message
pub const LINK_WALLET_ACTION: &str = "link_wallet";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySignupRequest {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub gstin: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSigninRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySigninRequest {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub gstin: String,
    #[serde(default)]
    pub password: String,
}

/// Wallet link proof: `personal_sign` over the auth message at `timestamp`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkWalletRequest {
    pub wallet_address: String,
    pub timestamp: i64,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub account: T,
}

/// Account row with its gamification profile nested under `profile`
#[derive(Debug, Clone, Serialize)]
pub struct WithProfile<T: Serialize> {
    #[serde(flatten)]
    pub account: T,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    pub user: WithProfile<User>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyAccount {
    pub company: WithProfile<Company>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SigninResponse {
    pub success: bool,
    pub token: String,
    pub session: SessionClaims,
}

/// Either kind of account, serialized without its password hash
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Account {
    User(User),
    Company(Company),
}

impl Account {
    fn subject(&self) -> SessionSubject {
        match self {
            Account::User(user) => SessionSubject {
                id: user.id,
                username: user.username.clone(),
                wallet_address: user.wallet_address.clone(),
                account_type: AccountType::User,
                gstin: None,
            },
            Account::Company(company) => SessionSubject {
                id: company.id,
                username: company.company_name.clone(),
                wallet_address: company.wallet_address.clone(),
                account_type: AccountType::Company,
                gstin: Some(company.gstin.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub account_type: AccountType,
    pub account: Account,
    pub profile: Option<Profile>,
}

fn require(fields: &[&str]) -> AppResult<()> {
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(AppError::Validation("All fields are required".to_string()));
    }
    Ok(())
}

impl SignupRequest {
    pub fn validate(&self) -> AppResult<()> {
        require(&[&self.username, &self.email, &self.password])
    }
}

impl CompanySignupRequest {
    pub fn validate(&self) -> AppResult<()> {
        require(&[&self.company_name, &self.gstin, &self.email, &self.password])?;
        auth::validate_gstin(&self.gstin)
    }
}

/// Signup, sign-in, sessions and wallet linking for both account kinds
pub struct AccountService {
    user_repo: Arc<UserRepository>,
    company_repo: Arc<CompanyRepository>,
    profile_repo: Arc<ProfileRepository>,
    sessions: SessionManager,
    audit: Arc<AuditTrailService>,
}

impl AccountService {
    pub fn new(
        user_repo: Arc<UserRepository>,
        company_repo: Arc<CompanyRepository>,
        profile_repo: Arc<ProfileRepository>,
        sessions: SessionManager,
        audit: Arc<AuditTrailService>,
    ) -> Self {
        Self {
            user_repo,
            company_repo,
            profile_repo,
            sessions,
            audit,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Register an individual user
    pub async fn signup(&self, request: SignupRequest) -> AppResult<SignupResponse<UserAccount>> {
        request.validate()?;

        if self
            .user_repo
            .find_by_username_or_email(&request.username, &request.email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }

        let password_hash = auth::hash_password(&request.password)?;
        let user = self
            .user_repo
            .create(
                &request.username,
                &request.email,
                &password_hash,
                None,
                &NewProfile::named(&request.username),
            )
            .await?;

        info!("User signed up: {}", user.username);
        self.audit.log_signup(&user.username, AccountType::User.as_str()).await;
        let profile = self.profile_repo.find_by_user(user.id).await?;

        Ok(SignupResponse {
            success: true,
            message: "User created successfully".to_string(),
            account: UserAccount {
                user: WithProfile {
                    account: user,
                    profile,
                },
            },
        })
    }

    /// Register a company identified by name and GSTIN
    pub async fn company_signup(
        &self,
        request: CompanySignupRequest,
    ) -> AppResult<SignupResponse<CompanyAccount>> {
        request.validate()?;

        if self
            .company_repo
            .find_conflicting(&request.company_name, &request.gstin, &request.email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "Company name, GSTIN, or email already exists".to_string(),
            ));
        }

        let password_hash = auth::hash_password(&request.password)?;
        let company = self
            .company_repo
            .create(&request.company_name, &request.gstin, &request.email, &password_hash)
            .await?;

        info!("Company registered: {} ({})", company.company_name, company.gstin);
        self.audit
            .log_signup(&company.company_name, AccountType::Company.as_str())
            .await;
        let profile = self.profile_repo.find_by_company(company.id).await?;

        Ok(SignupResponse {
            success: true,
            message: "Company registered successfully".to_string(),
            account: CompanyAccount {
                company: WithProfile {
                    account: company,
                    profile,
                },
            },
        })
    }

    pub async fn signin_user(&self, request: UserSigninRequest) -> AppResult<SigninResponse> {
        if request.username.is_empty() || request.password.is_empty() {
            return Err(AppError::Validation("Missing credentials".to_string()));
        }

        let user = self
            .user_repo
            .find_by_username(&request.username)
            .await?
            .filter(|user| auth::verify_password(&request.password, &user.password_hash))
            .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

        self.open_session(Account::User(user))
    }

    /// Companies sign in with their name, their GSTIN and the account password
    pub async fn signin_company(&self, request: CompanySigninRequest) -> AppResult<SigninResponse> {
        if request.company_name.is_empty() || request.gstin.is_empty() {
            return Err(AppError::Validation("Missing company credentials".to_string()));
        }

        let company = self
            .company_repo
            .find_by_name(&request.company_name)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Company not found".to_string()))?;

        if company.gstin != request.gstin {
            return Err(AppError::Unauthorized("Invalid GSTIN".to_string()));
        }
        if !auth::verify_password(&request.password, &company.password_hash) {
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }

        self.open_session(Account::Company(company))
    }

    fn open_session(&self, account: Account) -> AppResult<SigninResponse> {
        let subject = account.subject();
        let token = self.sessions.issue(&subject)?;
        let session = self.sessions.verify(&token)?;

        info!("Session opened: {} ({})", subject.username, subject.account_type.as_str());

        Ok(SigninResponse {
            success: true,
            token,
            session,
        })
    }

    async fn load_account(&self, claims: &SessionClaims) -> AppResult<Account> {
        let account = match claims.account_type {
            AccountType::User => self.user_repo.find_by_id(claims.id).await?.map(Account::User),
            AccountType::Company => self
                .company_repo
                .find_by_id(claims.id)
                .await?
                .map(Account::Company),
        };
        account.ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    /// Account and gamified profile behind a session
    pub async fn profile(&self, claims: &SessionClaims) -> AppResult<ProfileResponse> {
        let account = self.load_account(claims).await?;
        let profile = match &account {
            Account::User(user) => self.profile_repo.find_by_user(user.id).await?,
            Account::Company(company) => self.profile_repo.find_by_company(company.id).await?,
        };

        Ok(ProfileResponse {
            account_type: claims.account_type,
            account,
            profile,
        })
    }

    /// Attach a wallet after verifying the owner signed the link message.
    ///
    /// Returns a fresh session carrying the new wallet.
    pub async fn link_wallet(
        &self,
        claims: &SessionClaims,
        request: LinkWalletRequest,
    ) -> AppResult<SigninResponse> {
        auth::verify_auth_with_timestamp(
            &request.wallet_address,
            LINK_WALLET_ACTION,
            request.timestamp,
            &request.signature,
        )?;

        let wallet = format_address(
            parse_address(&request.wallet_address).map_err(|e| AppError::Validation(e.to_string()))?,
        );

        let account = match claims.account_type {
            AccountType::User => Account::User(self.user_repo.update_wallet(claims.id, &wallet).await?),
            AccountType::Company => {
                Account::Company(self.company_repo.update_wallet(claims.id, &wallet).await?)
            }
        };

        info!("Wallet linked: {} -> {}", claims.username, wallet);
        self.audit.log_wallet_linked(&claims.username, &wallet).await;

        self.open_session(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_requires_all_fields() {
        let request = SignupRequest {
            username: "eco_warrior".to_string(),
            email: String::new(),
            password: "test123".to_string(),
        };
        let err = request.validate().unwrap_err();
        assert_eq!(err.to_string(), "All fields are required");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_signup_accepts_any_non_empty_email() {
        let request = SignupRequest {
            username: "eco_warrior".to_string(),
            email: "eco_warrior@localhost".to_string(),
            password: "test123".to_string(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_signup_nests_profile_in_account() {
        let user = User {
            id: uuid::Uuid::new_v4(),
            username: "eco_warrior".to_string(),
            email: "eco@carbonsmart.com".to_string(),
            password_hash: "$2b$10$hash".to_string(),
            wallet_address: None,
            created_at: chrono::Utc::now().naive_utc(),
        };
        let response = SignupResponse {
            success: true,
            message: "User created successfully".to_string(),
            account: UserAccount {
                user: WithProfile {
                    account: user,
                    profile: None,
                },
            },
        };

        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["user"]["username"], "eco_warrior");
        assert!(json["user"].get("passwordHash").is_none());
        assert!(json["user"]["profile"].is_null());
    }

    #[test]
    fn test_company_signup_validates_gstin() {
        let mut request = CompanySignupRequest {
            company_name: "Green Corp".to_string(),
            gstin: "27AAPFU0939F1ZV".to_string(),
            email: "hello@greencorp.in".to_string(),
            password: "secret1".to_string(),
        };
        assert!(request.validate().is_ok());

        request.gstin = "INVALIDGSTIN".to_string();
        let err = request.validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid GSTIN format");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_company_subject_carries_gstin() {
        let company = Company {
            id: uuid::Uuid::new_v4(),
            company_name: "Green Corp".to_string(),
            gstin: "27AAPFU0939F1ZV".to_string(),
            email: "hello@greencorp.in".to_string(),
            password_hash: "$2b$10$hash".to_string(),
            wallet_address: None,
            created_at: chrono::Utc::now().naive_utc(),
        };

        let subject = Account::Company(company.clone()).subject();
        assert_eq!(subject.username, "Green Corp");
        assert_eq!(subject.account_type, AccountType::Company);
        assert_eq!(subject.gstin.as_deref(), Some("27AAPFU0939F1ZV"));

        let json = serde_json::to_value(Account::Company(company)).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["companyName"], "Green Corp");
    }

    #[test]
    fn test_link_wallet_request_is_camel_case() {
        let request: LinkWalletRequest = serde_json::from_value(serde_json::json!({
            "walletAddress": "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4",
            "timestamp": 1_700_000_000,
            "signature": "0xdead",
        }))
        .unwrap();
        assert_eq!(request.timestamp, 1_700_000_000);
    }
}
