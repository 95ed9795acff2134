//! CarbonSmart Backend Library
//!
//! This module exposes the backend components for use by the server, the
//! admin CLI and tests.

pub mod auth;
pub mod chain;
pub mod config;
pub mod database;
pub mod error;
pub mod http_service;
pub mod models;
pub mod repositories;
pub mod services;
pub mod websocket;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use http_service::create_router;

use auth::SessionManager;
use chain::CreditLedger;
use database::Database;
use repositories::*;
use services::*;
use std::sync::Arc;
use websocket::WebSocketServer;

/// Application state containing all repositories, shared clients and services
pub struct AppState {
    pub config: AppConfig,
    pub database: Database,
    pub user_repo: Arc<UserRepository>,
    pub company_repo: Arc<CompanyRepository>,
    pub profile_repo: Arc<ProfileRepository>,
    pub activity_repo: Arc<ActivityRepository>,
    pub goal_repo: Arc<GoalRepository>,
    pub ledger: Arc<dyn CreditLedger>,
    pub predictor: Arc<dyn EmissionPredictor>,
    pub ws_server: WebSocketServer,
    pub audit: Arc<AuditTrailService>,
    pub account_service: AccountService,
    pub activity_service: ActivityService,
    pub marketplace_service: MarketplaceService,
    pub dashboard_service: DashboardService,
    pub goal_service: GoalService,
}

impl AppState {
    /// Wire repositories and services around the shared clients
    pub fn new(
        config: AppConfig,
        pool: sqlx::PgPool,
        ledger: Arc<dyn CreditLedger>,
        predictor: Arc<dyn EmissionPredictor>,
        audit: AuditTrailService,
    ) -> Self {
        let database = Database::new(pool.clone());
        let user_repo = Arc::new(UserRepository::new(pool.clone()));
        let company_repo = Arc::new(CompanyRepository::new(pool.clone()));
        let profile_repo = Arc::new(ProfileRepository::new(pool.clone()));
        let activity_repo = Arc::new(ActivityRepository::new(pool.clone()));
        let goal_repo = Arc::new(GoalRepository::new(pool));
        let ws_server = WebSocketServer::new();
        let audit = Arc::new(audit);

        let account_service = AccountService::new(
            user_repo.clone(),
            company_repo.clone(),
            profile_repo.clone(),
            SessionManager::new(&config.auth),
            audit.clone(),
        );
        let activity_service = ActivityService::new(
            activity_repo.clone(),
            profile_repo.clone(),
            predictor.clone(),
            ledger.clone(),
            ws_server.clone(),
            audit.clone(),
        );
        let marketplace_service = MarketplaceService::new(
            activity_repo.clone(),
            ledger.clone(),
            ws_server.clone(),
            audit.clone(),
        );
        let dashboard_service = DashboardService::new(activity_repo.clone());
        let goal_service = GoalService::new(goal_repo.clone(), activity_repo.clone());

        Self {
            config,
            database,
            user_repo,
            company_repo,
            profile_repo,
            activity_repo,
            goal_repo,
            ledger,
            predictor,
            ws_server,
            audit,
            account_service,
            activity_service,
            marketplace_service,
            dashboard_service,
            goal_service,
        }
    }

    pub fn seed_service(&self) -> SeedService {
        SeedService::new(
            self.user_repo.clone(),
            self.activity_repo.clone(),
            self.goal_repo.clone(),
        )
    }
}
