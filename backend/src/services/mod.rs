pub mod account_service;
pub mod activity_service;
pub mod audit;
pub mod dashboard;
pub mod goal_service;
pub mod marketplace_service;
pub mod prediction;
pub mod seed;

pub use account_service::AccountService;
pub use activity_service::ActivityService;
pub use audit::AuditTrailService;
pub use dashboard::DashboardService;
pub use goal_service::GoalService;
pub use marketplace_service::MarketplaceService;
pub use prediction::{AiEngineClient, EmissionPredictor, RuleBasedPredictor};
pub use seed::SeedService;
