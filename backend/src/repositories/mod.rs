pub mod activity_repository;
pub mod company_repository;
pub mod goal_repository;
pub mod profile_repository;
pub mod user_repository;

// Re-export all repositories for convenient access
pub use activity_repository::ActivityRepository;
pub use company_repository::CompanyRepository;
pub use goal_repository::GoalRepository;
pub use profile_repository::ProfileRepository;
pub use user_repository::UserRepository;
