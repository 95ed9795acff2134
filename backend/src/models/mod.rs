//! Domain models for the CarbonSmart backend.
//!
//! This module contains all database-backed models representing
//! accounts, logged activities and carbon goals.

pub mod activity;
pub mod carbon_goal;
pub mod company;
pub mod profile;
pub mod user;

// Re-export all models for convenient access
pub use activity::{
    is_offset_type, is_usable_wallet, Activity, MarketplaceStatus, NewActivity,
    MARKETPLACE_PURCHASE, OFFSET_ACTIVITY_TYPES, ZERO_WALLET,
};
pub use carbon_goal::{CarbonGoal, NewCarbonGoal};
pub use company::Company;
pub use profile::{AccountType, NewProfile, Profile, ProfileIncrement, XP_PER_LEVEL};
pub use user::User;
