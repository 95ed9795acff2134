use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Experience granted for every logged activity
pub const XP_PER_ACTIVITY: i32 = 25;

/// Experience needed per level
pub const XP_PER_LEVEL: i32 = 250;

/// Which kind of account a session or profile belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    User,
    Company,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::User => "user",
            AccountType::Company => "company",
        }
    }
}

/// Gamified impact profile attached to a user or a company
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub display_name: String,
    pub bio: Option<String>,
    pub total_emissions: f64,
    pub credits_earned: i32,
    pub level: i32,
    pub xp: i32,
    pub updated_at: NaiveDateTime,
}

impl Profile {
    /// Level reached with the given amount of experience
    pub fn level_for_xp(xp: i32) -> i32 {
        1 + xp.max(0) / XP_PER_LEVEL
    }

    pub fn account_type(&self) -> AccountType {
        if self.company_id.is_some() {
            AccountType::Company
        } else {
            AccountType::User
        }
    }
}

/// Counter changes caused by one logged activity, applied in a single UPDATE
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileIncrement {
    pub emissions_kg: f64,
    pub credits: i32,
    pub xp: i32,
}

impl ProfileIncrement {
    /// Offsets never add to `total_emissions`; a minted credit bumps
    /// `credits_earned`.
    pub fn for_activity(emission_kg: f64, is_offset: bool, minted: bool) -> Self {
        Self {
            emissions_kg: if is_offset { 0.0 } else { emission_kg },
            credits: i32::from(minted),
            xp: XP_PER_ACTIVITY,
        }
    }
}

/// Initial profile values written alongside a new account
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub display_name: String,
    pub bio: Option<String>,
    pub total_emissions: f64,
    pub credits_earned: i32,
    pub level: i32,
    pub xp: i32,
}

impl NewProfile {
    /// Fresh profile showing only a display name
    pub fn named(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            bio: None,
            total_emissions: 0.0,
            credits_earned: 0,
            level: 1,
            xp: 0,
        }
    }
}
