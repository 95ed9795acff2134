use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Emission target over a date range
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CarbonGoal {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub target_emission: f64,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl CarbonGoal {
    /// Inclusive on both ends
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.start_date && at <= self.end_date
    }
}

/// Insert shape for a goal
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCarbonGoal {
    pub title: String,
    pub description: Option<String>,
    pub target_emission: f64,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewCarbonGoal {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Goal title is required".to_string());
        }
        if !self.target_emission.is_finite() || self.target_emission < 0.0 {
            return Err("Target emission must be a non-negative number".to_string());
        }
        if self.start_date > self.end_date {
            return Err("Goal start date must not be after its end date".to_string());
        }
        Ok(())
    }
}
