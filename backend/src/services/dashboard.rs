use crate::error::AppResult;
use crate::models::Activity;
use crate::repositories::ActivityRepository;
use crate::services::prediction::round2;
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Number of activities shown in the recent list
pub const RECENT_ACTIVITY_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyEmission {
    pub month: String,
    pub emissions: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TypeEmission {
    #[serde(rename = "type")]
    pub activity_type: String,
    pub emissions: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_emissions: f64,
    pub credits_earned: usize,
    pub total_activities: usize,
    pub monthly_data: Vec<MonthlyEmission>,
    pub activity_type_data: Vec<TypeEmission>,
    pub recent_activities: Vec<Activity>,
}

impl DashboardStats {
    /// Aggregate a user's activities, given newest first
    pub fn from_activities(activities: &[Activity]) -> Self {
        let total_emissions = activities.iter().map(|a| a.predicted_emission).sum();
        let credits_earned = activities
            .iter()
            .filter(|a| a.transaction_hash.as_deref().is_some_and(|h| !h.is_empty()))
            .count();

        // keys compare as strings: "2024-10" sorts before "2024-9"
        let mut monthly: BTreeMap<String, f64> = BTreeMap::new();
        for activity in activities {
            let key = format!("{}-{}", activity.timestamp.year(), activity.timestamp.month());
            *monthly.entry(key).or_default() += activity.predicted_emission;
        }

        // first-seen order
        let mut by_type: Vec<(String, f64)> = Vec::new();
        for activity in activities {
            match by_type.iter_mut().find(|(t, _)| *t == activity.activity_type) {
                Some((_, sum)) => *sum += activity.predicted_emission,
                None => by_type.push((activity.activity_type.clone(), activity.predicted_emission)),
            }
        }

        Self {
            total_emissions,
            credits_earned,
            total_activities: activities.len(),
            monthly_data: monthly
                .into_iter()
                .map(|(month, emissions)| MonthlyEmission {
                    month,
                    emissions: round2(emissions),
                })
                .collect(),
            activity_type_data: by_type
                .into_iter()
                .map(|(activity_type, emissions)| TypeEmission {
                    activity_type,
                    emissions: round2(emissions),
                })
                .collect(),
            recent_activities: activities.iter().take(RECENT_ACTIVITY_COUNT).cloned().collect(),
        }
    }
}

pub struct DashboardService {
    activity_repo: Arc<ActivityRepository>,
}

impl DashboardService {
    pub fn new(activity_repo: Arc<ActivityRepository>) -> Self {
        Self { activity_repo }
    }

    pub async fn stats(&self, username: &str) -> AppResult<DashboardStats> {
        let activities = self.activity_repo.find_by_user(username).await?;
        Ok(DashboardStats::from_activities(&activities))
    }
}
