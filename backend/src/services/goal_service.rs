use crate::error::{AppError, AppResult};
use crate::models::{is_offset_type, Activity, CarbonGoal, NewCarbonGoal, MARKETPLACE_PURCHASE};
use crate::repositories::{ActivityRepository, GoalRepository};
use crate::services::prediction::round2;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// How a user stands against one goal
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub goal: CarbonGoal,
    pub emissions: f64,
    pub on_track: bool,
    pub remaining: f64,
    pub activity_count: usize,
}

/// Only emitting activities count against a budget
fn counts_against_goal(activity: &Activity) -> bool {
    let offset_flag = activity
        .data
        .get("is_offset")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    !offset_flag
        && !is_offset_type(&activity.activity_type)
        && activity.activity_type != MARKETPLACE_PURCHASE
}

impl GoalProgress {
    pub fn compute(goal: CarbonGoal, activities: &[Activity]) -> Self {
        let counted: Vec<&Activity> = activities
            .iter()
            .filter(|a| goal.contains(a.timestamp) && counts_against_goal(a))
            .collect();
        let emissions = round2(counted.iter().map(|a| a.predicted_emission).sum());

        Self {
            on_track: emissions <= goal.target_emission,
            remaining: round2((goal.target_emission - emissions).max(0.0)),
            activity_count: counted.len(),
            emissions,
            goal,
        }
    }
}

pub struct GoalService {
    goal_repo: Arc<GoalRepository>,
    activity_repo: Arc<ActivityRepository>,
}

impl GoalService {
    pub fn new(goal_repo: Arc<GoalRepository>, activity_repo: Arc<ActivityRepository>) -> Self {
        Self {
            goal_repo,
            activity_repo,
        }
    }

    pub async fn list(&self, active_only: bool) -> AppResult<Vec<CarbonGoal>> {
        Ok(self.goal_repo.list(active_only).await?)
    }

    pub async fn create(&self, goal: NewCarbonGoal) -> AppResult<CarbonGoal> {
        goal.validate().map_err(AppError::Validation)?;
        let created = self.goal_repo.create(&goal).await?;
        info!("Goal created: {} (target {} kg)", created.title, created.target_emission);
        Ok(created)
    }

    /// Progress of a user against every active goal
    pub async fn progress(&self, username: &str) -> AppResult<Vec<GoalProgress>> {
        let goals = self.goal_repo.list(true).await?;
        let mut progress = Vec::with_capacity(goals.len());

        for goal in goals {
            let activities = self
                .activity_repo
                .find_by_user_between(username, goal.start_date, goal.end_date)
                .await?;
            progress.push(GoalProgress::compute(goal, &activities));
        }

        Ok(progress)
    }
}
