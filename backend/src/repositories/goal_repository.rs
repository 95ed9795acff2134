use crate::error::RepositoryError;
use crate::models::{CarbonGoal, NewCarbonGoal};
use sqlx::PgPool;

const GOAL_COLUMNS: &str =
    "id, title, description, target_emission, start_date, end_date, is_active, created_at";

/// Repository for carbon goals
pub struct GoalRepository {
    pool: PgPool,
}

impl GoalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, goal: &NewCarbonGoal) -> Result<CarbonGoal, RepositoryError> {
        goal.validate().map_err(RepositoryError::InvalidInput)?;

        let created = sqlx::query_as::<_, CarbonGoal>(&format!(
            r#"
            INSERT INTO carbon_goals (title, description, target_emission, start_date, end_date, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {GOAL_COLUMNS}
            "#
        ))
        .bind(&goal.title)
        .bind(&goal.description)
        .bind(goal.target_emission)
        .bind(goal.start_date)
        .bind(goal.end_date)
        .bind(goal.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// List goals ordered by start date
    pub async fn list(&self, active_only: bool) -> Result<Vec<CarbonGoal>, RepositoryError> {
        let goals = sqlx::query_as::<_, CarbonGoal>(&format!(
            r#"
            SELECT {GOAL_COLUMNS}
            FROM carbon_goals
            WHERE ($1 = FALSE OR is_active = TRUE)
            ORDER BY start_date ASC, created_at ASC
            "#
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(goals)
    }

    /// Look up a goal by title; seeding uses this to stay idempotent
    pub async fn find_by_title(&self, title: &str) -> Result<Option<CarbonGoal>, RepositoryError> {
        let goal = sqlx::query_as::<_, CarbonGoal>(&format!(
            "SELECT {GOAL_COLUMNS} FROM carbon_goals WHERE title = $1 LIMIT 1"
        ))
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        Ok(goal)
    }
}
