use crate::error::RepositoryError;
use crate::models::{Profile, ProfileIncrement, XP_PER_LEVEL};
use sqlx::PgPool;
use uuid::Uuid;

/// Profile id for a display handle. A user account wins over a company
/// with the same name.
const PROFILE_ID_BY_HANDLE: &str = r#"
    SELECT p.id
    FROM profiles p
    LEFT JOIN users u ON u.id = p.user_id
    LEFT JOIN companies c ON c.id = p.company_id
    WHERE u.username = $1 OR c.company_name = $1
    ORDER BY p.user_id IS NULL
    LIMIT 1
"#;

const PROFILE_COLUMNS: &str = "p.id, p.user_id, p.company_id, p.display_name, p.bio, \
     p.total_emissions, p.credits_earned, p.level, p.xp, p.updated_at";

/// Repository for user and company profiles
pub struct ProfileRepository {
    pool: PgPool,
}

impl ProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Profile>, RepositoryError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    pub async fn find_by_company(&self, company_id: Uuid) -> Result<Option<Profile>, RepositoryError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.company_id = $1"
        ))
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    /// Activities are logged by display handle, so resolve through either account table
    pub async fn find_by_username(&self, username: &str) -> Result<Option<Profile>, RepositoryError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.id = ({PROFILE_ID_BY_HANDLE})"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    /// Add one activity's counters in place. Concurrent calls for the same
    /// profile serialize on the row lock, so no increment is lost.
    pub async fn add_activity(
        &self,
        username: &str,
        increment: &ProfileIncrement,
    ) -> Result<Option<Profile>, RepositoryError> {
        let updated = sqlx::query_as::<_, Profile>(&format!(
            r#"
            UPDATE profiles p
            SET total_emissions = p.total_emissions + $2,
                credits_earned = p.credits_earned + $3,
                xp = p.xp + $4,
                level = 1 + GREATEST(p.xp + $4, 0) / $5,
                updated_at = NOW()
            WHERE p.id = ({PROFILE_ID_BY_HANDLE})
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(increment.emissions_kg)
        .bind(increment.credits)
        .bind(increment.xp)
        .bind(XP_PER_LEVEL)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }
}
