//! Repository for activities and the marketplace state stored on them

use crate::error::RepositoryError;
use crate::models::{Activity, MarketplaceStatus, NewActivity, MARKETPLACE_PURCHASE};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

const ACTIVITY_COLUMNS: &str = "id, username, activity_type, description, data, \
     predicted_emission, timestamp, transaction_hash, token_id, user_wallet, \
     marketplace_status, listing_price";

pub struct ActivityRepository {
    pool: PgPool,
}

impl ActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new activity
    pub async fn create(&self, activity: &NewActivity) -> Result<Activity, RepositoryError> {
        let created = sqlx::query_as::<_, Activity>(&format!(
            r#"
            INSERT INTO activities (
                username, activity_type, description, data, predicted_emission,
                transaction_hash, token_id, user_wallet, marketplace_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(&activity.username)
        .bind(&activity.activity_type)
        .bind(&activity.description)
        .bind(&activity.data)
        .bind(activity.predicted_emission)
        .bind(&activity.transaction_hash)
        .bind(activity.token_id)
        .bind(&activity.user_wallet)
        .bind(activity.marketplace_status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Find an activity by UUID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Activity>, RepositoryError> {
        let activity = sqlx::query_as::<_, Activity>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(activity)
    }

    /// All activities of a user, newest first
    pub async fn find_by_user(&self, username: &str) -> Result<Vec<Activity>, RepositoryError> {
        let activities = sqlx::query_as::<_, Activity>(&format!(
            r#"
            SELECT {ACTIVITY_COLUMNS}
            FROM activities
            WHERE username = $1
            ORDER BY timestamp DESC
            "#
        ))
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    /// Record the outcome of the credit step: a tx hash, or a status message
    pub async fn update_chain_result(
        &self,
        id: Uuid,
        transaction_hash: &str,
        token_id: Option<i64>,
    ) -> Result<Activity, RepositoryError> {
        let activity = sqlx::query_as::<_, Activity>(&format!(
            r#"
            UPDATE activities
            SET transaction_hash = $2, token_id = COALESCE($3, token_id)
            WHERE id = $1
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(transaction_hash)
        .bind(token_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(activity)
    }

    /// Listed credits, newest first
    pub async fn find_listed(&self) -> Result<Vec<Activity>, RepositoryError> {
        let activities = sqlx::query_as::<_, Activity>(&format!(
            r#"
            SELECT {ACTIVITY_COLUMNS}
            FROM activities
            WHERE token_id IS NOT NULL
                AND transaction_hash IS NOT NULL
                AND transaction_hash NOT LIKE 'Error%'
                AND transaction_hash NOT LIKE 'Emission%'
                AND marketplace_status = 'listed'
            ORDER BY timestamp DESC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    /// The activity holding a token for the given wallet.
    ///
    /// A token can appear on several rows once it has been resold; the most
    /// recent row is the current holding.
    pub async fn find_by_token_and_wallet(
        &self,
        token_id: i64,
        wallet: &str,
    ) -> Result<Option<Activity>, RepositoryError> {
        let activity = sqlx::query_as::<_, Activity>(&format!(
            r#"
            SELECT {ACTIVITY_COLUMNS}
            FROM activities
            WHERE token_id = $1 AND LOWER(user_wallet) = LOWER($2) AND marketplace_status <> 'sold'
            ORDER BY timestamp DESC
            LIMIT 1
            "#
        ))
        .bind(token_id)
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await?;

        Ok(activity)
    }

    /// Put a credit up for sale
    pub async fn mark_listed(&self, id: Uuid, price_eth: Decimal) -> Result<Activity, RepositoryError> {
        let activity = sqlx::query_as::<_, Activity>(&format!(
            r#"
            UPDATE activities
            SET marketplace_status = $2, listing_price = $3
            WHERE id = $1
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(MarketplaceStatus::Listed.as_str())
        .bind(price_eth)
        .fetch_one(&self.pool)
        .await?;

        Ok(activity)
    }

    /// Mark a listing sold and record the buyer's purchase in one transaction
    pub async fn record_sale(
        &self,
        listing_id: Uuid,
        purchase: &NewActivity,
    ) -> Result<(Activity, Activity), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let sold = sqlx::query_as::<_, Activity>(&format!(
            r#"
            UPDATE activities
            SET marketplace_status = $2
            WHERE id = $1 AND marketplace_status = 'listed'
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(listing_id)
        .bind(MarketplaceStatus::Sold.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Listing is no longer available".to_string()))?;

        let bought = sqlx::query_as::<_, Activity>(&format!(
            r#"
            INSERT INTO activities (
                username, activity_type, description, data, predicted_emission,
                transaction_hash, token_id, user_wallet, marketplace_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(&purchase.username)
        .bind(&purchase.activity_type)
        .bind(&purchase.description)
        .bind(&purchase.data)
        .bind(purchase.predicted_emission)
        .bind(&purchase.transaction_hash)
        .bind(purchase.token_id)
        .bind(&purchase.user_wallet)
        .bind(purchase.marketplace_status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((sold, bought))
    }

    /// Credits this wallet has sold
    pub async fn find_sold_by_wallet(&self, wallet: &str) -> Result<Vec<Activity>, RepositoryError> {
        let activities = sqlx::query_as::<_, Activity>(&format!(
            r#"
            SELECT {ACTIVITY_COLUMNS}
            FROM activities
            WHERE LOWER(user_wallet) = LOWER($1)
                AND marketplace_status = 'sold'
                AND token_id IS NOT NULL
            ORDER BY timestamp DESC
            "#
        ))
        .bind(wallet)
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    /// Credits this wallet has bought
    pub async fn find_purchases_by_wallet(&self, wallet: &str) -> Result<Vec<Activity>, RepositoryError> {
        let activities = sqlx::query_as::<_, Activity>(&format!(
            r#"
            SELECT {ACTIVITY_COLUMNS}
            FROM activities
            WHERE LOWER(user_wallet) = LOWER($1)
                AND activity_type = $2
                AND token_id IS NOT NULL
            ORDER BY timestamp DESC
            "#
        ))
        .bind(wallet)
        .bind(MARKETPLACE_PURCHASE)
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    /// Activities of a user inside a time window, used for goal progress
    pub async fn find_by_user_between(
        &self,
        username: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Activity>, RepositoryError> {
        let activities = sqlx::query_as::<_, Activity>(&format!(
            r#"
            SELECT {ACTIVITY_COLUMNS}
            FROM activities
            WHERE username = $1 AND timestamp >= $2 AND timestamp <= $3
            ORDER BY timestamp DESC
            "#
        ))
        .bind(username)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    /// Count activities of a user; seeding uses this to stay idempotent
    pub async fn count_by_user(&self, username: &str) -> Result<i64, RepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM activities WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
