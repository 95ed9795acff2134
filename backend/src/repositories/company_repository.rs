use crate::error::RepositoryError;
use crate::models::{Company, NewProfile};
use sqlx::PgPool;
use uuid::Uuid;

const COMPANY_COLUMNS: &str =
    "id, company_name, gstin, email, password_hash, wallet_address, created_at";

/// Repository for company accounts
pub struct CompanyRepository {
    pool: PgPool,
}

impl CompanyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new company together with its profile
    pub async fn create(
        &self,
        company_name: &str,
        gstin: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Company, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let company = sqlx::query_as::<_, Company>(&format!(
            r#"
            INSERT INTO companies (company_name, gstin, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {COMPANY_COLUMNS}
            "#
        ))
        .bind(company_name)
        .bind(gstin)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await?;

        let profile = NewProfile::named(company_name);
        sqlx::query("INSERT INTO profiles (company_id, display_name) VALUES ($1, $2)")
            .bind(company.id)
            .bind(&profile.display_name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(company)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Company>, RepositoryError> {
        let company = sqlx::query_as::<_, Company>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(company)
    }

    pub async fn find_by_name(&self, company_name: &str) -> Result<Option<Company>, RepositoryError> {
        let company = sqlx::query_as::<_, Company>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE company_name = $1"
        ))
        .bind(company_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(company)
    }

    /// Find any company already holding the name, the GSTIN or the email
    pub async fn find_conflicting(
        &self,
        company_name: &str,
        gstin: &str,
        email: &str,
    ) -> Result<Option<Company>, RepositoryError> {
        let company = sqlx::query_as::<_, Company>(&format!(
            r#"
            SELECT {COMPANY_COLUMNS}
            FROM companies
            WHERE company_name = $1 OR gstin = $2 OR email = $3
            LIMIT 1
            "#
        ))
        .bind(company_name)
        .bind(gstin)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(company)
    }

    pub async fn update_wallet(&self, id: Uuid, wallet_address: &str) -> Result<Company, RepositoryError> {
        let company = sqlx::query_as::<_, Company>(&format!(
            "UPDATE companies SET wallet_address = $2 WHERE id = $1 RETURNING {COMPANY_COLUMNS}"
        ))
        .bind(id)
        .bind(wallet_address)
        .fetch_one(&self.pool)
        .await?;

        Ok(company)
    }
}
