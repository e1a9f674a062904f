//! Queries for the `marketplace_configs` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

const COLUMNS: &str = "id, marketplace, shop_name, credentials, is_enabled, auto_sync, last_sync_at, \
     last_sync_status, last_sync_message, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MarketplaceRow {
    pub id: Uuid,
    pub marketplace: String,
    pub shop_name: String,
    pub credentials: serde_json::Value,
    pub is_enabled: bool,
    pub auto_sync: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<String>,
    pub last_sync_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MarketplaceValues {
    pub shop_name: String,
    /// `None` keeps the stored credentials.
    pub credentials: Option<serde_json::Value>,
    pub is_enabled: bool,
    pub auto_sync: bool,
}

pub async fn list_marketplaces(pool: &PgPool) -> Result<Vec<MarketplaceRow>> {
    let rows = sqlx::query_as::<_, MarketplaceRow>(&format!(
        "SELECT {COLUMNS} FROM marketplace_configs ORDER BY marketplace"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_marketplace(pool: &PgPool, marketplace: &str) -> Result<Option<MarketplaceRow>> {
    let row = sqlx::query_as::<_, MarketplaceRow>(&format!(
        "SELECT {COLUMNS} FROM marketplace_configs WHERE marketplace = $1"
    ))
    .bind(marketplace)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn upsert_marketplace(
    pool: &PgPool,
    marketplace: &str,
    values: &MarketplaceValues,
) -> Result<MarketplaceRow> {
    sqlx::query_as::<_, MarketplaceRow>(&format!(
        "INSERT INTO marketplace_configs (id, marketplace, shop_name, credentials, is_enabled, auto_sync) \
         VALUES ($1, $2, $3, COALESCE($4, '{{}}'::jsonb), $5, $6) \
         ON CONFLICT (marketplace) DO UPDATE SET \
             shop_name = EXCLUDED.shop_name, \
             credentials = COALESCE($4, marketplace_configs.credentials), \
             is_enabled = EXCLUDED.is_enabled, \
             auto_sync = EXCLUDED.auto_sync, \
             updated_at = NOW() \
         RETURNING {COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(marketplace)
    .bind(&values.shop_name)
    .bind(values.credentials.as_ref())
    .bind(values.is_enabled)
    .bind(values.auto_sync)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "marketplace"))
}

pub async fn record_sync(
    pool: &PgPool,
    marketplace: &str,
    status: &str,
    message: &str,
) -> Result<Option<MarketplaceRow>> {
    let row = sqlx::query_as::<_, MarketplaceRow>(&format!(
        "UPDATE marketplace_configs SET last_sync_at = NOW(), last_sync_status = $2, \
                last_sync_message = $3, updated_at = NOW() \
         WHERE marketplace = $1 RETURNING {COLUMNS}"
    ))
    .bind(marketplace)
    .bind(status)
    .bind(message)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn delete_marketplace(pool: &PgPool, marketplace: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM marketplace_configs WHERE marketplace = $1")
        .bind(marketplace)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
