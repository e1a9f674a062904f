//! Queries for the `store_settings` key/value table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::Result;

/// Keys with this prefix are readable without authentication.
pub const PUBLIC_PREFIX: &str = "public.";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SettingRow {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

pub async fn list_settings(pool: &PgPool) -> Result<Vec<SettingRow>> {
    let rows = sqlx::query_as::<_, SettingRow>("SELECT key, value, updated_at FROM store_settings ORDER BY key")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn list_public(pool: &PgPool) -> Result<Vec<SettingRow>> {
    let rows = sqlx::query_as::<_, SettingRow>(
        "SELECT key, value, updated_at FROM store_settings WHERE starts_with(key, $1) ORDER BY key",
    )
    .bind(PUBLIC_PREFIX)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn upsert_setting(pool: &PgPool, key: &str, value: &serde_json::Value) -> Result<SettingRow> {
    let row = sqlx::query_as::<_, SettingRow>(
        "INSERT INTO store_settings (key, value) VALUES ($1, $2) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW() \
         RETURNING key, value, updated_at",
    )
    .bind(key)
    .bind(value)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn delete_setting(pool: &PgPool, key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM store_settings WHERE key = $1").bind(key).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
