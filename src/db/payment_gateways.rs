//! Queries for the `payment_gateways` table.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentGatewayRow {
    pub provider: String,
    pub display_name: String,
    pub is_enabled: bool,
    pub test_mode: bool,
    pub credentials: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GatewayValues {
    pub display_name: String,
    pub is_enabled: bool,
    pub test_mode: bool,
    /// `None` keeps the stored credentials.
    pub credentials: Option<serde_json::Value>,
}

pub async fn list_gateways(pool: &PgPool) -> Result<Vec<PaymentGatewayRow>> {
    let rows = sqlx::query_as::<_, PaymentGatewayRow>(
        "SELECT provider, display_name, is_enabled, test_mode, credentials, created_at, updated_at \
         FROM payment_gateways ORDER BY provider",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `(provider, display_name)` of every enabled gateway.
pub async fn list_enabled(pool: &PgPool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT provider, display_name FROM payment_gateways WHERE is_enabled ORDER BY provider",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `(provider, is_enabled)` of every configured gateway.
pub async fn configured_providers(conn: &mut PgConnection) -> Result<Vec<(String, bool)>> {
    let rows = sqlx::query_as::<_, (String, bool)>("SELECT provider, is_enabled FROM payment_gateways")
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub async fn upsert_gateway(pool: &PgPool, provider: &str, values: &GatewayValues) -> Result<PaymentGatewayRow> {
    sqlx::query_as::<_, PaymentGatewayRow>(
        "INSERT INTO payment_gateways (provider, display_name, is_enabled, test_mode, credentials) \
         VALUES ($1, $2, $3, $4, COALESCE($5, '{}'::jsonb)) \
         ON CONFLICT (provider) DO UPDATE SET \
             display_name = EXCLUDED.display_name, \
             is_enabled = EXCLUDED.is_enabled, \
             test_mode = EXCLUDED.test_mode, \
             credentials = COALESCE($5, payment_gateways.credentials), \
             updated_at = NOW() \
         RETURNING provider, display_name, is_enabled, test_mode, credentials, created_at, updated_at",
    )
    .bind(provider)
    .bind(&values.display_name)
    .bind(values.is_enabled)
    .bind(values.test_mode)
    .bind(values.credentials.as_ref())
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "payment gateway"))
}

pub async fn delete_gateway(pool: &PgPool, provider: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM payment_gateways WHERE provider = $1")
        .bind(provider)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
