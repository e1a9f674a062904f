//! Queries for the `coupons` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::PageRequest;
use crate::domain::coupon::{Coupon, DiscountType};
use crate::error::{Result, StoreError};

const COLUMNS: &str = "id, code, discount_type, value, min_order_amount, usage_limit, used_count, \
     starts_at, expires_at, is_active, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CouponRow {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub value: i64,
    pub min_order_amount: i64,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CouponRow {
    pub fn to_coupon(&self) -> Result<Coupon> {
        Ok(Coupon {
            code: self.code.clone(),
            discount_type: DiscountType::parse(&self.discount_type)?,
            value: self.value,
            min_order_amount: self.min_order_amount,
            usage_limit: self.usage_limit,
            used_count: self.used_count,
            starts_at: self.starts_at,
            expires_at: self.expires_at,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CouponValues {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: i64,
    pub min_order_amount: i64,
    pub usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

pub async fn list_coupons(
    pool: &PgPool,
    active: Option<bool>,
    page: PageRequest,
) -> Result<(Vec<CouponRow>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM coupons WHERE ($1::BOOLEAN IS NULL OR is_active = $1)",
    )
    .bind(active)
    .fetch_one(pool)
    .await?;
    let rows = sqlx::query_as::<_, CouponRow>(&format!(
        "SELECT {COLUMNS} FROM coupons WHERE ($1::BOOLEAN IS NULL OR is_active = $1) \
         ORDER BY created_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(active)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;
    Ok((rows, total))
}

pub async fn get_coupon(pool: &PgPool, id: Uuid) -> Result<Option<CouponRow>> {
    let row = sqlx::query_as::<_, CouponRow>(&format!("SELECT {COLUMNS} FROM coupons WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<CouponRow>> {
    let row = sqlx::query_as::<_, CouponRow>(&format!("SELECT {COLUMNS} FROM coupons WHERE code = $1"))
        .bind(code)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Same as [`find_by_code`] but row-locked for the rest of the transaction.
pub async fn lock_by_code(conn: &mut PgConnection, code: &str) -> Result<Option<CouponRow>> {
    let row = sqlx::query_as::<_, CouponRow>(&format!(
        "SELECT {COLUMNS} FROM coupons WHERE code = $1 FOR UPDATE"
    ))
    .bind(code)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn increment_usage(conn: &mut PgConnection, code: &str) -> Result<()> {
    sqlx::query("UPDATE coupons SET used_count = used_count + 1, updated_at = NOW() WHERE code = $1")
        .bind(code)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_coupon<'c, E>(executor: E, values: &CouponValues) -> Result<CouponRow>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    insert_unless_taken(executor, values)
        .await?
        .ok_or_else(|| StoreError::conflict("coupon code already exists"))
}

/// `None` when the code already belongs to another coupon.
pub async fn insert_unless_taken<'c, E>(executor: E, values: &CouponValues) -> Result<Option<CouponRow>>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query_as::<_, CouponRow>(&format!(
        "INSERT INTO coupons (id, code, discount_type, value, min_order_amount, usage_limit, \
                              starts_at, expires_at, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (code) DO NOTHING RETURNING {COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(&values.code)
    .bind(values.discount_type.as_str())
    .bind(values.value)
    .bind(values.min_order_amount)
    .bind(values.usage_limit)
    .bind(values.starts_at)
    .bind(values.expires_at)
    .bind(values.is_active)
    .fetch_optional(executor)
    .await
    .map_err(|e| StoreError::from_db(e, "coupon"))
}

pub async fn update_coupon(pool: &PgPool, id: Uuid, values: &CouponValues) -> Result<Option<CouponRow>> {
    let row = sqlx::query_as::<_, CouponRow>(&format!(
        "UPDATE coupons SET code = $2, discount_type = $3, value = $4, min_order_amount = $5, \
                usage_limit = $6, starts_at = $7, expires_at = $8, is_active = $9, updated_at = NOW() \
         WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(&values.code)
    .bind(values.discount_type.as_str())
    .bind(values.value)
    .bind(values.min_order_amount)
    .bind(values.usage_limit)
    .bind(values.starts_at)
    .bind(values.expires_at)
    .bind(values.is_active)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "coupon code"))?;
    Ok(row)
}

pub async fn delete_coupon(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM coupons WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
