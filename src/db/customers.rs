//! Queries for the `customers` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{like_pattern, PageRequest};
use crate::error::{Result, StoreError};

/// A customer with lifetime order totals. Cancelled and refunded orders do
/// not count towards `total_spent`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CustomerRow {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: serde_json::Value,
    pub notes: Option<String>,
    pub order_count: i64,
    pub total_spent: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CustomerValues {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: serde_json::Value,
    pub notes: Option<String>,
}

const SELECT_WITH_STATS: &str = "SELECT c.id, c.email, c.name, c.phone, c.address, c.notes, \
            COUNT(o.id) AS order_count, \
            COALESCE(SUM(o.total) FILTER (WHERE o.status NOT IN ('cancelled', 'refunded')), 0)::BIGINT AS total_spent, \
            c.created_at, c.updated_at \
     FROM customers c LEFT JOIN orders o ON o.customer_id = c.id";

fn push_search(qb: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
    if let Some(search) = search.filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" WHERE (c.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

pub async fn list_customers(
    pool: &PgPool,
    search: Option<&str>,
    page: PageRequest,
) -> Result<(Vec<CustomerRow>, i64)> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM customers c");
    push_search(&mut count, search);
    let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut query = QueryBuilder::new(SELECT_WITH_STATS);
    push_search(&mut query, search);
    query
        .push(" GROUP BY c.id ORDER BY c.created_at DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows = query.build_query_as::<CustomerRow>().fetch_all(pool).await?;
    Ok((rows, total))
}

pub async fn get_customer(pool: &PgPool, id: Uuid) -> Result<Option<CustomerRow>> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!("{SELECT_WITH_STATS} WHERE c.id = $1 GROUP BY c.id"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn insert_customer(pool: &PgPool, values: &CustomerValues) -> Result<Uuid> {
    sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO customers (id, email, name, phone, address, notes) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(&values.email)
    .bind(values.name.as_deref())
    .bind(values.phone.as_deref())
    .bind(&values.address)
    .bind(values.notes.as_deref())
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "customer with this email"))
}

pub async fn update_customer(pool: &PgPool, id: Uuid, values: &CustomerValues) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE customers SET email = $2, name = $3, phone = $4, address = $5, notes = $6, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(&values.email)
    .bind(values.name.as_deref())
    .bind(values.phone.as_deref())
    .bind(&values.address)
    .bind(values.notes.as_deref())
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "customer with this email"))?;
    Ok(result.rows_affected() > 0)
}

/// Refused with a conflict while orders still reference the customer.
pub async fn delete_customer(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM customers WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| StoreError::from_db(e, "customer with orders"))?;
    Ok(result.rows_affected() > 0)
}

/// Finds or creates the customer for a checkout. Name and phone are only
/// filled in, never overwritten with blanks.
pub async fn upsert_by_email(
    conn: &mut PgConnection,
    email: &str,
    name: Option<&str>,
    phone: Option<&str>,
) -> Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO customers (id, email, name, phone) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (email) DO UPDATE SET \
             name = COALESCE(EXCLUDED.name, customers.name), \
             phone = COALESCE(EXCLUDED.phone, customers.phone), \
             updated_at = NOW() \
         RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(email)
    .bind(name)
    .bind(phone)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn count_customers(pool: &PgPool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM customers").fetch_one(pool).await?;
    Ok(count)
}
