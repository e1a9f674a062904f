//! Aggregate queries for the admin dashboard.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::customers::count_customers;
use crate::domain::aggregates::OrderStatus;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LowStockProduct {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub stock: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    /// Sum of order totals, excluding cancelled and refunded orders.
    pub revenue: i64,
    pub order_count: i64,
    pub orders_by_status: BTreeMap<String, i64>,
    pub customer_count: i64,
    pub product_count: i64,
    pub low_stock: Vec<LowStockProduct>,
}

pub async fn load_stats(pool: &PgPool, low_stock_threshold: i32) -> Result<DashboardStats> {
    let revenue = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(total), 0)::BIGINT FROM orders WHERE status NOT IN ('cancelled', 'refunded')",
    )
    .fetch_one(pool)
    .await?;

    let by_status = sqlx::query_as::<_, (String, i64)>("SELECT status, COUNT(*) FROM orders GROUP BY status")
        .fetch_all(pool)
        .await?;
    let order_count: i64 = by_status.iter().map(|(_, n)| n).sum();
    let mut orders_by_status: BTreeMap<String, i64> =
        OrderStatus::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    orders_by_status.extend(by_status);

    let product_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products").fetch_one(pool).await?;

    let low_stock = sqlx::query_as::<_, LowStockProduct>(
        "SELECT id, sku, name, stock FROM products \
         WHERE status = 'active' AND stock <= $1 ORDER BY stock, name LIMIT 50",
    )
    .bind(low_stock_threshold)
    .fetch_all(pool)
    .await?;

    Ok(DashboardStats {
        revenue,
        order_count,
        orders_by_status,
        customer_count: count_customers(pool).await?,
        product_count,
        low_stock,
    })
}
