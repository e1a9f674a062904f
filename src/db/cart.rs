//! Queries for the session-keyed `cart_items` table.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem};
use crate::domain::value_objects::Money;
use crate::error::{Result, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct CartLine {
    product_id: Uuid,
    name: String,
    sku: String,
    image: Option<String>,
    quantity: i32,
    price: i64,
    currency: String,
    stock: i32,
}

/// Loads the cart with current product names, prices and stock.
pub async fn load_cart(pool: &PgPool, session_id: &str, currency: &str) -> Result<Cart> {
    let lines = sqlx::query_as::<_, CartLine>(
        "SELECT c.product_id, p.name, p.sku, p.images[1] AS image, c.quantity, p.price, p.currency, p.stock \
         FROM cart_items c JOIN products p ON p.id = c.product_id \
         WHERE c.session_id = $1 ORDER BY c.created_at, c.id",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    let mut cart = Cart::new(session_id, currency);
    for line in lines {
        cart.add_item(CartItem {
            product_id: line.product_id,
            name: line.name,
            sku: line.sku,
            image: line.image,
            quantity: u32::try_from(line.quantity).unwrap_or(0),
            unit_price: Money::from_minor(line.price, &line.currency),
            available: u32::try_from(line.stock).unwrap_or(0),
        });
    }
    Ok(cart)
}

/// Adds `quantity` units, merging with an existing line. Only active
/// products can be added.
pub async fn add_item(pool: &PgPool, session_id: &str, product_id: Uuid, quantity: i32) -> Result<()> {
    let status = sqlx::query_scalar::<_, String>("SELECT status FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound("product"))?;
    if status != "active" {
        return Err(StoreError::validation("product is not available for sale"));
    }

    sqlx::query(
        "INSERT INTO cart_items (id, session_id, product_id, quantity) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (session_id, product_id) DO UPDATE SET \
             quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = NOW()",
    )
    .bind(Uuid::now_v7())
    .bind(session_id)
    .bind(product_id)
    .bind(quantity)
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "cart item"))?;
    Ok(())
}

pub async fn set_quantity(pool: &PgPool, session_id: &str, product_id: Uuid, quantity: i32) -> Result<()> {
    if quantity <= 0 {
        remove_item(pool, session_id, product_id).await?;
        return Ok(());
    }
    sqlx::query(
        "UPDATE cart_items SET quantity = $3, updated_at = NOW() WHERE session_id = $1 AND product_id = $2",
    )
    .bind(session_id)
    .bind(product_id)
    .bind(quantity)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_item(pool: &PgPool, session_id: &str, product_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM cart_items WHERE session_id = $1 AND product_id = $2")
        .bind(session_id)
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn clear<'c, E>(executor: E, session_id: &str) -> Result<u64>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let result = sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
        .bind(session_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
