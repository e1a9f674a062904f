//! Queries for `orders` and `order_items`, including the checkout
//! transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{cart, coupons, customers, like_pattern, payment_gateways, PageRequest};
use crate::domain::aggregates::{
    FulfillmentStatus, LineItem, Order, OrderStatus, PaymentStatus, PricingRules,
};
use crate::domain::coupon::normalize_code;
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Money;
use crate::error::{Result, StoreError};

const COLUMNS: &str = "id, order_number, customer_id, customer_email, customer_name, customer_phone, \
     status, payment_status, fulfillment_status, payment_method, subtotal, discount, shipping, tax, \
     total, currency, coupon_code, shipping_address, notes, tracking_number, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub fulfillment_status: String,
    pub payment_method: Option<String>,
    pub subtotal: i64,
    pub discount: i64,
    pub shipping: i64,
    pub tax: i64,
    pub total: i64,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub shipping_address: serde_json::Value,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn to_aggregate(&self) -> Result<Order> {
        Ok(Order::restore(
            self.id,
            self.order_number.clone(),
            &self.currency,
            OrderStatus::parse(&self.status)?,
            PaymentStatus::parse(&self.payment_status)?,
            FulfillmentStatus::parse(&self.fulfillment_status)?,
            self.tracking_number.clone(),
        ))
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderRow,
    pub items: Vec<OrderItemRow>,
}

#[derive(Debug, Default, Clone)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub customer_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutCustomer {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub items: Vec<(Uuid, u32)>,
    pub customer: CheckoutCustomer,
    pub shipping_address: serde_json::Value,
    pub coupon_code: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    /// Cart emptied in the same transaction once the order is written.
    pub cart_session: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct StatusChange {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub tracking_number: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct LockedProduct {
    id: Uuid,
    sku: String,
    name: String,
    price: i64,
    currency: String,
    stock: i32,
    status: String,
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(payment) = filter.payment_status {
        qb.push(" AND payment_status = ").push_bind(payment.as_str());
    }
    if let Some(customer_id) = filter.customer_id {
        qb.push(" AND customer_id = ").push_bind(customer_id);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (order_number ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR customer_email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

pub async fn list_orders(
    pool: &PgPool,
    filter: &OrderFilter,
    page: PageRequest,
) -> Result<(Vec<OrderRow>, i64)> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM orders");
    push_filters(&mut count, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut query = QueryBuilder::new(format!("SELECT {COLUMNS} FROM orders"));
    push_filters(&mut query, filter);
    query
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows = query.build_query_as::<OrderRow>().fetch_all(pool).await?;
    Ok((rows, total))
}

pub async fn get_order(pool: &PgPool, id: Uuid) -> Result<Option<OrderDetail>> {
    let Some(order) = sqlx::query_as::<_, OrderRow>(&format!("SELECT {COLUMNS} FROM orders WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };
    let items = list_items(pool, id).await?;
    Ok(Some(OrderDetail { order, items }))
}

async fn list_items(pool: &PgPool, order_id: Uuid) -> Result<Vec<OrderItemRow>> {
    let items = sqlx::query_as::<_, OrderItemRow>(
        "SELECT id, product_id, sku, name, quantity, unit_price, total \
         FROM order_items WHERE order_id = $1 ORDER BY name, id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;
    Ok(items)
}

pub async fn recent_for_customer(pool: &PgPool, customer_id: Uuid, limit: i64) -> Result<Vec<OrderRow>> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC LIMIT $2"
    ))
    .bind(customer_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Checkout. Everything happens in one transaction: products are locked,
/// stock is decremented, the coupon is redeemed, the customer is upserted,
/// the order with its item snapshots is written and the source cart, if
/// any, is emptied.
pub async fn place_order(
    pool: &PgPool,
    new_order: NewOrder,
    currency: &str,
    rules: PricingRules,
) -> Result<(OrderDetail, Vec<DomainEvent>)> {
    let mut quantities: BTreeMap<Uuid, u32> = BTreeMap::new();
    for (product_id, quantity) in &new_order.items {
        if *quantity == 0 {
            return Err(StoreError::validation("item quantity must be at least 1"));
        }
        let entry = quantities.entry(*product_id).or_default();
        *entry = entry.saturating_add(*quantity);
    }
    if quantities.is_empty() {
        return Err(StoreError::validation("order has no items"));
    }

    let mut tx = pool.begin().await?;

    let payment_method = check_payment_method(&mut *tx, new_order.payment_method.as_deref()).await?;

    let ids: Vec<Uuid> = quantities.keys().copied().collect();
    let locked = sqlx::query_as::<_, LockedProduct>(
        "SELECT id, sku, name, price, currency, stock, status FROM products \
         WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&ids)
    .fetch_all(&mut *tx)
    .await?;

    let mut order = Order::create(next_order_number(&mut *tx).await?, currency, rules);
    for (product_id, quantity) in &quantities {
        let product = locked
            .iter()
            .find(|p| p.id == *product_id)
            .ok_or(StoreError::NotFound("product"))?;
        if product.status != "active" {
            return Err(StoreError::validation(format!("{} is not available for sale", product.name)));
        }
        if i64::from(product.stock) < i64::from(*quantity) {
            return Err(StoreError::conflict(format!(
                "insufficient stock for {} ({} available)",
                product.sku, product.stock
            )));
        }
        order.add_item(LineItem {
            product_id: product.id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            quantity: *quantity,
            unit_price: Money::from_minor(product.price, &product.currency),
        })?;
    }

    let coupon_code = new_order.coupon_code.as_deref().map(normalize_code).filter(|c| !c.is_empty());
    if let Some(code) = &coupon_code {
        let row = coupons::lock_by_code(&mut *tx, code)
            .await?
            .ok_or_else(|| StoreError::validation(format!("coupon {code} does not exist")))?;
        let coupon = row.to_coupon()?;
        coupon.check(order.subtotal(), Utc::now())?;
        order.apply_coupon(coupon);
        coupons::increment_usage(&mut *tx, code).await?;
    }

    for item in order.items() {
        let quantity = i32::try_from(item.quantity)
            .map_err(|_| StoreError::validation("item quantity is too large"))?;
        sqlx::query("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1")
            .bind(item.product_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
    }

    let email = new_order.customer.email.trim().to_lowercase();
    let customer_id = customers::upsert_by_email(
        &mut *tx,
        &email,
        new_order.customer.name.as_deref(),
        new_order.customer.phone.as_deref(),
    )
    .await?;

    // Conflicts on the number leave the transaction usable, so a taken
    // number is swapped for the next sequence value.
    let mut inserted = None;
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        inserted = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (id, order_number, customer_id, customer_email, customer_name, customer_phone, \
                                 status, payment_status, fulfillment_status, payment_method, subtotal, discount, \
                                 shipping, tax, total, currency, coupon_code, shipping_address, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) \
             ON CONFLICT (order_number) DO NOTHING \
             RETURNING {COLUMNS}"
        ))
        .bind(order.id())
        .bind(order.order_number())
        .bind(customer_id)
        .bind(&email)
        .bind(new_order.customer.name.as_deref())
        .bind(new_order.customer.phone.as_deref())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.fulfillment_status().as_str())
        .bind(payment_method.as_deref())
        .bind(order.subtotal().to_minor())
        .bind(order.discount().to_minor())
        .bind(order.shipping().to_minor())
        .bind(order.tax().to_minor())
        .bind(order.total().to_minor())
        .bind(order.currency())
        .bind(coupon_code.as_deref())
        .bind(&new_order.shipping_address)
        .bind(new_order.notes.as_deref())
        .fetch_optional(&mut *tx)
        .await?;
        if inserted.is_some() {
            break;
        }
        tracing::warn!(order_number = order.order_number(), "order number taken, drawing another");
        order.renumber(next_order_number(&mut *tx).await?);
    }
    let row = inserted.ok_or_else(|| StoreError::conflict("could not allocate an order number"))?;
    order.place()?;

    let mut items = Vec::with_capacity(order.items().len());
    for item in order.items() {
        let item_row = sqlx::query_as::<_, OrderItemRow>(
            "INSERT INTO order_items (id, order_id, product_id, sku, name, quantity, unit_price, total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, product_id, sku, name, quantity, unit_price, total",
        )
        .bind(Uuid::now_v7())
        .bind(order.id())
        .bind(item.product_id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(i32::try_from(item.quantity).unwrap_or(i32::MAX))
        .bind(item.unit_price.to_minor())
        .bind(item.total().to_minor())
        .fetch_one(&mut *tx)
        .await?;
        items.push(item_row);
    }

    if let Some(session) = &new_order.cart_session {
        cart::clear(&mut *tx, session).await?;
    }

    tx.commit().await?;

    Ok((OrderDetail { order: row, items }, order.take_events()))
}

const ORDER_NUMBER_ATTEMPTS: usize = 5;

async fn next_order_number(conn: &mut PgConnection) -> Result<String> {
    let sequence = sqlx::query_scalar::<_, i64>("SELECT nextval('order_number_seq')")
        .fetch_one(conn)
        .await?;
    Ok(Order::format_order_number(Utc::now().date_naive(), sequence))
}

/// With no gateway configured any method (or none) is accepted. Otherwise
/// the method must name an enabled gateway.
async fn check_payment_method(conn: &mut PgConnection, method: Option<&str>) -> Result<Option<String>> {
    let configured = payment_gateways::configured_providers(&mut *conn).await?;
    if configured.is_empty() {
        return Ok(method.map(str::to_string));
    }
    let method = method.ok_or_else(|| StoreError::validation("payment_method is required"))?;
    if configured.iter().any(|(provider, enabled)| provider == method && *enabled) {
        Ok(Some(method.to_string()))
    } else {
        Err(StoreError::validation(format!("payment method '{method}' is not available")))
    }
}

/// Applies a status, payment or tracking change. Moving into `cancelled`
/// or `refunded` from an open status puts the items back in stock.
pub async fn update_order_status(
    pool: &PgPool,
    id: Uuid,
    change: StatusChange,
) -> Result<(OrderDetail, Vec<DomainEvent>)> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound("order"))?;

    let mut order = row.to_aggregate()?;
    if change.tracking_number.is_some() {
        order.set_tracking_number(change.tracking_number);
    }
    if let Some(status) = change.status {
        let effect = order.set_status(status)?;
        if effect.restock {
            restock(&mut *tx, id).await?;
        }
    }
    if let Some(payment) = change.payment_status {
        order.set_payment_status(payment);
    }

    sqlx::query(
        "UPDATE orders SET status = $2, payment_status = $3, fulfillment_status = $4, \
                tracking_number = $5, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(order.status().as_str())
    .bind(order.payment_status().as_str())
    .bind(order.fulfillment_status().as_str())
    .bind(order.tracking_number())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let detail = get_order(pool, id).await?.ok_or(StoreError::NotFound("order"))?;
    Ok((detail, order.take_events()))
}

async fn restock(conn: &mut PgConnection, order_id: Uuid) -> Result<()> {
    let result = sqlx::query(
        "UPDATE products p SET stock = p.stock + i.quantity, updated_at = NOW() \
         FROM order_items i WHERE i.order_id = $1 AND i.product_id = p.id",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    tracing::info!(%order_id, products = result.rows_affected(), "restocked order items");
    Ok(())
}

pub async fn delete_order(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
