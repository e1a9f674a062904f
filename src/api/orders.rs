use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{created, deleted, ok, ApiResponse, AppState, Deleted, ValidJson};
use crate::db::orders::{CheckoutCustomer, NewOrder, OrderDetail, OrderFilter, OrderRow, StatusChange};
use crate::db::{self, Page, PageRequest};
use crate::domain::aggregates::{OrderStatus, PaymentStatus, PricingRules};
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CustomerDetails {
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
}

impl From<CustomerDetails> for CheckoutCustomer {
    fn from(c: CustomerDetails) -> Self {
        Self {
            email: c.email,
            name: c.name.filter(|n| !n.trim().is_empty()),
            phone: c.phone.filter(|p| !p.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 100))]
    pub items: Vec<OrderLine>,
    #[validate]
    pub customer: CustomerDetails,
    #[serde(default)]
    pub shipping_address: serde_json::Value,
    pub coupon_code: Option<String>,
    pub payment_method: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Checkout details without line items, used when the items come from a
/// stored cart.
#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutDetails {
    #[validate]
    pub customer: CustomerDetails,
    #[serde(default)]
    pub shipping_address: serde_json::Value,
    pub coupon_code: Option<String>,
    pub payment_method: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl CheckoutDetails {
    pub(super) fn into_new_order(self, items: Vec<(Uuid, u32)>) -> NewOrder {
        NewOrder {
            items,
            customer: self.customer.into(),
            shipping_address: self.shipping_address,
            coupon_code: self.coupon_code,
            payment_method: self.payment_method.filter(|m| !m.trim().is_empty()),
            notes: self.notes,
            cart_session: None,
        }
    }
}

/// Runs checkout and publishes the resulting events.
pub(super) async fn place(state: &AppState, new_order: NewOrder) -> Result<OrderDetail> {
    let rules = PricingRules::from(&state.config.store);
    let (detail, events) = db::orders::place_order(&state.pool, new_order, state.currency(), rules).await?;
    tracing::info!(
        order_id = %detail.order.id,
        order_number = %detail.order.order_number,
        total = detail.order.total,
        "order placed"
    );
    state.publisher.publish_all(events).await;
    Ok(detail)
}

pub async fn create_order(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>)> {
    let items = req.items.iter().map(|line| (line.product_id, line.quantity)).collect();
    let details = CheckoutDetails {
        customer: req.customer,
        shipping_address: req.shipping_address,
        coupon_code: req.coupon_code,
        payment_method: req.payment_method,
        notes: req.notes,
    };
    let detail = place(&state, details.into_new_order(items)).await?;
    Ok(created(detail))
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub customer_id: Option<Uuid>,
    pub search: Option<String>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<ApiResponse<Page<OrderRow>>>> {
    let page = PageRequest::new(query.page, query.per_page);
    let filter = OrderFilter {
        status: query.status.as_deref().map(OrderStatus::parse).transpose()?,
        payment_status: query.payment_status.as_deref().map(PaymentStatus::parse).transpose()?,
        customer_id: query.customer_id,
        search: query.search,
    };
    let (items, total) = db::orders::list_orders(&state.pool, &filter, page).await?;
    Ok(ok(Page::new(items, total, page)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetail>>> {
    db::orders::get_order(&state.pool, id)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("order"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusUpdateRequest {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    #[validate(length(max = 100))]
    pub tracking_number: Option<String>,
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<OrderDetail>>> {
    if req.status.is_none() && req.payment_status.is_none() && req.tracking_number.is_none() {
        return Err(StoreError::validation(
            "provide at least one of status, payment_status or tracking_number",
        ));
    }
    let change = StatusChange {
        status: req.status.as_deref().map(OrderStatus::parse).transpose()?,
        payment_status: req.payment_status.as_deref().map(PaymentStatus::parse).transpose()?,
        tracking_number: req.tracking_number,
    };

    let (detail, events) = db::orders::update_order_status(&state.pool, id, change).await?;
    tracing::info!(
        order_id = %id,
        status = %detail.order.status,
        payment_status = %detail.order.payment_status,
        "order updated"
    );
    state.publisher.publish_all(events).await;
    Ok(ok(detail))
}

pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Deleted>>> {
    deleted(db::orders::delete_order(&state.pool, id).await?, "order")
}
