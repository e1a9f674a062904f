use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::orders::{place, CheckoutDetails};
use super::{created, ok, ApiResponse, AppState, ValidJson};
use crate::db::{self, orders::OrderDetail};
use crate::domain::aggregates::Cart;
use crate::error::{Result, StoreError};

const MAX_SESSION_LEN: usize = 128;

#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub image: Option<String>,
    pub quantity: u32,
    pub unit_price: i64,
    pub line_total: i64,
    pub available: u32,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub session_id: String,
    pub items: Vec<CartLineView>,
    pub item_count: u32,
    pub subtotal: i64,
    pub currency: String,
    pub has_unavailable_items: bool,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            session_id: cart.session_id().to_string(),
            items: cart
                .items()
                .iter()
                .map(|item| CartLineView {
                    product_id: item.product_id,
                    name: item.name.clone(),
                    sku: item.sku.clone(),
                    image: item.image.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price.to_minor(),
                    line_total: item.line_total().to_minor(),
                    available: item.available,
                })
                .collect(),
            item_count: cart.item_count(),
            subtotal: cart.subtotal().to_minor(),
            currency: cart.subtotal().currency().to_string(),
            has_unavailable_items: cart.has_unavailable_items(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(min = 0, max = 1000))]
    pub quantity: i32,
}

fn check_session(session: &str) -> Result<()> {
    if session.trim().is_empty() || session.len() > MAX_SESSION_LEN {
        return Err(StoreError::validation(format!(
            "session id must be 1 to {MAX_SESSION_LEN} characters"
        )));
    }
    Ok(())
}

async fn view(state: &AppState, session: &str) -> Result<Json<ApiResponse<CartView>>> {
    let cart = db::cart::load_cart(&state.pool, session, state.currency()).await?;
    Ok(ok(CartView::from(&cart)))
}

pub async fn get_cart(State(state): State<AppState>, Path(session): Path<String>) -> Result<Json<ApiResponse<CartView>>> {
    check_session(&session)?;
    view(&state, &session).await
}

pub async fn add_item(
    State(state): State<AppState>,
    Path(session): Path<String>,
    ValidJson(req): ValidJson<AddItemRequest>,
) -> Result<Json<ApiResponse<CartView>>> {
    check_session(&session)?;
    db::cart::add_item(&state.pool, &session, req.product_id, req.quantity).await?;
    view(&state, &session).await
}

pub async fn update_item(
    State(state): State<AppState>,
    Path((session, product_id)): Path<(String, Uuid)>,
    ValidJson(req): ValidJson<UpdateItemRequest>,
) -> Result<Json<ApiResponse<CartView>>> {
    check_session(&session)?;
    let mut cart = db::cart::load_cart(&state.pool, &session, state.currency()).await?;
    let quantity = u32::try_from(req.quantity).unwrap_or(0);
    cart.update_quantity(product_id, quantity)?;
    db::cart::set_quantity(&state.pool, &session, product_id, req.quantity).await?;
    Ok(ok(CartView::from(&cart)))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Path((session, product_id)): Path<(String, Uuid)>,
) -> Result<Json<ApiResponse<CartView>>> {
    check_session(&session)?;
    if !db::cart::remove_item(&state.pool, &session, product_id).await? {
        return Err(StoreError::NotFound("cart item"));
    }
    view(&state, &session).await
}

pub async fn clear_cart(State(state): State<AppState>, Path(session): Path<String>) -> Result<Json<ApiResponse<CartView>>> {
    check_session(&session)?;
    let removed = db::cart::clear(&state.pool, &session).await?;
    tracing::debug!(session = %session, removed, "cart cleared");
    view(&state, &session).await
}

/// Places an order for everything in the cart; the cart is emptied in the
/// same transaction.
pub async fn checkout(
    State(state): State<AppState>,
    Path(session): Path<String>,
    ValidJson(req): ValidJson<CheckoutDetails>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>)> {
    check_session(&session)?;
    let cart = db::cart::load_cart(&state.pool, &session, state.currency()).await?;
    if cart.is_empty() {
        return Err(StoreError::validation("cart is empty"));
    }
    let items = cart.items().iter().map(|item| (item.product_id, item.quantity)).collect();

    let mut new_order = req.into_new_order(items);
    new_order.cart_session = Some(session);
    let detail = place(&state, new_order).await?;
    Ok(created(detail))
}
