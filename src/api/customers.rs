use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{created, deleted, ok, ApiResponse, AppState, Deleted, ValidJson};
use crate::db::customers::{CustomerRow, CustomerValues};
use crate::db::orders::OrderRow;
use crate::db::{self, Page, PageRequest};
use crate::error::{Result, StoreError};

const RECENT_ORDERS: i64 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CustomerRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<serde_json::Value>,
    pub notes: Option<String>,
}

impl From<CustomerRequest> for CustomerValues {
    fn from(req: CustomerRequest) -> Self {
        Self {
            email: req.email.trim().to_lowercase(),
            name: req.name,
            phone: req.phone,
            address: req.address.unwrap_or_else(|| serde_json::json!({})),
            notes: req.notes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: CustomerRow,
    pub recent_orders: Vec<OrderRow>,
}

pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<CustomerQuery>,
) -> Result<Json<ApiResponse<Page<CustomerRow>>>> {
    let page = PageRequest::new(query.page, query.per_page);
    let (items, total) = db::customers::list_customers(&state.pool, query.search.as_deref(), page).await?;
    Ok(ok(Page::new(items, total, page)))
}

pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CustomerDetail>>> {
    let customer = db::customers::get_customer(&state.pool, id)
        .await?
        .ok_or(StoreError::NotFound("customer"))?;
    let recent_orders = db::orders::recent_for_customer(&state.pool, id, RECENT_ORDERS).await?;
    Ok(ok(CustomerDetail { customer, recent_orders }))
}

pub async fn create_customer(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CustomerRow>>)> {
    let id = db::customers::insert_customer(&state.pool, &req.into()).await?;
    let customer = db::customers::get_customer(&state.pool, id)
        .await?
        .ok_or(StoreError::NotFound("customer"))?;
    Ok(created(customer))
}

pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<CustomerRequest>,
) -> Result<Json<ApiResponse<CustomerRow>>> {
    if !db::customers::update_customer(&state.pool, id, &req.into()).await? {
        return Err(StoreError::NotFound("customer"));
    }
    db::customers::get_customer(&state.pool, id)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("customer"))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Deleted>>> {
    deleted(db::customers::delete_customer(&state.pool, id).await?, "customer")
}
