use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{created, deleted, ok, ApiResponse, AppState, Deleted, ValidJson};
use crate::db::coupons::{CouponRow, CouponValues};
use crate::db::{self, Page, PageRequest};
use crate::domain::coupon::{normalize_code, validate_definition, DiscountType};
use crate::domain::value_objects::Money;
use crate::error::{Result, StoreError};

#[derive(Debug, Default, Deserialize)]
pub struct CouponQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CouponRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    pub discount_type: String,
    #[validate(range(min = 0))]
    pub value: i64,
    #[validate(range(min = 0))]
    pub min_order_amount: Option<i64>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

impl CouponRequest {
    fn into_values(self) -> Result<CouponValues> {
        let code = normalize_code(&self.code);
        if code.chars().any(char::is_whitespace) {
            return Err(StoreError::validation("coupon code cannot contain spaces"));
        }
        let discount_type = DiscountType::parse(&self.discount_type)?;
        validate_definition(discount_type, self.value)?;
        if let (Some(starts), Some(expires)) = (self.starts_at, self.expires_at) {
            if expires <= starts {
                return Err(StoreError::validation("expires_at must be after starts_at"));
            }
        }
        Ok(CouponValues {
            code,
            discount_type,
            value: self.value,
            min_order_amount: self.min_order_amount.unwrap_or(0),
            usage_limit: self.usage_limit,
            starts_at: self.starts_at,
            expires_at: self.expires_at,
            is_active: self.is_active.unwrap_or(true),
        })
    }
}

pub async fn list_coupons(
    State(state): State<AppState>,
    Query(query): Query<CouponQuery>,
) -> Result<Json<ApiResponse<Page<CouponRow>>>> {
    let page = PageRequest::new(query.page, query.per_page);
    let (items, total) = db::coupons::list_coupons(&state.pool, query.active, page).await?;
    Ok(ok(Page::new(items, total, page)))
}

pub async fn get_coupon(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ApiResponse<CouponRow>>> {
    db::coupons::get_coupon(&state.pool, id)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("coupon"))
}

pub async fn create_coupon(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CouponRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CouponRow>>)> {
    let row = db::coupons::insert_coupon(&state.pool, &req.into_values()?).await?;
    tracing::info!(code = %row.code, discount_type = %row.discount_type, "coupon created");
    Ok(created(row))
}

pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<CouponRequest>,
) -> Result<Json<ApiResponse<CouponRow>>> {
    db::coupons::update_coupon(&state.pool, id, &req.into_values()?)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("coupon"))
}

pub async fn delete_coupon(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ApiResponse<Deleted>>> {
    deleted(db::coupons::delete_coupon(&state.pool, id).await?, "coupon")
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(range(min = 0))]
    pub subtotal: i64,
}

#[derive(Debug, Serialize)]
pub struct CouponQuote {
    pub code: String,
    pub discount_type: DiscountType,
    /// Discount on the subtotal in minor units.
    pub discount: i64,
    pub free_shipping: bool,
}

/// Storefront check of a code against a cart subtotal. Nothing is redeemed.
pub async fn validate_coupon(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ValidateCouponRequest>,
) -> Result<Json<ApiResponse<CouponQuote>>> {
    let code = normalize_code(&req.code);
    let coupon = db::coupons::find_by_code(&state.pool, &code)
        .await?
        .ok_or(StoreError::NotFound("coupon"))?
        .to_coupon()?;

    let subtotal = Money::from_minor(req.subtotal, state.currency());
    coupon.check(&subtotal, Utc::now())?;

    Ok(ok(CouponQuote {
        discount: coupon.discount(&subtotal).to_minor(),
        free_shipping: coupon.grants_free_shipping(),
        discount_type: coupon.discount_type,
        code: coupon.code,
    }))
}
