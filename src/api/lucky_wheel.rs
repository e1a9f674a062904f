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
use crate::db::lucky_wheel::{ConfigValues, PrizeRow, PrizeValues, SpinRow, WheelConfigRow};
use crate::db::{self, Page, PageRequest};
use crate::domain::coupon::{validate_definition, DiscountType};
use crate::domain::lucky_wheel::PrizeType;
use crate::error::{Result, StoreError};

type JsonResult<T> = Result<Json<ApiResponse<T>>>;
type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>)>;

#[derive(Debug, Deserialize, Validate)]
pub struct ConfigRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = 8760))]
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: i32,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub max_spins_per_user: i32,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub max_spins_per_fingerprint: i32,
    #[serde(default)]
    pub require_login: bool,
    #[validate(range(min = 1, max = 365))]
    #[serde(default = "default_coupon_valid_days")]
    pub coupon_valid_days: i32,
}

fn default_cooldown_hours() -> i32 {
    24
}

fn default_coupon_valid_days() -> i32 {
    7
}

impl ConfigRequest {
    fn into_values(self) -> Result<ConfigValues> {
        if let (Some(starts), Some(ends)) = (self.starts_at, self.ends_at) {
            if ends <= starts {
                return Err(StoreError::validation("ends_at must be after starts_at"));
            }
        }
        Ok(ConfigValues {
            name: self.name.trim().to_string(),
            is_active: self.is_active,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            cooldown_hours: self.cooldown_hours,
            max_spins_per_user: self.max_spins_per_user,
            max_spins_per_fingerprint: self.max_spins_per_fingerprint,
            require_login: self.require_login,
            coupon_valid_days: self.coupon_valid_days,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PrizeRequest {
    #[validate(length(min = 1, max = 120))]
    pub label: String,
    pub prize_type: String,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub value: i64,
    #[validate(range(min = 0.0))]
    pub probability: f64,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    #[validate(length(max = 32))]
    pub color: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl PrizeRequest {
    fn into_values(self) -> Result<PrizeValues> {
        let prize_type = PrizeType::parse(&self.prize_type)?;
        if !self.probability.is_finite() {
            return Err(StoreError::validation("probability must be a finite number"));
        }
        if prize_type == PrizeType::PercentageDiscount {
            validate_definition(DiscountType::Percentage, self.value)?;
        }
        Ok(PrizeValues {
            label: self.label.trim().to_string(),
            prize_type,
            value: self.value,
            probability: self.probability,
            stock: self.stock,
            color: self.color,
            position: self.position,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigDetail {
    #[serde(flatten)]
    pub config: WheelConfigRow,
    pub prizes: Vec<PrizeRow>,
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub async fn list_configs(State(state): State<AppState>) -> JsonResult<Vec<WheelConfigRow>> {
    Ok(ok(db::lucky_wheel::list_configs(&state.pool).await?))
}

pub async fn get_config(State(state): State<AppState>, Path(id): Path<Uuid>) -> JsonResult<ConfigDetail> {
    let config = db::lucky_wheel::get_config(&state.pool, id)
        .await?
        .ok_or(StoreError::NotFound("lucky wheel"))?;
    let prizes = db::lucky_wheel::list_prizes(&state.pool, id).await?;
    Ok(ok(ConfigDetail { config, prizes }))
}

pub async fn create_config(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ConfigRequest>,
) -> Created<WheelConfigRow> {
    let row = db::lucky_wheel::insert_config(&state.pool, &req.into_values()?).await?;
    Ok(created(row))
}

pub async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<ConfigRequest>,
) -> JsonResult<WheelConfigRow> {
    db::lucky_wheel::update_config(&state.pool, id, &req.into_values()?)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("lucky wheel"))
}

pub async fn delete_config(State(state): State<AppState>, Path(id): Path<Uuid>) -> JsonResult<Deleted> {
    deleted(db::lucky_wheel::delete_config(&state.pool, id).await?, "lucky wheel")
}

pub async fn list_prizes(State(state): State<AppState>, Path(config_id): Path<Uuid>) -> JsonResult<Vec<PrizeRow>> {
    if db::lucky_wheel::get_config(&state.pool, config_id).await?.is_none() {
        return Err(StoreError::NotFound("lucky wheel"));
    }
    Ok(ok(db::lucky_wheel::list_prizes(&state.pool, config_id).await?))
}

pub async fn create_prize(
    State(state): State<AppState>,
    Path(config_id): Path<Uuid>,
    ValidJson(req): ValidJson<PrizeRequest>,
) -> Created<PrizeRow> {
    if db::lucky_wheel::get_config(&state.pool, config_id).await?.is_none() {
        return Err(StoreError::NotFound("lucky wheel"));
    }
    let row = db::lucky_wheel::insert_prize(&state.pool, config_id, &req.into_values()?).await?;
    Ok(created(row))
}

pub async fn update_prize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<PrizeRequest>,
) -> JsonResult<PrizeRow> {
    db::lucky_wheel::update_prize(&state.pool, id, &req.into_values()?)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("prize"))
}

pub async fn delete_prize(State(state): State<AppState>, Path(id): Path<Uuid>) -> JsonResult<Deleted> {
    deleted(db::lucky_wheel::delete_prize(&state.pool, id).await?, "prize")
}

#[derive(Debug, Default, Deserialize)]
pub struct SpinQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub config_id: Option<Uuid>,
}

pub async fn list_spins(State(state): State<AppState>, Query(query): Query<SpinQuery>) -> JsonResult<Page<SpinRow>> {
    let page = PageRequest::new(query.page, query.per_page);
    let (items, total) = db::lucky_wheel::list_spins(&state.pool, query.config_id, page).await?;
    Ok(ok(Page::new(items, total, page)))
}

// ---------------------------------------------------------------------------
// Storefront
// ---------------------------------------------------------------------------

/// A prize as shown on the wheel. Weights and stock stay private.
#[derive(Debug, Serialize)]
pub struct PublicPrize {
    pub id: Uuid,
    pub label: String,
    pub prize_type: String,
    pub color: Option<String>,
    pub position: i32,
}

impl From<&PrizeRow> for PublicPrize {
    fn from(p: &PrizeRow) -> Self {
        Self {
            id: p.id,
            label: p.label.clone(),
            prize_type: p.prize_type.clone(),
            color: p.color.clone(),
            position: p.position,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicWheel {
    pub id: Uuid,
    pub name: String,
    pub require_login: bool,
    pub cooldown_hours: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub prizes: Vec<PublicPrize>,
}

async fn active_wheel(state: &AppState) -> Result<WheelConfigRow> {
    db::lucky_wheel::active_config(&state.pool)
        .await?
        .ok_or(StoreError::NotFound("lucky wheel"))
}

pub async fn get_active_wheel(State(state): State<AppState>) -> JsonResult<PublicWheel> {
    let config = active_wheel(&state).await?;
    let prizes = db::lucky_wheel::list_prizes(&state.pool, config.id)
        .await?
        .iter()
        .filter(|p| p.is_active)
        .map(PublicPrize::from)
        .collect();
    Ok(ok(PublicWheel {
        id: config.id,
        name: config.name,
        require_login: config.require_login,
        cooldown_hours: config.cooldown_hours,
        starts_at: config.starts_at,
        ends_at: config.ends_at,
        prizes,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SpinRequest {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub fingerprint: String,
}

#[derive(Debug, Serialize)]
pub struct SpinResult {
    pub spin_id: Uuid,
    pub prize: PublicPrize,
    pub coupon_code: Option<String>,
    pub coupon_expires_at: Option<DateTime<Utc>>,
    pub spun_at: DateTime<Utc>,
}

pub async fn spin(State(state): State<AppState>, ValidJson(req): ValidJson<SpinRequest>) -> JsonResult<SpinResult> {
    let config = active_wheel(&state).await?;
    let (outcome, events) =
        db::lucky_wheel::spin(&state.pool, config.id, req.customer_id, req.fingerprint.trim()).await?;
    state.publisher.publish_all(events).await;

    Ok(ok(SpinResult {
        spin_id: outcome.spin.id,
        prize: PublicPrize::from(&outcome.prize),
        coupon_code: outcome.coupon.as_ref().map(|c| c.code.clone()),
        coupon_expires_at: outcome.coupon.as_ref().and_then(|c| c.expires_at),
        spun_at: outcome.spin.created_at,
    }))
}
