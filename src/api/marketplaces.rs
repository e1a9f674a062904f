use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{deleted, ok, redact_credentials, ApiResponse, AppState, Deleted, ValidJson};
use crate::db::marketplaces::{MarketplaceRow, MarketplaceValues};
use crate::db;
use crate::error::{Result, StoreError};
use crate::marketplace::{MarketplaceKind, SyncError, SyncReport};

type JsonResult<T> = Result<Json<ApiResponse<T>>>;

#[derive(Debug, Serialize)]
pub struct MarketplaceView {
    pub id: Uuid,
    pub marketplace: String,
    pub display_name: &'static str,
    pub shop_name: String,
    pub credentials: serde_json::Value,
    pub is_enabled: bool,
    pub auto_sync: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<String>,
    pub last_sync_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MarketplaceRow> for MarketplaceView {
    fn from(row: MarketplaceRow) -> Self {
        Self {
            display_name: MarketplaceKind::parse(&row.marketplace).map_or("", |k| k.display_name()),
            credentials: redact_credentials(&row.credentials),
            id: row.id,
            marketplace: row.marketplace,
            shop_name: row.shop_name,
            is_enabled: row.is_enabled,
            auto_sync: row.auto_sync,
            last_sync_at: row.last_sync_at,
            last_sync_status: row.last_sync_status,
            last_sync_message: row.last_sync_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct MarketplaceRequest {
    #[validate(length(min = 1, max = 200))]
    pub shop_name: String,
    pub credentials: Option<serde_json::Value>,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub auto_sync: bool,
}

fn parse_kind(raw: &str) -> Result<MarketplaceKind> {
    MarketplaceKind::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = MarketplaceKind::ALL.iter().map(MarketplaceKind::as_str).collect();
        StoreError::validation(format!("unknown marketplace '{raw}'; expected one of {}", known.join(", ")))
    })
}

pub async fn list_marketplaces(State(state): State<AppState>) -> JsonResult<Vec<MarketplaceView>> {
    let rows = db::marketplaces::list_marketplaces(&state.pool).await?;
    Ok(ok(rows.into_iter().map(MarketplaceView::from).collect()))
}

pub async fn upsert_marketplace(
    State(state): State<AppState>,
    Path(marketplace): Path<String>,
    ValidJson(req): ValidJson<MarketplaceRequest>,
) -> JsonResult<MarketplaceView> {
    let kind = parse_kind(&marketplace)?;
    if req.credentials.as_ref().is_some_and(|c| !c.is_object()) {
        return Err(StoreError::validation("credentials must be a JSON object"));
    }
    let values = MarketplaceValues {
        shop_name: req.shop_name.trim().to_string(),
        credentials: req.credentials,
        is_enabled: req.is_enabled,
        auto_sync: req.auto_sync,
    };
    let row = db::marketplaces::upsert_marketplace(&state.pool, kind.as_str(), &values).await?;
    tracing::info!(marketplace = kind.as_str(), enabled = row.is_enabled, "marketplace saved");
    Ok(ok(row.into()))
}

pub async fn delete_marketplace(
    State(state): State<AppState>,
    Path(marketplace): Path<String>,
) -> JsonResult<Deleted> {
    let kind = parse_kind(&marketplace)?;
    deleted(db::marketplaces::delete_marketplace(&state.pool, kind.as_str()).await?, "marketplace")
}

#[derive(Debug, Serialize)]
pub struct SyncOutcome {
    pub marketplace: MarketplaceView,
    pub report: SyncReport,
}

/// Runs a sync and stores its result on the marketplace row, failed or not.
pub async fn sync_marketplace(
    State(state): State<AppState>,
    Path(marketplace): Path<String>,
) -> JsonResult<SyncOutcome> {
    let kind = parse_kind(&marketplace)?;
    let config = db::marketplaces::get_marketplace(&state.pool, kind.as_str())
        .await?
        .ok_or(StoreError::NotFound("marketplace"))?;
    if !config.is_enabled {
        return Err(StoreError::conflict(format!("{} is disabled", kind.display_name())));
    }

    match state.marketplace.sync(&state.pool, kind, &config.shop_name).await {
        Ok(report) => {
            let row = db::marketplaces::record_sync(&state.pool, kind.as_str(), "success", &report.summary())
                .await?
                .ok_or(StoreError::NotFound("marketplace"))?;
            tracing::info!(
                marketplace = kind.as_str(),
                products_pushed = report.products_pushed,
                orders_imported = report.orders_imported,
                "marketplace sync finished"
            );
            Ok(ok(SyncOutcome { marketplace: row.into(), report }))
        }
        Err(e) => {
            tracing::warn!(marketplace = kind.as_str(), error = %e, "marketplace sync failed");
            db::marketplaces::record_sync(&state.pool, kind.as_str(), "failed", &e.to_string()).await?;
            Err(match e {
                SyncError::Api(msg) => StoreError::Upstream(msg),
                SyncError::Database(inner) => inner,
            })
        }
    }
}
