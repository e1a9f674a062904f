use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{deleted, ok, redact_credentials, ApiResponse, AppState, Deleted, ValidJson};
use crate::db::payment_gateways::{GatewayValues, PaymentGatewayRow};
use crate::db::settings::{SettingRow, PUBLIC_PREFIX};
use crate::db;
use crate::error::{Result, StoreError};

type JsonResult<T> = Result<Json<ApiResponse<T>>>;

const MAX_KEY_LEN: usize = 100;

// ---------------------------------------------------------------------------
// Store settings
// ---------------------------------------------------------------------------

/// Keys are dotted lower-case identifiers such as `public.store_name`.
fn check_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
    if !valid {
        return Err(StoreError::validation(
            "setting key must be 1 to 100 characters of a-z, 0-9, '.', '_' or '-'",
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct SettingRequest {
    pub value: serde_json::Value,
}

pub async fn list_settings(State(state): State<AppState>) -> JsonResult<Vec<SettingRow>> {
    Ok(ok(db::settings::list_settings(&state.pool).await?))
}

pub async fn upsert_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ValidJson(req): ValidJson<SettingRequest>,
) -> JsonResult<SettingRow> {
    check_key(&key)?;
    let row = db::settings::upsert_setting(&state.pool, &key, &req.value).await?;
    tracing::info!(key = %row.key, "setting saved");
    Ok(ok(row))
}

pub async fn delete_setting(State(state): State<AppState>, Path(key): Path<String>) -> JsonResult<Deleted> {
    deleted(db::settings::delete_setting(&state.pool, &key).await?, "setting")
}

/// `public.*` settings keyed without their prefix.
pub async fn list_public_settings(
    State(state): State<AppState>,
) -> JsonResult<BTreeMap<String, serde_json::Value>> {
    let settings = db::settings::list_public(&state.pool)
        .await?
        .into_iter()
        .filter_map(|row| {
            let key = row.key.strip_prefix(PUBLIC_PREFIX)?.to_string();
            Some((key, row.value))
        })
        .collect();
    Ok(ok(settings))
}

// ---------------------------------------------------------------------------
// Payment gateways
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentProvider {
    Stripe,
    Paypal,
    BankTransfer,
    CashOnDelivery,
}

impl PaymentProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stripe" => Some(Self::Stripe),
            "paypal" => Some(Self::Paypal),
            "bank_transfer" => Some(Self::BankTransfer),
            "cash_on_delivery" => Some(Self::CashOnDelivery),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
            Self::BankTransfer => "bank_transfer",
            Self::CashOnDelivery => "cash_on_delivery",
        }
    }

    pub fn default_display_name(&self) -> &'static str {
        match self {
            Self::Stripe => "Credit / debit card",
            Self::Paypal => "PayPal",
            Self::BankTransfer => "Bank transfer",
            Self::CashOnDelivery => "Cash on delivery",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GatewayView {
    pub provider: String,
    pub display_name: String,
    pub is_enabled: bool,
    pub test_mode: bool,
    pub credentials: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentGatewayRow> for GatewayView {
    fn from(row: PaymentGatewayRow) -> Self {
        Self {
            credentials: redact_credentials(&row.credentials),
            provider: row.provider,
            display_name: row.display_name,
            is_enabled: row.is_enabled,
            test_mode: row.test_mode,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct GatewayRequest {
    #[validate(length(min = 1, max = 100))]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default = "default_test_mode")]
    pub test_mode: bool,
    /// Omitted keeps whatever is stored.
    pub credentials: Option<serde_json::Value>,
}

fn default_test_mode() -> bool {
    true
}

fn parse_provider(raw: &str) -> Result<PaymentProvider> {
    PaymentProvider::parse(raw).ok_or_else(|| {
        StoreError::validation(format!(
            "unknown payment provider '{raw}'; expected stripe, paypal, bank_transfer or cash_on_delivery"
        ))
    })
}

pub async fn list_gateways(State(state): State<AppState>) -> JsonResult<Vec<GatewayView>> {
    let rows = db::payment_gateways::list_gateways(&state.pool).await?;
    Ok(ok(rows.into_iter().map(GatewayView::from).collect()))
}

pub async fn upsert_gateway(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    ValidJson(req): ValidJson<GatewayRequest>,
) -> JsonResult<GatewayView> {
    let provider = parse_provider(&provider)?;
    if req.credentials.as_ref().is_some_and(|c| !c.is_object()) {
        return Err(StoreError::validation("credentials must be a JSON object"));
    }
    let values = GatewayValues {
        display_name: req
            .display_name
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| provider.default_display_name().to_string()),
        is_enabled: req.is_enabled,
        test_mode: req.test_mode,
        credentials: req.credentials,
    };
    let row = db::payment_gateways::upsert_gateway(&state.pool, provider.as_str(), &values).await?;
    tracing::info!(provider = provider.as_str(), enabled = row.is_enabled, "payment gateway saved");
    Ok(ok(row.into()))
}

pub async fn delete_gateway(State(state): State<AppState>, Path(provider): Path<String>) -> JsonResult<Deleted> {
    let provider = parse_provider(&provider)?;
    deleted(
        db::payment_gateways::delete_gateway(&state.pool, provider.as_str()).await?,
        "payment gateway",
    )
}

#[derive(Debug, Serialize)]
pub struct PaymentMethod {
    pub provider: String,
    pub display_name: String,
}

pub async fn list_payment_methods(State(state): State<AppState>) -> JsonResult<Vec<PaymentMethod>> {
    let methods = db::payment_gateways::list_enabled(&state.pool)
        .await?
        .into_iter()
        .map(|(provider, display_name)| PaymentMethod { provider, display_name })
        .collect();
    Ok(ok(methods))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_keys_are_restricted() {
        assert!(check_key("public.store_name").is_ok());
        assert!(check_key("shipping-zones").is_ok());
        assert!(check_key("").is_err());
        assert!(check_key("Public.Name").is_err());
        assert!(check_key("has space").is_err());
        assert!(check_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn providers_round_trip_their_names() {
        for name in ["stripe", "paypal", "bank_transfer", "cash_on_delivery"] {
            assert_eq!(PaymentProvider::parse(name).map(|p| p.as_str()), Some(name));
        }
        assert!(PaymentProvider::parse("bitcoin").is_none());
        assert!(matches!(parse_provider("Stripe"), Err(StoreError::Validation(_))));
    }

    #[test]
    fn gateway_view_masks_credentials() {
        let now = Utc::now();
        let view = GatewayView::from(PaymentGatewayRow {
            provider: "stripe".into(),
            display_name: "Card".into(),
            is_enabled: true,
            test_mode: false,
            credentials: serde_json::json!({"secret_key": "sk_live_123"}),
            created_at: now,
            updated_at: now,
        });
        assert_eq!(view.credentials, serde_json::json!({"secret_key": "********"}));
    }
}
