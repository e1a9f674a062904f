//! Error type shared by the HTTP layer and the database layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::aggregates::{CartError, OrderError, ProductError};
use crate::domain::analytics::UnknownEventType;
use crate::domain::catalog_import::ImportError;
use crate::domain::coupon::CouponError;
use crate::domain::lucky_wheel::WheelError;
use crate::seo::ContentError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("{reason}")]
    NotEligible {
        reason: String,
        next_eligible_at: Option<DateTime<Utc>>,
    },

    #[error("upload exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("{0}")]
    Unavailable(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Maps Postgres constraint violations onto client errors; everything
    /// else stays a database error.
    pub fn from_db(error: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &error {
            match db_err.code().as_deref() {
                Some("23505") => return Self::Conflict(format!("{what} already exists")),
                Some("23503") => return Self::Conflict(format!("{what} is still referenced")),
                Some("23514") => return Self::Validation(format!("{what} violates a constraint")),
                _ => {}
            }
        }
        Self::Database(error)
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::NotEligible { .. } => (StatusCode::FORBIDDEN, "not_eligible"),
            Self::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Self::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            Self::Database(_) | Self::Io(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<&str> = errors.field_errors().keys().copied().collect();
        fields.sort_unstable();
        Self::Validation(format!("invalid fields: {}", fields.join(", ")))
    }
}

impl From<ProductError> for StoreError {
    fn from(error: ProductError) -> Self {
        match error {
            ProductError::InsufficientInventory => Self::Conflict(error.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<OrderError> for StoreError {
    fn from(error: OrderError) -> Self {
        match error {
            OrderError::CannotCancel | OrderError::Closed(_) => Self::Conflict(error.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<CartError> for StoreError {
    fn from(_: CartError) -> Self {
        Self::NotFound("cart item")
    }
}

impl From<CouponError> for StoreError {
    fn from(error: CouponError) -> Self {
        Self::Validation(error.to_string())
    }
}

impl From<WheelError> for StoreError {
    fn from(error: WheelError) -> Self {
        match error {
            WheelError::InvalidPrizeType(_) => Self::Validation(error.to_string()),
            WheelError::NoPrizesAvailable => Self::Conflict(error.to_string()),
            WheelError::Cooldown { next_eligible_at } => Self::NotEligible {
                reason: error.to_string(),
                next_eligible_at: Some(next_eligible_at),
            },
            other => Self::NotEligible { reason: other.to_string(), next_eligible_at: None },
        }
    }
}

impl From<ImportError> for StoreError {
    fn from(error: ImportError) -> Self {
        Self::Validation(error.to_string())
    }
}

impl From<UnknownEventType> for StoreError {
    fn from(error: UnknownEventType) -> Self {
        Self::Validation(error.to_string())
    }
}

impl From<ContentError> for StoreError {
    fn from(error: ContentError) -> Self {
        match error {
            ContentError::Io { source, .. } => Self::Io(source),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_eligible_at: Option<DateTime<Utc>>,
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let error = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "database query failed");
                "database query failed".to_string()
            }
            Self::Io(e) => {
                tracing::error!(error = %e, "filesystem operation failed");
                "filesystem operation failed".to_string()
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let next_eligible_at = match &self {
            Self::NotEligible { next_eligible_at, .. } => *next_eligible_at,
            _ => None,
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                error,
                code,
                next_eligible_at,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let response = StoreError::validation("bad").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_names_the_resource() {
        let err = StoreError::NotFound("product");
        assert_eq!(err.to_string(), "product not found");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn not_eligible_is_forbidden() {
        let err = StoreError::NotEligible {
            reason: "cooldown".into(),
            next_eligible_at: Some(Utc::now()),
        };
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn database_errors_do_not_leak_details() {
        let err = StoreError::Database(sqlx::Error::RowNotFound);
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "internal_error");
    }

    #[test]
    fn cooldown_carries_next_eligible_time() {
        let at = Utc::now();
        let err = StoreError::from(WheelError::Cooldown { next_eligible_at: at });
        assert!(matches!(err, StoreError::NotEligible { next_eligible_at: Some(t), .. } if t == at));
        let err = StoreError::from(WheelError::QuotaExceeded);
        assert!(matches!(err, StoreError::NotEligible { next_eligible_at: None, .. }));
    }

    #[test]
    fn domain_conflicts_map_to_409() {
        let (status, _) = StoreError::from(OrderError::CannotCancel).status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = StoreError::from(ProductError::InsufficientInventory).status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = StoreError::from(ProductError::MissingName).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn non_constraint_db_errors_pass_through() {
        let err = StoreError::from_db(sqlx::Error::RowNotFound, "product");
        assert!(matches!(err, StoreError::Database(_)));
    }
}
