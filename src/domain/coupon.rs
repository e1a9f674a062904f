//! Coupon rules: eligibility checks and discount computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
    FreeShipping,
}

impl DiscountType {
    pub fn parse(s: &str) -> Result<Self, CouponError> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            "free_shipping" => Ok(Self::FreeShipping),
            other => Err(CouponError::InvalidType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
            Self::FreeShipping => "free_shipping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("unknown discount type '{0}'")]
    InvalidType(String),
    #[error("percentage discounts must be between 1 and 100")]
    InvalidPercentage,
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon is not valid yet")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    UsageLimitReached,
    #[error("order subtotal is below the coupon minimum of {0}")]
    MinimumNotMet(i64),
}

/// Coupon as far as pricing is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    /// Percent for `Percentage`, minor units for `Fixed`, ignored otherwise.
    pub value: i64,
    pub min_order_amount: i64,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Upper-cases and trims a user supplied code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Validates the shape of a new or edited coupon.
pub fn validate_definition(discount_type: DiscountType, value: i64) -> Result<(), CouponError> {
    if discount_type == DiscountType::Percentage && !(1..=100).contains(&value) {
        return Err(CouponError::InvalidPercentage);
    }
    Ok(())
}

impl Coupon {
    /// Checks whether the coupon can be redeemed against `subtotal` at `now`.
    pub fn check(&self, subtotal: &Money, now: DateTime<Utc>) -> Result<(), CouponError> {
        if !self.is_active {
            return Err(CouponError::Inactive);
        }
        if self.starts_at.is_some_and(|s| now < s) {
            return Err(CouponError::NotStarted);
        }
        if self.expires_at.is_some_and(|e| now >= e) {
            return Err(CouponError::Expired);
        }
        if self.usage_limit.is_some_and(|limit| self.used_count >= limit) {
            return Err(CouponError::UsageLimitReached);
        }
        if subtotal.to_minor() < self.min_order_amount {
            return Err(CouponError::MinimumNotMet(self.min_order_amount));
        }
        Ok(())
    }

    /// Discount on the merchandise subtotal; never more than the subtotal.
    pub fn discount(&self, subtotal: &Money) -> Money {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let pct = u32::try_from(self.value.clamp(0, 100)).unwrap_or(0);
                subtotal.basis_points(pct * 100)
            }
            DiscountType::Fixed => Money::from_minor(self.value.max(0), subtotal.currency()),
            DiscountType::FreeShipping => Money::zero(subtotal.currency()),
        };
        raw.min(subtotal.clone())
    }

    pub fn grants_free_shipping(&self) -> bool {
        self.discount_type == DiscountType::FreeShipping
    }
}
