//! Value objects for the storefront domain

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        if value.chars().any(char::is_whitespace) { return Err(SkuError::Whitespace); }
        Ok(Self(value))
    }

    /// `SKU-` followed by eight random hex digits.
    pub fn generate() -> Self { Self(format!("SKU-{:08X}", rand::random::<u32>())) }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SkuError { Empty, TooLong, Whitespace }
impl std::error::Error for SkuError {}
impl fmt::Display for SkuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "SKU empty"),
            Self::TooLong => write!(f, "SKU longer than 50 characters"),
            Self::Whitespace => write!(f, "SKU contains whitespace"),
        }
    }
}

/// URL slug: lower-case ASCII alphanumerics separated by single dashes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    /// Derives a slug from free text. Any run of non-alphanumeric characters
    /// becomes one dash.
    pub fn from_name(name: &str) -> Result<Self, SlugError> {
        let mut out = String::with_capacity(name.len());
        let mut pending_dash = false;
        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_dash && !out.is_empty() { out.push('-'); }
                pending_dash = false;
                out.push(c.to_ascii_lowercase());
            } else {
                pending_dash = true;
            }
        }
        Self::parse(out)
    }

    /// Validates an explicit slug without rewriting it.
    pub fn parse(value: impl Into<String>) -> Result<Self, SlugError> {
        let value = value.into();
        if value.is_empty() { return Err(SlugError::Empty); }
        if value.len() > 120 { return Err(SlugError::TooLong); }
        let valid_chars = value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_chars || value.starts_with('-') || value.ends_with('-') || value.contains("--") {
            return Err(SlugError::InvalidCharacters);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SlugError { Empty, TooLong, InvalidCharacters }
impl std::error::Error for SlugError {}
impl fmt::Display for SlugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "slug empty"),
            Self::TooLong => write!(f, "slug longer than 120 characters"),
            Self::InvalidCharacters => write!(f, "slug may only contain a-z, 0-9 and single dashes"),
        }
    }
}

/// Money value object. Amounts carry two decimal places of precision when
/// crossing into storage as minor units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn from_minor(minor: i64, currency: &str) -> Self { Self::new(Decimal::new(minor, 2), currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_zero(&self) -> bool { self.amount.is_zero() }

    pub fn to_minor(&self) -> i64 {
        (self.amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(i64::MAX)
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }

    /// Subtracts, flooring the result at zero.
    pub fn saturating_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new((self.amount - other.amount).max(Decimal::ZERO), &self.currency))
    }

    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }

    /// Share of this amount expressed in basis points, rounded to cents.
    pub fn basis_points(&self, bps: u32) -> Money {
        let share = self.amount * Decimal::from(bps) / Decimal::from(10_000u32);
        Money::new(share.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero), &self.currency)
    }

    pub fn min(self, other: Money) -> Money { if other.amount < self.amount { other } else { self } }
}

impl Default for Money { fn default() -> Self { Self::zero("USD") } }

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { CurrencyMismatch }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Currency mismatch") }
}

/// Quantity value object
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sku() { let sku = Sku::new(" prod-001 ").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }

    #[test]
    fn sku_rejects_inner_whitespace() { assert_eq!(Sku::new("A B"), Err(SkuError::Whitespace)); }

    #[test]
    fn generated_sku_is_valid() {
        let sku = Sku::generate();
        assert!(sku.as_str().starts_with("SKU-"));
        assert_eq!(Sku::new(sku.as_str()).unwrap(), sku);
    }

    #[test]
    fn slug_from_name_collapses_separators() {
        assert_eq!(Slug::from_name("  Summer Sale -- 2024! ").unwrap().as_str(), "summer-sale-2024");
        assert_eq!(Slug::from_name("Café Crème").unwrap().as_str(), "caf-cr-me");
        assert_eq!(Slug::from_name("!!!"), Err(SlugError::Empty));
    }

    #[test]
    fn slug_parse_rejects_bad_input() {
        assert!(Slug::parse("about-us").is_ok());
        assert_eq!(Slug::parse("About"), Err(SlugError::InvalidCharacters));
        assert_eq!(Slug::parse("a--b"), Err(SlugError::InvalidCharacters));
        assert_eq!(Slug::parse("-a"), Err(SlugError::InvalidCharacters));
    }

    #[test]
    fn test_money_add() {
        let a = Money::from_minor(10_000, "USD");
        let b = Money::from_minor(5_000, "USD");
        assert_eq!(a.add(&b).unwrap().to_minor(), 15_000);
        assert_eq!(a.add(&Money::zero("EUR")), Err(MoneyError::CurrencyMismatch));
    }

    #[test]
    fn money_minor_units_round_trip() {
        let m = Money::from_minor(1999, "USD");
        assert_eq!(m.amount(), Decimal::new(1999, 2));
        assert_eq!(m.to_minor(), 1999);
    }

    #[test]
    fn basis_points_round_half_away_from_zero() {
        // 7% of 10.05 = 0.7035 -> 0.70
        assert_eq!(Money::from_minor(1005, "USD").basis_points(700).to_minor(), 70);
        // 10% of 0.05 = 0.005 -> 0.01
        assert_eq!(Money::from_minor(5, "USD").basis_points(1000).to_minor(), 1);
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = Money::from_minor(100, "USD");
        let b = Money::from_minor(250, "USD");
        assert!(a.saturating_sub(&b).unwrap().is_zero());
    }

    #[test]
    fn quantity_subtract_is_checked() {
        let q = Quantity::new(3);
        assert_eq!(q.subtract(2), Some(Quantity::new(1)));
        assert_eq!(q.subtract(4), None);
        assert_eq!(q.add(u32::MAX).value(), u32::MAX);
    }
}
