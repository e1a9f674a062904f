//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::{Money, Quantity, Sku, Slug};

#[derive(Clone, Debug)]
pub struct Product {
    id: Uuid,
    sku: Sku,
    slug: Slug,
    name: String,
    description: Option<String>,
    price: Money,
    compare_at_price: Option<Money>,
    inventory: Quantity,
    status: ProductStatus,
    category_id: Option<Uuid>,
    tags: Vec<String>,
    images: Vec<String>,
    seo: SeoFields,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoFields { pub title: Option<String>, pub description: Option<String> }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

impl ProductStatus {
    pub fn parse(s: &str) -> Result<Self, ProductError> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(ProductError::InvalidStatus(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { Self::Draft => "draft", Self::Active => "active", Self::Archived => "archived" }
    }
}

/// Persisted state used to rebuild the aggregate.
#[derive(Clone, Debug)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub sku: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub compare_at_price: Option<i64>,
    pub currency: String,
    pub stock: i32,
    pub status: String,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(sku: Sku, name: impl Into<String>, price: Money) -> Result<Self, ProductError> {
        let name = validate_name(name.into())?;
        let slug = Slug::from_name(&name).map_err(|e| ProductError::InvalidSlug(e.to_string()))?;
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut product = Self {
            id, sku: sku.clone(), slug, name, description: None,
            price, compare_at_price: None, inventory: Quantity::default(),
            status: ProductStatus::Draft, category_id: None, tags: vec![], images: vec![],
            seo: SeoFields::default(), created_at: now, updated_at: now, events: vec![],
        };
        product.raise_event(DomainEvent::Product(ProductEvent::Created { product_id: id, sku: sku.into_inner() }));
        Ok(product)
    }

    pub fn restore(s: ProductSnapshot) -> Result<Self, ProductError> {
        Ok(Self {
            id: s.id,
            sku: Sku::new(s.sku).map_err(|e| ProductError::InvalidSku(e.to_string()))?,
            slug: Slug::parse(s.slug).map_err(|e| ProductError::InvalidSlug(e.to_string()))?,
            name: s.name,
            description: s.description,
            price: Money::from_minor(s.price, &s.currency),
            compare_at_price: s.compare_at_price.map(|p| Money::from_minor(p, &s.currency)),
            inventory: Quantity::new(u32::try_from(s.stock).map_err(|_| ProductError::NegativeStock)?),
            status: ProductStatus::parse(&s.status)?,
            category_id: s.category_id,
            tags: s.tags,
            images: s.images,
            seo: SeoFields { title: s.seo_title, description: s.seo_description },
            created_at: s.created_at,
            updated_at: s.updated_at,
            events: vec![],
        })
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn sku(&self) -> &Sku { &self.sku }
    pub fn slug(&self) -> &Slug { &self.slug }
    pub fn name(&self) -> &str { &self.name }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn price(&self) -> &Money { &self.price }
    pub fn compare_at_price(&self) -> Option<&Money> { self.compare_at_price.as_ref() }
    pub fn inventory(&self) -> &Quantity { &self.inventory }
    pub fn status(&self) -> ProductStatus { self.status }
    pub fn category_id(&self) -> Option<Uuid> { self.category_id }
    pub fn tags(&self) -> &[String] { &self.tags }
    pub fn images(&self) -> &[String] { &self.images }
    pub fn seo(&self) -> &SeoFields { &self.seo }

    /// Stock as stored; the column is a Postgres INTEGER.
    pub fn stock(&self) -> i32 { i32::try_from(self.inventory.value()).unwrap_or(i32::MAX) }

    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), ProductError> {
        self.name = validate_name(name.into())?;
        self.touch();
        Ok(())
    }

    pub fn set_sku(&mut self, sku: Sku) { self.sku = sku; self.touch(); }
    pub fn set_slug(&mut self, slug: Slug) { self.slug = slug; self.touch(); }
    pub fn set_description(&mut self, description: Option<String>) { self.description = description; self.touch(); }
    pub fn set_category(&mut self, category_id: Option<Uuid>) { self.category_id = category_id; self.touch(); }
    pub fn set_tags(&mut self, tags: Vec<String>) { self.tags = normalize_list(tags); self.touch(); }
    pub fn set_images(&mut self, images: Vec<String>) { self.images = normalize_list(images); self.touch(); }
    pub fn set_seo(&mut self, seo: SeoFields) { self.seo = seo; self.touch(); }

    pub fn update_price(&mut self, new_price: Money) {
        self.price = new_price;
        self.touch();
    }

    pub fn set_compare_at_price(&mut self, price: Option<Money>) { self.compare_at_price = price; self.touch(); }

    pub fn set_stock(&mut self, stock: i64) -> Result<(), ProductError> {
        let stock = u32::try_from(stock).map_err(|_| ProductError::NegativeStock)?;
        if i32::try_from(stock).is_err() { return Err(ProductError::StockTooLarge); }
        self.inventory = Quantity::new(stock);
        self.touch();
        Ok(())
    }

    pub fn set_status(&mut self, status: ProductStatus) -> Result<(), ProductError> {
        match status {
            ProductStatus::Active => self.publish(),
            ProductStatus::Archived => { self.archive(); Ok(()) }
            ProductStatus::Draft => { self.status = ProductStatus::Draft; self.touch(); Ok(()) }
        }
    }

    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        self.status = ProductStatus::Active;
        self.touch();
        Ok(())
    }

    pub fn archive(&mut self) { self.status = ProductStatus::Archived; self.touch(); }

    pub fn add_inventory(&mut self, qty: u32) {
        self.inventory = self.inventory.add(qty);
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockAdjusted { product_id: self.id, stock: self.stock() }));
    }

    pub fn remove_inventory(&mut self, qty: u32) -> Result<(), ProductError> {
        self.inventory = self.inventory.subtract(qty).ok_or(ProductError::InsufficientInventory)?;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockAdjusted { product_id: self.id, stock: self.stock() }));
        Ok(())
    }

    /// Applies a signed stock delta.
    pub fn adjust_inventory(&mut self, delta: i32) -> Result<(), ProductError> {
        if delta >= 0 {
            self.add_inventory(delta.unsigned_abs());
            if i32::try_from(self.inventory.value()).is_err() { return Err(ProductError::StockTooLarge); }
            Ok(())
        } else {
            self.remove_inventory(delta.unsigned_abs())
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn validate_name(name: String) -> Result<String, ProductError> {
    let name = name.trim().to_string();
    if name.is_empty() { return Err(ProductError::MissingName); }
    if name.chars().count() > 200 { return Err(ProductError::NameTooLong); }
    Ok(name)
}

fn normalize_list(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        let v = v.trim().to_string();
        if !v.is_empty() && !out.contains(&v) { out.push(v); }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    MissingName,
    NameTooLong,
    InvalidSku(String),
    InvalidSlug(String),
    InvalidStatus(String),
    NegativePrice,
    NegativeStock,
    StockTooLarge,
    InsufficientInventory,
}
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "Missing name"),
            Self::NameTooLong => write!(f, "Name longer than 200 characters"),
            Self::InvalidSku(e) => write!(f, "Invalid SKU: {e}"),
            Self::InvalidSlug(e) => write!(f, "Invalid slug: {e}"),
            Self::InvalidStatus(s) => write!(f, "Invalid status '{s}', expected draft, active or archived"),
            Self::NegativePrice => write!(f, "Price must not be negative"),
            Self::NegativeStock => write!(f, "Stock must not be negative"),
            Self::StockTooLarge => write!(f, "Stock too large"),
            Self::InsufficientInventory => write!(f, "Insufficient inventory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product::create(Sku::new("TEST-001").unwrap(), "Test Product", Money::from_minor(1999, "USD")).unwrap()
    }

    #[test]
    fn test_product_create() {
        let mut p = product();
        assert_eq!(p.name(), "Test Product");
        assert_eq!(p.slug().as_str(), "test-product");
        assert_eq!(p.status(), ProductStatus::Draft);
        let events = p.take_events();
        assert!(matches!(&events[..], [DomainEvent::Product(ProductEvent::Created { sku, .. })] if sku == "TEST-001"));
        assert!(p.take_events().is_empty());
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = Product::create(Sku::new("X").unwrap(), "   ", Money::zero("USD")).unwrap_err();
        assert_eq!(err, ProductError::MissingName);
    }

    #[test]
    fn test_inventory() {
        let mut p = product();
        p.add_inventory(10);
        assert_eq!(p.stock(), 10);
        p.remove_inventory(5).unwrap();
        assert_eq!(p.inventory().value(), 5);
        assert_eq!(p.remove_inventory(6), Err(ProductError::InsufficientInventory));
        assert_eq!(p.stock(), 5);
    }

    #[test]
    fn adjust_inventory_never_goes_negative() {
        let mut p = product();
        p.set_stock(2).unwrap();
        assert_eq!(p.adjust_inventory(-3), Err(ProductError::InsufficientInventory));
        p.adjust_inventory(-2).unwrap();
        assert_eq!(p.stock(), 0);
        assert_eq!(p.set_stock(-1), Err(ProductError::NegativeStock));
    }

    #[test]
    fn status_parse_round_trips() {
        for s in ["draft", "active", "archived"] {
            assert_eq!(ProductStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(matches!(ProductStatus::parse("deleted"), Err(ProductError::InvalidStatus(_))));
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let mut p = product();
        p.set_tags(vec![" sale ".into(), "sale".into(), "".into(), "new".into()]);
        assert_eq!(p.tags(), ["sale", "new"]);
    }

    #[test]
    fn restore_rejects_invalid_rows() {
        let now = Utc::now();
        let snapshot = ProductSnapshot {
            id: Uuid::new_v4(), sku: "A-1".into(), slug: "a-1".into(), name: "A".into(),
            description: None, price: 100, compare_at_price: None, currency: "USD".into(),
            stock: -1, status: "active".into(), category_id: None, tags: vec![], images: vec![],
            seo_title: None, seo_description: None, created_at: now, updated_at: now,
        };
        assert_eq!(Product::restore(snapshot).unwrap_err(), ProductError::NegativeStock);
    }
}
