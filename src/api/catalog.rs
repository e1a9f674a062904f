use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{created, deleted, ok, ApiResponse, AppState, Deleted, ValidJson};
use crate::db::categories::{CategoryRow, CategoryValues};
use crate::db::products::{ProductFilter, ProductRow};
use crate::db::{self, Page, PageRequest};
use crate::domain::aggregates::{Product, ProductStatus, SeoFields};
use crate::domain::catalog_import::{self, ImportIssue, ImportRow};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::{Money, Sku, Slug};
use crate::error::{Result, StoreError};

type JsonResult<T> = Result<Json<ApiResponse<T>>>;

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
}

impl ProductQuery {
    fn paging(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }

    fn filter(&self, force_status: Option<ProductStatus>) -> Result<ProductFilter> {
        let status = match force_status {
            Some(status) => Some(status),
            None => self.status.as_deref().map(ProductStatus::parse).transpose()?,
        };
        Ok(ProductFilter {
            status: status.map(|s| s.as_str().to_string()),
            category_id: self.category,
            search: self.search.clone(),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub sku: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub price: i64,
    #[validate(range(min = 0))]
    pub compare_at_price: Option<i64>,
    #[validate(range(min = 0))]
    pub stock: Option<i64>,
    pub status: Option<String>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub sku: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub price: Option<i64>,
    #[validate(range(min = 0))]
    pub compare_at_price: Option<i64>,
    #[validate(range(min = 0))]
    pub stock: Option<i64>,
    pub status: Option<String>,
    pub category_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StockAdjustment {
    pub delta: i32,
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<ImportIssue>,
}

fn parse_sku(raw: &str) -> Result<Sku> {
    Sku::new(raw).map_err(|e| StoreError::validation(format!("invalid SKU: {e}")))
}

fn parse_slug(raw: String) -> Result<Slug> {
    Slug::parse(raw).map_err(|e| StoreError::validation(format!("invalid slug: {e}")))
}

async fn ensure_category(state: &AppState, category_id: Option<Uuid>) -> Result<()> {
    if let Some(id) = category_id {
        if db::categories::get_category(&state.pool, id).await?.is_none() {
            return Err(StoreError::validation(format!("unknown category {id}")));
        }
    }
    Ok(())
}

async fn load_product(state: &AppState, id: Uuid) -> Result<ProductRow> {
    db::products::get_product(&state.pool, id).await?.ok_or(StoreError::NotFound("product"))
}

// ---------------------------------------------------------------------------
// Storefront
// ---------------------------------------------------------------------------

pub async fn list_public_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> JsonResult<Page<ProductRow>> {
    let page = query.paging();
    let filter = query.filter(Some(ProductStatus::Active))?;
    let (items, total) = db::products::list_products(&state.pool, &filter, page).await?;
    Ok(ok(Page::new(items, total, page)))
}

pub async fn get_public_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> JsonResult<ProductRow> {
    let product = load_product(&state, id).await?;
    if product.status != ProductStatus::Active.as_str() {
        return Err(StoreError::NotFound("product"));
    }
    Ok(ok(product))
}

pub async fn get_public_product_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> JsonResult<ProductRow> {
    db::products::get_product_by_slug(&state.pool, &slug)
        .await?
        .filter(|p| p.status == ProductStatus::Active.as_str())
        .map(ok)
        .ok_or(StoreError::NotFound("product"))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> JsonResult<Page<ProductRow>> {
    let page = query.paging();
    let filter = query.filter(None)?;
    let (items, total) = db::products::list_products(&state.pool, &filter, page).await?;
    Ok(ok(Page::new(items, total, page)))
}

pub async fn get_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> JsonResult<ProductRow> {
    Ok(ok(load_product(&state, id).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateProductRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<ProductRow>>)> {
    ensure_category(&state, req.category_id).await?;

    let sku = match req.sku.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => parse_sku(raw)?,
        None => Sku::generate(),
    };
    let currency = state.currency();
    let mut product = Product::create(sku, req.name, Money::from_minor(req.price, currency))?;
    if let Some(slug) = req.slug.filter(|s| !s.trim().is_empty()) {
        product.set_slug(parse_slug(slug)?);
    }
    product.set_description(req.description);
    product.set_compare_at_price(req.compare_at_price.map(|p| Money::from_minor(p, currency)));
    product.set_stock(req.stock.unwrap_or(0))?;
    if let Some(status) = req.status.as_deref() {
        product.set_status(ProductStatus::parse(status)?)?;
    }
    product.set_category(req.category_id);
    product.set_tags(req.tags);
    product.set_images(req.images);
    product.set_seo(SeoFields { title: req.seo_title, description: req.seo_description });

    let row = db::products::insert_product(&state.pool, &product).await?;
    tracing::info!(product_id = %row.id, sku = %row.sku, "product created");
    state.publisher.publish_all(product.take_events()).await;
    Ok(created(row))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateProductRequest>,
) -> JsonResult<ProductRow> {
    let mut product = load_product(&state, id).await?.into_aggregate()?;
    let currency = product.price().currency().to_string();

    if let Some(name) = req.name {
        product.rename(name)?;
    }
    if let Some(sku) = req.sku.as_deref() {
        product.set_sku(parse_sku(sku)?);
    }
    if let Some(slug) = req.slug {
        product.set_slug(parse_slug(slug)?);
    }
    if let Some(description) = req.description {
        product.set_description(Some(description).filter(|d| !d.is_empty()));
    }
    if let Some(price) = req.price {
        product.update_price(Money::from_minor(price, &currency));
    }
    if let Some(compare_at) = req.compare_at_price {
        product.set_compare_at_price(Some(Money::from_minor(compare_at, &currency)));
    }
    if let Some(stock) = req.stock {
        product.set_stock(stock)?;
    }
    if let Some(status) = req.status.as_deref() {
        product.set_status(ProductStatus::parse(status)?)?;
    }
    if req.category_id.is_some() {
        ensure_category(&state, req.category_id).await?;
        product.set_category(req.category_id);
    }
    if let Some(tags) = req.tags {
        product.set_tags(tags);
    }
    if let Some(images) = req.images {
        product.set_images(images);
    }
    if req.seo_title.is_some() || req.seo_description.is_some() {
        let current = product.seo().clone();
        product.set_seo(SeoFields {
            title: req.seo_title.or(current.title),
            description: req.seo_description.or(current.description),
        });
    }

    let row = db::products::update_product(&state.pool, &product).await?;
    Ok(ok(row))
}

pub async fn delete_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> JsonResult<Deleted> {
    let found = db::products::delete_product(&state.pool, id).await?;
    if found {
        tracing::info!(product_id = %id, "product deleted");
        state
            .publisher
            .publish(&DomainEvent::Product(ProductEvent::Deleted { product_id: id }))
            .await;
    }
    deleted(found, "product")
}

#[derive(Debug, Serialize)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub stock: i32,
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<StockAdjustment>,
) -> JsonResult<StockLevel> {
    let mut product = load_product(&state, id).await?.into_aggregate()?;
    product.adjust_inventory(req.delta)?;

    // A concurrent change can still push the stored value below zero;
    // the table constraint rejects that case.
    let stock = db::products::adjust_stock(&state.pool, id, req.delta)
        .await?
        .ok_or(StoreError::NotFound("product"))?;
    state
        .publisher
        .publish(&DomainEvent::Product(ProductEvent::StockAdjusted { product_id: id, stock }))
        .await;
    Ok(ok(StockLevel { product_id: id, stock }))
}

/// Expects a multipart body with a `file` part (the first part carrying a
/// file name is accepted as well).
pub async fn upload_product_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<ProductRow>>)> {
    load_product(&state, id).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| StoreError::validation(e.body_text()))?
    {
        if field.name() != Some("file") && field.file_name().is_none() {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| StoreError::validation(e.body_text()))?;

        let stored = state
            .images
            .save_product_image(content_type.as_deref(), file_name.as_deref(), &bytes)
            .await?;
        let row = db::products::append_image(&state.pool, id, &stored.url)
            .await?
            .ok_or(StoreError::NotFound("product"))?;
        return Ok(created(row));
    }

    Err(StoreError::validation("multipart body has no file part"))
}

/// Upserts products from a CSV body, keyed by SKU. Invalid rows are
/// reported and skipped; valid rows are applied.
pub async fn import_products(State(state): State<AppState>, body: Bytes) -> JsonResult<ImportReport> {
    let parsed = catalog_import::parse_csv(&body)?;
    let mut report = ImportReport { created: 0, updated: 0, errors: parsed.issues };
    let mut categories: HashMap<String, Option<Uuid>> = HashMap::new();

    for row in &parsed.rows {
        let category_id = match row.category_slug.as_deref() {
            None => None,
            Some(slug) => {
                let id = match categories.get(slug) {
                    Some(id) => *id,
                    None => {
                        let id = db::categories::find_id_by_slug(&state.pool, slug).await?;
                        categories.insert(slug.to_string(), id);
                        id
                    }
                };
                if id.is_none() {
                    report.errors.push(ImportIssue { line: row.line, message: format!("unknown category '{slug}'") });
                    continue;
                }
                id
            }
        };

        match import_row(&state, row, category_id).await {
            Ok(true) => report.created += 1,
            Ok(false) => report.updated += 1,
            Err(StoreError::Conflict(message) | StoreError::Validation(message)) => {
                report.errors.push(ImportIssue { line: row.line, message });
            }
            Err(other) => return Err(other),
        }
    }
    report.errors.sort_by_key(|issue| issue.line);

    tracing::info!(
        created = report.created,
        updated = report.updated,
        rejected = report.errors.len(),
        "product import finished"
    );
    state
        .publisher
        .publish(&DomainEvent::Product(ProductEvent::Imported {
            created: report.created,
            updated: report.updated,
        }))
        .await;
    Ok(ok(report))
}

/// New products get a slug from their name; when another product already
/// owns it, the SKU is appended.
async fn import_row(state: &AppState, row: &ImportRow, category_id: Option<Uuid>) -> Result<bool> {
    let slug = Slug::from_name(&row.name).map_err(|e| StoreError::validation(format!("invalid name: {e}")))?;
    let currency = state.currency();
    match db::products::upsert_imported(&state.pool, row, slug.as_str(), currency, category_id).await {
        Err(StoreError::Conflict(_)) => {
            let fallback = Slug::from_name(&format!("{} {}", row.name, row.sku))
                .map_err(|e| StoreError::validation(format!("invalid name: {e}")))?;
            db::products::upsert_imported(&state.pool, row, fallback.as_str(), currency, category_id).await
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub position: i32,
}

impl CategoryRequest {
    fn into_values(self) -> Result<CategoryValues> {
        let slug = match self.slug.filter(|s| !s.trim().is_empty()) {
            Some(slug) => parse_slug(slug)?,
            None => Slug::from_name(&self.name).map_err(|e| StoreError::validation(format!("invalid name: {e}")))?,
        };
        Ok(CategoryValues {
            name: self.name.trim().to_string(),
            slug: slug.into_inner(),
            description: self.description,
            parent_id: self.parent_id,
            image_url: self.image_url,
            position: self.position,
        })
    }
}

pub async fn list_categories(State(state): State<AppState>) -> JsonResult<Vec<CategoryRow>> {
    Ok(ok(db::categories::list_categories(&state.pool).await?))
}

pub async fn get_category(State(state): State<AppState>, Path(id): Path<Uuid>) -> JsonResult<CategoryRow> {
    db::categories::get_category(&state.pool, id)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("category"))
}

pub async fn create_category(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CategoryRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<CategoryRow>>)> {
    ensure_category(&state, req.parent_id).await?;
    let row = db::categories::insert_category(&state.pool, &req.into_values()?).await?;
    Ok(created(row))
}

pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<CategoryRequest>,
) -> JsonResult<CategoryRow> {
    if req.parent_id == Some(id) {
        return Err(StoreError::validation("a category cannot be its own parent"));
    }
    ensure_category(&state, req.parent_id).await?;
    db::categories::update_category(&state.pool, id, &req.into_values()?)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("category"))
}

pub async fn delete_category(State(state): State<AppState>, Path(id): Path<Uuid>) -> JsonResult<Deleted> {
    deleted(db::categories::delete_category(&state.pool, id).await?, "category")
}
