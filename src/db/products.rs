//! Queries for the `products` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{like_pattern, PageRequest};
use crate::domain::aggregates::{Product, ProductSnapshot};
use crate::domain::catalog_import::ImportRow;
use crate::error::{Result, StoreError};

const COLUMNS: &str = "id, sku, slug, name, description, price, compare_at_price, currency, \
     category_id, stock, status, images, tags, seo_title, seo_description, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub sku: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub compare_at_price: Option<i64>,
    pub currency: String,
    pub category_id: Option<Uuid>,
    pub stock: i32,
    pub status: String,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    pub fn into_aggregate(self) -> Result<Product> {
        Ok(Product::restore(ProductSnapshot {
            id: self.id,
            sku: self.sku,
            slug: self.slug,
            name: self.name,
            description: self.description,
            price: self.price,
            compare_at_price: self.compare_at_price,
            currency: self.currency,
            stock: self.stock,
            status: self.status,
            category_id: self.category_id,
            tags: self.tags,
            images: self.images,
            seo_title: self.seo_title,
            seo_description: self.seo_description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })?)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ProductFilter {
    pub status: Option<String>,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE TRUE");
    if let Some(status) = &filter.status {
        qb.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND category_id = ").push_bind(category_id);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR sku ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

pub async fn list_products(
    pool: &PgPool,
    filter: &ProductFilter,
    page: PageRequest,
) -> Result<(Vec<ProductRow>, i64)> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products");
    push_filters(&mut count, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut query = QueryBuilder::new(format!("SELECT {COLUMNS} FROM products"));
    push_filters(&mut query, filter);
    query
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows = query.build_query_as::<ProductRow>().fetch_all(pool).await?;

    Ok((rows, total))
}

pub async fn get_product(pool: &PgPool, id: Uuid) -> Result<Option<ProductRow>> {
    let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {COLUMNS} FROM products WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_product_by_slug(pool: &PgPool, slug: &str) -> Result<Option<ProductRow>> {
    let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {COLUMNS} FROM products WHERE slug = $1"))
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Inserts a new product from the aggregate's current state.
pub async fn insert_product(pool: &PgPool, product: &Product) -> Result<ProductRow> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "INSERT INTO products (id, sku, slug, name, description, price, compare_at_price, currency, \
                               category_id, stock, status, images, tags, seo_title, seo_description) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         RETURNING {COLUMNS}"
    ))
    .bind(product.id())
    .bind(product.sku().as_str())
    .bind(product.slug().as_str())
    .bind(product.name())
    .bind(product.description())
    .bind(product.price().to_minor())
    .bind(product.compare_at_price().map(|p| p.to_minor()))
    .bind(product.price().currency())
    .bind(product.category_id())
    .bind(product.stock())
    .bind(product.status().as_str())
    .bind(product.images())
    .bind(product.tags())
    .bind(product.seo().title.as_deref())
    .bind(product.seo().description.as_deref())
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "product with this SKU or slug"))
}

/// Writes every mutable field of the aggregate back to its row.
pub async fn update_product(pool: &PgPool, product: &Product) -> Result<ProductRow> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "UPDATE products SET sku = $2, slug = $3, name = $4, description = $5, price = $6, \
                compare_at_price = $7, category_id = $8, stock = $9, status = $10, images = $11, \
                tags = $12, seo_title = $13, seo_description = $14, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(product.id())
    .bind(product.sku().as_str())
    .bind(product.slug().as_str())
    .bind(product.name())
    .bind(product.description())
    .bind(product.price().to_minor())
    .bind(product.compare_at_price().map(|p| p.to_minor()))
    .bind(product.category_id())
    .bind(product.stock())
    .bind(product.status().as_str())
    .bind(product.images())
    .bind(product.tags())
    .bind(product.seo().title.as_deref())
    .bind(product.seo().description.as_deref())
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "product with this SKU or slug"))?
    .ok_or(StoreError::NotFound("product"))
}

/// Returns `true` when a row was deleted.
pub async fn delete_product(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Applies `delta` to the stock in one statement. `None` when the product
/// does not exist; the check constraint rejects a negative result.
pub async fn adjust_stock(pool: &PgPool, id: Uuid, delta: i32) -> Result<Option<i32>> {
    let stock = sqlx::query_scalar::<_, i32>(
        "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1 RETURNING stock",
    )
    .bind(id)
    .bind(delta)
    .fetch_optional(pool)
    .await
    .map_err(|e| match StoreError::from_db(e, "stock") {
        StoreError::Validation(_) => StoreError::conflict("stock cannot go below zero"),
        other => other,
    })?;
    Ok(stock)
}

pub async fn append_image(pool: &PgPool, id: Uuid, url: &str) -> Result<Option<ProductRow>> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "UPDATE products SET images = array_append(images, $2), updated_at = NOW() \
         WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(url)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Inserts or updates one imported row keyed by SKU. Returns `true` when the
/// row was newly created.
pub async fn upsert_imported(
    pool: &PgPool,
    row: &ImportRow,
    slug: &str,
    currency: &str,
    category_id: Option<Uuid>,
) -> Result<bool> {
    let created = sqlx::query_scalar::<_, bool>(
        "INSERT INTO products (id, sku, slug, name, description, price, compare_at_price, currency, \
                               category_id, stock, status, images, tags) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (sku) DO UPDATE SET \
             name = EXCLUDED.name, \
             description = COALESCE(EXCLUDED.description, products.description), \
             price = EXCLUDED.price, \
             compare_at_price = EXCLUDED.compare_at_price, \
             category_id = COALESCE(EXCLUDED.category_id, products.category_id), \
             stock = EXCLUDED.stock, \
             status = EXCLUDED.status, \
             images = CASE WHEN cardinality(EXCLUDED.images) > 0 THEN EXCLUDED.images ELSE products.images END, \
             tags = CASE WHEN cardinality(EXCLUDED.tags) > 0 THEN EXCLUDED.tags ELSE products.tags END, \
             updated_at = NOW() \
         RETURNING (xmax = 0)",
    )
    .bind(Uuid::now_v7())
    .bind(row.sku.as_str())
    .bind(slug)
    .bind(&row.name)
    .bind(row.description.as_deref())
    .bind(row.price)
    .bind(row.compare_at_price)
    .bind(currency)
    .bind(category_id)
    .bind(row.stock)
    .bind(row.status.as_str())
    .bind(&row.images)
    .bind(&row.tags)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "product slug"))?;
    Ok(created)
}

pub async fn count_active(pool: &PgPool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE status = 'active'")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// `(slug, updated_at)` of every active product, for the sitemap.
pub async fn list_active_slugs(pool: &PgPool) -> Result<Vec<(String, DateTime<Utc>)>> {
    let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
        "SELECT slug, updated_at FROM products WHERE status = 'active' ORDER BY slug",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
