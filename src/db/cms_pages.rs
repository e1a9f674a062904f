//! Queries for the `cms_pages` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::PageRequest;
use crate::error::{Result, StoreError};

const COLUMNS: &str =
    "id, slug, title, content, meta_title, meta_description, is_published, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CmsPageRow {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PageValues {
    pub slug: String,
    pub title: String,
    pub content: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub is_published: bool,
}

pub async fn list_pages(
    pool: &PgPool,
    published: Option<bool>,
    page: PageRequest,
) -> Result<(Vec<CmsPageRow>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM cms_pages WHERE ($1::BOOLEAN IS NULL OR is_published = $1)",
    )
    .bind(published)
    .fetch_one(pool)
    .await?;
    let rows = sqlx::query_as::<_, CmsPageRow>(&format!(
        "SELECT {COLUMNS} FROM cms_pages WHERE ($1::BOOLEAN IS NULL OR is_published = $1) \
         ORDER BY updated_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(published)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;
    Ok((rows, total))
}

pub async fn get_page(pool: &PgPool, id: Uuid) -> Result<Option<CmsPageRow>> {
    let row = sqlx::query_as::<_, CmsPageRow>(&format!("SELECT {COLUMNS} FROM cms_pages WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_published_by_slug(pool: &PgPool, slug: &str) -> Result<Option<CmsPageRow>> {
    let row = sqlx::query_as::<_, CmsPageRow>(&format!(
        "SELECT {COLUMNS} FROM cms_pages WHERE slug = $1 AND is_published"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn insert_page(pool: &PgPool, values: &PageValues) -> Result<CmsPageRow> {
    sqlx::query_as::<_, CmsPageRow>(&format!(
        "INSERT INTO cms_pages (id, slug, title, content, meta_title, meta_description, is_published) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(&values.slug)
    .bind(&values.title)
    .bind(&values.content)
    .bind(values.meta_title.as_deref())
    .bind(values.meta_description.as_deref())
    .bind(values.is_published)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "page slug"))
}

pub async fn update_page(pool: &PgPool, id: Uuid, values: &PageValues) -> Result<Option<CmsPageRow>> {
    let row = sqlx::query_as::<_, CmsPageRow>(&format!(
        "UPDATE cms_pages SET slug = $2, title = $3, content = $4, meta_title = $5, \
                meta_description = $6, is_published = $7, updated_at = NOW() \
         WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(&values.slug)
    .bind(&values.title)
    .bind(&values.content)
    .bind(values.meta_title.as_deref())
    .bind(values.meta_description.as_deref())
    .bind(values.is_published)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "page slug"))?;
    Ok(row)
}

pub async fn delete_page(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM cms_pages WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// `(slug, updated_at)` of every published page, for the sitemap.
pub async fn list_published_slugs(pool: &PgPool) -> Result<Vec<(String, DateTime<Utc>)>> {
    let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
        "SELECT slug, updated_at FROM cms_pages WHERE is_published ORDER BY slug",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
