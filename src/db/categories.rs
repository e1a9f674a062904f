//! Queries for the `categories` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

const COLUMNS: &str = "id, name, slug, description, parent_id, image_url, position, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CategoryValues {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub position: i32,
}

pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>> {
    let rows = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {COLUMNS} FROM categories ORDER BY position, name"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_category(pool: &PgPool, id: Uuid) -> Result<Option<CategoryRow>> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!("SELECT {COLUMNS} FROM categories WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_id_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM categories WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

pub async fn insert_category(pool: &PgPool, values: &CategoryValues) -> Result<CategoryRow> {
    sqlx::query_as::<_, CategoryRow>(&format!(
        "INSERT INTO categories (id, name, slug, description, parent_id, image_url, position) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(&values.name)
    .bind(&values.slug)
    .bind(values.description.as_deref())
    .bind(values.parent_id)
    .bind(values.image_url.as_deref())
    .bind(values.position)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "category slug"))
}

pub async fn update_category(pool: &PgPool, id: Uuid, values: &CategoryValues) -> Result<Option<CategoryRow>> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "UPDATE categories SET name = $2, slug = $3, description = $4, parent_id = $5, \
                image_url = $6, position = $7, updated_at = NOW() \
         WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(&values.name)
    .bind(&values.slug)
    .bind(values.description.as_deref())
    .bind(values.parent_id)
    .bind(values.image_url.as_deref())
    .bind(values.position)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "category slug"))?;
    Ok(row)
}

pub async fn delete_category(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
