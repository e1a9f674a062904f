use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{created, deleted, ok, ApiResponse, AppState, Deleted, ValidJson};
use crate::db::cms_pages::{CmsPageRow, PageValues};
use crate::db::{self, Page, PageRequest};
use crate::domain::value_objects::Slug;
use crate::error::{Result, StoreError};

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub published: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PageRequestBody {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Derived from the title when absent.
    pub slug: Option<String>,
    #[serde(default)]
    pub content: String,
    #[validate(length(max = 70))]
    pub meta_title: Option<String>,
    #[validate(length(max = 200))]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub is_published: bool,
}

impl PageRequestBody {
    fn into_values(self) -> Result<PageValues> {
        let slug = match self.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Slug::parse(raw),
            None => Slug::from_name(&self.title),
        }
        .map_err(|e| StoreError::validation(format!("invalid slug: {e}")))?;

        Ok(PageValues {
            slug: slug.into_inner(),
            title: self.title.trim().to_string(),
            content: self.content,
            meta_title: self.meta_title,
            meta_description: self.meta_description,
            is_published: self.is_published,
        })
    }
}

pub async fn get_published_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<CmsPageRow>>> {
    db::cms_pages::get_published_by_slug(&state.pool, &slug)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("page"))
}

pub async fn list_pages(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Page<CmsPageRow>>>> {
    let page = PageRequest::new(query.page, query.per_page);
    let (items, total) = db::cms_pages::list_pages(&state.pool, query.published, page).await?;
    Ok(ok(Page::new(items, total, page)))
}

pub async fn get_page(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ApiResponse<CmsPageRow>>> {
    db::cms_pages::get_page(&state.pool, id)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("page"))
}

pub async fn create_page(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<PageRequestBody>,
) -> Result<(StatusCode, Json<ApiResponse<CmsPageRow>>)> {
    let row = db::cms_pages::insert_page(&state.pool, &req.into_values()?).await?;
    tracing::info!(page_id = %row.id, slug = %row.slug, "page created");
    Ok(created(row))
}

pub async fn update_page(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<PageRequestBody>,
) -> Result<Json<ApiResponse<CmsPageRow>>> {
    db::cms_pages::update_page(&state.pool, id, &req.into_values()?)
        .await?
        .map(ok)
        .ok_or(StoreError::NotFound("page"))
}

pub async fn delete_page(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ApiResponse<Deleted>>> {
    deleted(db::cms_pages::delete_page(&state.pool, id).await?, "page")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(title: &str, slug: Option<&str>) -> PageRequestBody {
        PageRequestBody {
            title: title.to_string(),
            slug: slug.map(str::to_string),
            content: String::new(),
            meta_title: None,
            meta_description: None,
            is_published: true,
        }
    }

    #[test]
    fn slug_defaults_to_title() {
        let values = body("About Our Shop", None).into_values().unwrap();
        assert_eq!(values.slug, "about-our-shop");
    }

    #[test]
    fn blank_slug_falls_back_to_title() {
        let values = body("Shipping", Some("  ")).into_values().unwrap();
        assert_eq!(values.slug, "shipping");
    }

    #[test]
    fn malformed_slug_is_rejected() {
        let err = body("Terms", Some("Terms Of Use")).into_values().unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
