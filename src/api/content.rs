use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{ok, ApiResponse, AppState};
use crate::error::{Result, StoreError};
use crate::seo::{Article, ArticleFilter, ArticleSummary, TermCount};

#[derive(Debug, Default, Deserialize)]
pub struct ArticleQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
}

pub async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticleQuery>,
) -> Result<Json<ApiResponse<Vec<ArticleSummary>>>> {
    let filter = ArticleFilter { category: query.category.as_deref(), tag: query.tag.as_deref() };
    Ok(ok(state.content.list(&filter).await?))
}

pub async fn get_article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<Article>>> {
    state.content.get(&slug).await?.map(ok).ok_or(StoreError::NotFound("article"))
}

pub async fn list_categories(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<TermCount>>>> {
    Ok(ok(state.content.categories().await?))
}

pub async fn list_tags(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<TermCount>>>> {
    Ok(ok(state.content.tags().await?))
}
