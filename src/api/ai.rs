use axum::{extract::State, Json};
use serde::Serialize;

use super::{ok, ApiResponse, AppState, ValidJson};
use crate::ai::{DescriptionRequest, SeoMeta, SeoMetaRequest};
use crate::error::Result;

#[derive(Debug, Serialize)]
pub struct GeneratedDescription {
    pub description: String,
}

pub async fn product_description(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<DescriptionRequest>,
) -> Result<Json<ApiResponse<GeneratedDescription>>> {
    let description = state.ai.generate_product_description(&req).await?;
    tracing::info!(product = %req.name, chars = description.chars().count(), "generated product description");
    Ok(ok(GeneratedDescription { description }))
}

pub async fn seo_meta(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<SeoMetaRequest>,
) -> Result<Json<ApiResponse<SeoMeta>>> {
    Ok(ok(state.ai.generate_seo_meta(&req).await?))
}
