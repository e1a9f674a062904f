use axum::{extract::State, Json};

use super::{ok, ApiResponse, AppState};
use crate::db::{self, dashboard::DashboardStats};
use crate::error::Result;

pub async fn get_dashboard(State(state): State<AppState>) -> Result<Json<ApiResponse<DashboardStats>>> {
    let stats = db::dashboard::load_stats(&state.pool, state.config.store.low_stock_threshold).await?;
    Ok(ok(stats))
}
