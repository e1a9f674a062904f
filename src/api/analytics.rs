use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{created, ok, ApiResponse, AppState, ValidJson};
use crate::db::{self, analytics::NewEvent};
use crate::domain::analytics::{self as stats, AnalyticsSummary, EventType};
use crate::error::Result;

const DEFAULT_DAYS: i64 = 30;
const MAX_DAYS: i64 = 365;

#[derive(Debug, Deserialize, Validate)]
pub struct EventRequest {
    pub event_type: String,
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    #[validate(length(max = 2048))]
    pub path: Option<String>,
    pub product_id: Option<Uuid>,
    #[validate(range(min = 0))]
    pub value: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct Recorded {
    pub id: Uuid,
}

pub async fn record_event(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<EventRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Recorded>>)> {
    let event = NewEvent {
        event_type: EventType::parse(&req.event_type)?,
        session_id: req.session_id,
        path: req.path.filter(|p| !p.is_empty()),
        product_id: req.product_id,
        value: req.value,
        metadata: req.metadata.unwrap_or_else(|| serde_json::json!({})),
    };
    let id = db::analytics::insert_event(&state.pool, &event).await?;
    Ok(created(Recorded { id }))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<i64>,
}

pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<ApiResponse<AnalyticsSummary>>> {
    let days = query.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS);
    let to = Utc::now();
    let from = to - Duration::days(days);
    let events = db::analytics::events_between(&state.pool, from, to).await?;
    tracing::debug!(days, events = events.len(), "computing analytics summary");
    Ok(ok(stats::summarize(&events, from, to)))
}

#[derive(Debug, Serialize)]
pub struct LiveVisitors {
    pub live_visitors: u64,
    pub window_minutes: i64,
}

pub async fn live(State(state): State<AppState>) -> Result<Json<ApiResponse<LiveVisitors>>> {
    let now = Utc::now();
    let sessions = db::analytics::recent_sessions(&state.pool, now).await?;
    let live_visitors = stats::live_visitors(sessions.iter().map(|(s, at)| (s.as_str(), *at)), now);
    Ok(ok(LiveVisitors { live_visitors, window_minutes: stats::LIVE_WINDOW_MINUTES }))
}
