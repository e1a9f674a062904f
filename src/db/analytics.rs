//! Queries for the `analytics_events` table.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::analytics::{EventRecord, EventType, LIVE_WINDOW_MINUTES};
use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: EventType,
    pub session_id: String,
    pub path: Option<String>,
    pub product_id: Option<Uuid>,
    pub value: Option<i64>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_type: String,
    session_id: String,
    path: Option<String>,
    product_id: Option<Uuid>,
    value: Option<i64>,
    created_at: DateTime<Utc>,
}

pub async fn insert_event(pool: &PgPool, event: &NewEvent) -> Result<Uuid> {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO analytics_events (id, event_type, session_id, path, product_id, value, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(event.event_type.as_str())
    .bind(&event.session_id)
    .bind(event.path.as_deref())
    .bind(event.product_id)
    .bind(event.value)
    .bind(&event.metadata)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Events in `[from, to)`, oldest first.
pub async fn events_between(pool: &PgPool, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRow>(
        "SELECT event_type, session_id, path, product_id, value, created_at FROM analytics_events \
         WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(EventRecord {
                event_type: EventType::parse(&row.event_type).map_err(StoreError::from)?,
                session_id: row.session_id,
                path: row.path,
                product_id: row.product_id,
                value: row.value,
                created_at: row.created_at,
            })
        })
        .collect()
}

/// `(session_id, created_at)` of every event in the live window.
pub async fn recent_sessions(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<(String, DateTime<Utc>)>> {
    let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
        "SELECT session_id, created_at FROM analytics_events WHERE created_at >= $1",
    )
    .bind(now - Duration::minutes(LIVE_WINDOW_MINUTES))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
