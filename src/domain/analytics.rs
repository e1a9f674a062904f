//! Storefront analytics: event types and single-pass aggregation.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Window used for the live-visitor counter.
pub const LIVE_WINDOW_MINUTES: i64 = 5;

const TOP_N: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    ProductView,
    AddToCart,
    CheckoutStarted,
    Purchase,
    WheelSpin,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event type '{0}'")]
pub struct UnknownEventType(pub String);

impl EventType {
    pub fn parse(s: &str) -> Result<Self, UnknownEventType> {
        match s {
            "page_view" => Ok(Self::PageView),
            "product_view" => Ok(Self::ProductView),
            "add_to_cart" => Ok(Self::AddToCart),
            "checkout_started" => Ok(Self::CheckoutStarted),
            "purchase" => Ok(Self::Purchase),
            "wheel_spin" => Ok(Self::WheelSpin),
            "custom" => Ok(Self::Custom),
            other => Err(UnknownEventType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::ProductView => "product_view",
            Self::AddToCart => "add_to_cart",
            Self::CheckoutStarted => "checkout_started",
            Self::Purchase => "purchase",
            Self::WheelSpin => "wheel_spin",
            Self::Custom => "custom",
        }
    }
}

/// The fields of a recorded event that the summary needs.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub event_type: EventType,
    pub session_id: String,
    pub path: Option<String>,
    pub product_id: Option<Uuid>,
    pub value: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountedPath {
    pub path: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountedProduct {
    pub product_id: Uuid,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub page_views: u64,
    pub visitors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_events: u64,
    pub page_views: u64,
    pub unique_visitors: u64,
    pub events_by_type: BTreeMap<EventType, u64>,
    pub top_pages: Vec<CountedPath>,
    pub top_products: Vec<CountedProduct>,
    pub revenue: i64,
    pub conversion_rate: f64,
    pub daily: Vec<DailyPoint>,
}

/// Aggregates `events` that fall inside `[from, to)`. Events outside the
/// window are ignored so callers may pass a superset.
pub fn summarize(events: &[EventRecord], from: DateTime<Utc>, to: DateTime<Utc>) -> AnalyticsSummary {
    let mut total_events = 0u64;
    let mut events_by_type: BTreeMap<EventType, u64> = BTreeMap::new();
    let mut sessions: HashSet<&str> = HashSet::new();
    let mut purchasing_sessions: HashSet<&str> = HashSet::new();
    let mut pages: HashMap<&str, u64> = HashMap::new();
    let mut products: HashMap<Uuid, u64> = HashMap::new();
    let mut daily: BTreeMap<NaiveDate, (u64, HashSet<&str>)> = BTreeMap::new();
    let mut revenue = 0i64;

    for event in events.iter().filter(|e| e.created_at >= from && e.created_at < to) {
        total_events += 1;
        *events_by_type.entry(event.event_type).or_default() += 1;
        sessions.insert(event.session_id.as_str());

        let day = daily.entry(event.created_at.date_naive()).or_default();
        day.1.insert(event.session_id.as_str());

        match event.event_type {
            EventType::PageView => {
                day.0 += 1;
                if let Some(path) = event.path.as_deref() {
                    *pages.entry(path).or_default() += 1;
                }
            }
            EventType::ProductView => {
                if let Some(id) = event.product_id {
                    *products.entry(id).or_default() += 1;
                }
            }
            EventType::Purchase => {
                purchasing_sessions.insert(event.session_id.as_str());
                revenue = revenue.saturating_add(event.value.unwrap_or(0));
            }
            _ => {}
        }
    }

    let unique_visitors = sessions.len() as u64;
    let conversion_rate = if unique_visitors == 0 {
        0.0
    } else {
        purchasing_sessions.len() as f64 / unique_visitors as f64
    };

    let mut top_pages: Vec<CountedPath> = pages
        .into_iter()
        .map(|(path, views)| CountedPath { path: path.to_string(), views })
        .collect();
    top_pages.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.path.cmp(&b.path)));
    top_pages.truncate(TOP_N);

    let mut top_products: Vec<CountedProduct> = products
        .into_iter()
        .map(|(product_id, views)| CountedProduct { product_id, views })
        .collect();
    top_products.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.product_id.cmp(&b.product_id)));
    top_products.truncate(TOP_N);

    AnalyticsSummary {
        from,
        to,
        total_events,
        page_views: events_by_type.get(&EventType::PageView).copied().unwrap_or(0),
        unique_visitors,
        events_by_type,
        top_pages,
        top_products,
        revenue,
        conversion_rate,
        daily: daily
            .into_iter()
            .map(|(date, (page_views, visitors))| DailyPoint { date, page_views, visitors: visitors.len() as u64 })
            .collect(),
    }
}

/// Distinct sessions seen within the live window ending at `now`.
pub fn live_visitors<'a>(sessions: impl IntoIterator<Item = (&'a str, DateTime<Utc>)>, now: DateTime<Utc>) -> u64 {
    let since = now - Duration::minutes(LIVE_WINDOW_MINUTES);
    sessions
        .into_iter()
        .filter(|(_, at)| *at >= since && *at <= now)
        .map(|(session, _)| session)
        .collect::<HashSet<_>>()
        .len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: EventType, session: &str, at: DateTime<Utc>) -> EventRecord {
        EventRecord { event_type, session_id: session.into(), path: None, product_id: None, value: None, created_at: at }
    }

    fn page(session: &str, path: &str, at: DateTime<Utc>) -> EventRecord {
        EventRecord { path: Some(path.into()), ..event(EventType::PageView, session, at) }
    }

    #[test]
    fn empty_log_has_zero_conversion() {
        let now = Utc::now();
        let s = summarize(&[], now - Duration::days(7), now);
        assert_eq!(s.total_events, 0);
        assert_eq!(s.conversion_rate, 0.0);
        assert!(s.daily.is_empty());
    }

    #[test]
    fn counts_visitors_pages_and_revenue() {
        let now = Utc::now();
        let t = now - Duration::hours(1);
        let product = Uuid::new_v4();
        let events = vec![
            page("a", "/", t),
            page("a", "/shop", t),
            page("b", "/", t),
            page("c", "/", t),
            EventRecord { product_id: Some(product), ..event(EventType::ProductView, "b", t) },
            EventRecord { value: Some(2500), ..event(EventType::Purchase, "b", t) },
            EventRecord { value: Some(1000), ..event(EventType::Purchase, "b", t) },
        ];
        let s = summarize(&events, now - Duration::days(1), now);

        assert_eq!(s.total_events, 7);
        assert_eq!(s.page_views, 4);
        assert_eq!(s.unique_visitors, 3);
        assert_eq!(s.revenue, 3500);
        assert!((s.conversion_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(s.top_pages[0], CountedPath { path: "/".into(), views: 3 });
        assert_eq!(s.top_products, vec![CountedProduct { product_id: product, views: 1 }]);
        assert_eq!(s.events_by_type[&EventType::Purchase], 2);
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let now = Utc::now();
        let events = vec![page("a", "/", now - Duration::days(10)), page("b", "/", now)];
        let s = summarize(&events, now - Duration::days(7), now);
        // `to` is exclusive
        assert_eq!(s.total_events, 0);
    }

    #[test]
    fn daily_series_is_ordered_by_date() {
        let now = Utc::now();
        let events = vec![
            page("a", "/", now - Duration::days(1)),
            page("a", "/", now - Duration::days(2)),
            page("b", "/", now - Duration::days(2)),
        ];
        let s = summarize(&events, now - Duration::days(7), now);
        assert_eq!(s.daily.len(), 2);
        assert!(s.daily[0].date < s.daily[1].date);
        assert_eq!(s.daily[0].page_views, 2);
        assert_eq!(s.daily[0].visitors, 2);
    }

    #[test]
    fn live_visitors_counts_distinct_recent_sessions() {
        let now = Utc::now();
        let seen = vec![
            ("a", now - Duration::minutes(1)),
            ("a", now - Duration::minutes(2)),
            ("b", now - Duration::minutes(4)),
            ("c", now - Duration::minutes(6)),
        ];
        assert_eq!(live_visitors(seen, now), 2);
    }

    #[test]
    fn event_type_parse_rejects_unknown() {
        assert_eq!(EventType::parse("purchase").unwrap(), EventType::Purchase);
        assert!(EventType::parse("click").is_err());
    }
}
