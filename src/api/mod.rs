//! HTTP surface: storefront routes under `/api/v1`, admin routes under
//! `/api/v1/admin` behind bearer auth, plus `/health`, `/sitemap.xml` and the
//! `/uploads` file server.

mod ai;
mod analytics;
mod cart;
mod catalog;
mod content;
mod coupons;
mod customers;
mod dashboard;
mod lucky_wheel;
mod marketplaces;
pub mod middleware;
mod orders;
mod pages;
mod settings;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use validator::Validate;

use crate::ai::AiClient;
use crate::config::AppConfig;
use crate::db;
use crate::error::{Result, StoreError};
use crate::marketplace::{self, MarketplaceConnector};
use crate::publisher::EventPublisher;
use crate::seo::{sitemap, ArticleFilter, ContentLibrary};
use crate::storage::ImageStore;
use middleware::{request_id, require_bearer_auth, AuthState};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub publisher: EventPublisher,
    pub content: ContentLibrary,
    pub ai: AiClient,
    pub images: ImageStore,
    pub marketplace: Arc<dyn MarketplaceConnector>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, publisher: EventPublisher) -> Self {
        Self {
            content: ContentLibrary::new(&config.content_dir),
            ai: AiClient::new(&config.ai),
            images: ImageStore::new(&config.upload_dir, &config.public_base_url, config.max_upload_bytes),
            marketplace: marketplace::simulated(config.marketplace_sync_delay_ms),
            config: Arc::new(config),
            publisher,
            pool,
        }
    }

    fn currency(&self) -> &str {
        &self.config.store.currency
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

pub(crate) fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data })
}

pub(crate) fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok(data))
}

#[derive(Debug, Serialize)]
pub(crate) struct Deleted {
    deleted: bool,
}

pub(crate) fn deleted(found: bool, what: &'static str) -> Result<Json<ApiResponse<Deleted>>> {
    if found {
        Ok(ok(Deleted { deleted: true }))
    } else {
        Err(StoreError::NotFound(what))
    }
}

/// JSON body that is deserialized and then checked with `validator`. Both
/// failures become a 400 with the JSON error body.
pub(crate) struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = StoreError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| StoreError::validation(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Replaces every credential value with a mask, keeping the keys so the
/// admin UI can show which fields are set.
pub(crate) fn redact_credentials(credentials: &serde_json::Value) -> serde_json::Value {
    match credentials {
        serde_json::Value::Object(map) => map
            .keys()
            .map(|k| (k.clone(), serde_json::Value::String("********".to_string())))
            .collect::<serde_json::Map<_, _>>()
            .into(),
        _ => serde_json::Value::Object(serde_json::Map::new()),
    }
}

fn storefront_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(catalog::list_public_products))
        .route("/products/:id", get(catalog::get_public_product))
        .route("/products/slug/:slug", get(catalog::get_public_product_by_slug))
        .route("/categories", get(catalog::list_categories))
        .route("/categories/:id", get(catalog::get_category))
        .route("/cart/:session", get(cart::get_cart).delete(cart::clear_cart))
        .route("/cart/:session/items", post(cart::add_item))
        .route(
            "/cart/:session/items/:product_id",
            put(cart::update_item).delete(cart::remove_item),
        )
        .route("/cart/:session/checkout", post(cart::checkout))
        .route("/orders", post(orders::create_order))
        .route("/coupons/validate", post(coupons::validate_coupon))
        .route("/lucky-wheel", get(lucky_wheel::get_active_wheel))
        .route("/lucky-wheel/spin", post(lucky_wheel::spin))
        .route("/analytics/events", post(analytics::record_event))
        .route("/content/articles", get(content::list_articles))
        .route("/content/articles/:slug", get(content::get_article))
        .route("/content/categories", get(content::list_categories))
        .route("/content/tags", get(content::list_tags))
        .route("/pages/:slug", get(pages::get_published_page))
        .route("/settings/public", get(settings::list_public_settings))
        .route("/payment-methods", get(settings::list_payment_methods))
}

fn admin_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard::get_dashboard))
        .route("/products", get(catalog::list_products).post(catalog::create_product))
        .route(
            "/products/:id",
            get(catalog::get_product)
                .patch(catalog::update_product)
                .put(catalog::update_product)
                .delete(catalog::delete_product),
        )
        .route("/products/:id/stock", post(catalog::adjust_stock))
        .route(
            "/products/:id/images",
            post(catalog::upload_product_image)
                .layer(axum::extract::DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/import/products",
            post(catalog::import_products).layer(axum::extract::DefaultBodyLimit::max(upload_limit)),
        )
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route(
            "/categories/:id",
            get(catalog::get_category)
                .put(catalog::update_category)
                .delete(catalog::delete_category),
        )
        .route("/orders", get(orders::list_orders))
        .route(
            "/orders/:id",
            get(orders::get_order)
                .patch(orders::update_order_status)
                .delete(orders::delete_order),
        )
        .route("/customers", get(customers::list_customers).post(customers::create_customer))
        .route(
            "/customers/:id",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        )
        .route("/coupons", get(coupons::list_coupons).post(coupons::create_coupon))
        .route(
            "/coupons/:id",
            get(coupons::get_coupon)
                .put(coupons::update_coupon)
                .delete(coupons::delete_coupon),
        )
        .route(
            "/lucky-wheel/configs",
            get(lucky_wheel::list_configs).post(lucky_wheel::create_config),
        )
        .route(
            "/lucky-wheel/configs/:id",
            get(lucky_wheel::get_config)
                .put(lucky_wheel::update_config)
                .delete(lucky_wheel::delete_config),
        )
        .route(
            "/lucky-wheel/configs/:id/prizes",
            get(lucky_wheel::list_prizes).post(lucky_wheel::create_prize),
        )
        .route(
            "/lucky-wheel/prizes/:id",
            put(lucky_wheel::update_prize).delete(lucky_wheel::delete_prize),
        )
        .route("/lucky-wheel/spins", get(lucky_wheel::list_spins))
        .route("/analytics/summary", get(analytics::summary))
        .route("/analytics/live", get(analytics::live))
        .route("/pages", get(pages::list_pages).post(pages::create_page))
        .route(
            "/pages/:id",
            get(pages::get_page).put(pages::update_page).delete(pages::delete_page),
        )
        .route("/settings", get(settings::list_settings))
        .route(
            "/settings/:key",
            put(settings::upsert_setting).delete(settings::delete_setting),
        )
        .route("/payment-gateways", get(settings::list_gateways))
        .route(
            "/payment-gateways/:provider",
            put(settings::upsert_gateway).delete(settings::delete_gateway),
        )
        .route("/marketplaces", get(marketplaces::list_marketplaces))
        .route(
            "/marketplaces/:marketplace",
            put(marketplaces::upsert_marketplace).delete(marketplaces::delete_marketplace),
        )
        .route("/marketplaces/:marketplace/sync", post(marketplaces::sync_marketplace))
        .route("/ai/product-description", post(ai::product_description))
        .route("/ai/seo-meta", post(ai::seo_meta))
}

pub fn build_app(state: AppState, auth: AuthState) -> Router {
    // Multipart framing needs some room on top of the file itself.
    let upload_limit = state.images.max_bytes() + 64 * 1024;
    let uploads = ServeDir::new(state.images.root());

    let api = storefront_routes().nest(
        "/admin",
        admin_routes(upload_limit)
            .route_layer(axum::middleware::from_fn_with_state(auth, require_bearer_auth)),
    );

    Router::new()
        .route("/health", get(health))
        .route("/sitemap.xml", get(sitemap_xml))
        .nest("/api/v1", api)
        .nest_service("/uploads", uploads)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_id))
        .with_state(state)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
    events: &'static str,
    ai: &'static str,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (code, status, database) = match db::ping(&state.pool).await {
        Ok(()) => (StatusCode::OK, "ok", "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
        }
    };
    let events = if state.publisher.is_connected() { "connected" } else { "disabled" };
    let ai = if state.ai.is_configured() { "configured" } else { "disabled" };
    (code, ok(HealthData { status, database, events, ai }))
}

async fn sitemap_xml(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let mut entries = vec![sitemap::SitemapEntry::new("/", None)];
    for (slug, updated_at) in db::products::list_active_slugs(&state.pool).await? {
        entries.push(sitemap::SitemapEntry::new(format!("/products/{slug}"), Some(updated_at.date_naive())));
    }
    for (slug, updated_at) in db::cms_pages::list_published_slugs(&state.pool).await? {
        entries.push(sitemap::SitemapEntry::new(format!("/pages/{slug}"), Some(updated_at.date_naive())));
    }
    for article in state.content.list(&ArticleFilter::default()).await? {
        let modified: Option<NaiveDate> = article.updated.or(article.date);
        entries.push(sitemap::SitemapEntry::new(format!("/blog/{}", article.slug), modified));
    }

    let xml = sitemap::render(&state.config.public_base_url, &entries)
        .map_err(|e| StoreError::Internal(format!("rendering sitemap: {e}")))?;
    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml))
}
