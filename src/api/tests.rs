use std::collections::HashMap;
use std::env::VarError;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use tempfile::TempDir;
use tower::ServiceExt;

use super::middleware::AuthState;
use super::{build_app, AppState};
use crate::config::build_app_config;
use crate::domain::aggregates::Order;
use crate::publisher::EventPublisher;

const ADMIN_KEY: &str = "test-admin-key";

struct Harness {
    app: Router,
    _content: TempDir,
    _uploads: TempDir,
}

fn harness(pool: PgPool, auth: AuthState) -> Harness {
    let content = tempfile::tempdir().unwrap();
    let uploads = tempfile::tempdir().unwrap();
    let vars: HashMap<&str, String> = HashMap::from([
        ("DATABASE_URL", "postgres://unused".to_string()),
        ("STORE_CONTENT_DIR", content.path().display().to_string()),
        ("STORE_UPLOAD_DIR", uploads.path().display().to_string()),
        ("STORE_MARKETPLACE_SYNC_DELAY_MS", "0".to_string()),
        ("STORE_FLAT_SHIPPING", "500".to_string()),
        ("STORE_FREE_SHIPPING_THRESHOLD", "5000".to_string()),
    ]);
    let config = build_app_config(|key| vars.get(key).cloned().ok_or(VarError::NotPresent)).unwrap();
    let state = AppState::new(pool, config, EventPublisher::default());
    Harness { app: build_app(state, auth), _content: content, _uploads: uploads }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with(app, method, uri, body, Some(ADMIN_KEY)).await
}

async fn send_with(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    dispatch(app, request).await
}

/// Sends a non-JSON body with the admin key.
async fn send_bytes(app: &Router, uri: &str, content_type: &str, body: Vec<u8>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_KEY}"))
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    dispatch(app, request).await
}

async fn dispatch(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

async fn place_order(app: &Router, product_id: &str, quantity: u32, coupon: Option<&str>) -> (StatusCode, Value) {
    send_with(
        app,
        Method::POST,
        "/api/v1/orders",
        Some(json!({
            "items": [{ "product_id": product_id, "quantity": quantity }],
            "customer": { "email": "shopper@example.com" },
            "coupon_code": coupon,
        })),
        None,
    )
    .await
}

async fn product_stock(app: &Router, product_id: &str) -> i64 {
    let (_, product) = send(app, Method::GET, &format!("/api/v1/admin/products/{product_id}"), None).await;
    product["data"]["stock"].as_i64().unwrap()
}

async fn create_wheel(app: &Router, config: Value, prizes: &[Value]) -> String {
    let (status, body) = send(app, Method::POST, "/api/v1/admin/lucky-wheel/configs", Some(config)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let config_id = body["data"]["id"].as_str().unwrap().to_string();
    for prize in prizes {
        let uri = format!("/api/v1/admin/lucky-wheel/configs/{config_id}/prizes");
        let (status, body) = send(app, Method::POST, &uri, Some(prize.clone())).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }
    config_id
}

async fn spin(app: &Router, body: Value) -> (StatusCode, Value) {
    send_with(app, Method::POST, "/api/v1/lucky-wheel/spin", Some(body), None).await
}

async fn create_active_product(app: &Router, name: &str, price: i64, stock: i64) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/admin/products",
        Some(json!({ "name": name, "price": price, "stock": stock, "status": "active" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

#[sqlx::test(migrations = "./migrations")]
async fn health_reports_database_ok(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let (status, body) = send(&h.app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "ok");
    assert_eq!(body["data"]["events"], "disabled");
    assert_eq!(body["data"]["ai"], "disabled");
}

#[sqlx::test(migrations = "./migrations")]
async fn request_id_is_echoed(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-42");
}

#[sqlx::test(migrations = "./migrations")]
async fn missing_request_id_is_generated(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    let id = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok(), "{id}");
}

#[sqlx::test(migrations = "./migrations")]
async fn admin_routes_require_a_valid_bearer_key(pool: PgPool) {
    let h = harness(pool, AuthState::with_keys([ADMIN_KEY.to_string()]));

    let (status, body) = send_with(&h.app, Method::GET, "/api/v1/admin/products", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = send_with(&h.app, Method::GET, "/api/v1/admin/products", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.app, Method::GET, "/api/v1/admin/products", None).await;
    assert_eq!(status, StatusCode::OK);

    // Storefront routes stay open.
    let (status, _) = send_with(&h.app, Method::GET, "/api/v1/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
async fn product_create_get_and_delete(pool: PgPool) {
    let h = harness(pool, AuthState::with_keys([ADMIN_KEY.to_string()]));
    let product = create_active_product(&h.app, "Linen Shirt", 2_500, 10).await;
    assert_eq!(product["slug"], "linen-shirt");
    assert_eq!(product["price"], 2_500);
    assert_eq!(product["stock"], 10);
    let id = product["id"].as_str().unwrap().to_string();

    let (status, body) = send(&h.app, Method::GET, "/api/v1/products/slug/linen-shirt", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.as_str());

    let (status, body) = send(&h.app, Method::DELETE, &format!("/api/v1/admin/products/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], true);

    let (status, body) = send(&h.app, Method::GET, &format!("/api/v1/admin/products/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[sqlx::test(migrations = "./migrations")]
async fn stock_adjustment_cannot_go_negative(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let product = create_active_product(&h.app, "Beeswax Candle", 900, 2).await;
    let uri = format!("/api/v1/admin/products/{}/stock", product["id"].as_str().unwrap());

    let (status, body) = send(&h.app, Method::POST, &uri, Some(json!({ "delta": -3 }))).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["code"], "conflict");

    let (status, body) = send(&h.app, Method::POST, &uri, Some(json!({ "delta": 4 }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["stock"], 6);
}

#[sqlx::test(migrations = "./migrations")]
async fn invalid_product_body_is_a_validation_error(pool: PgPool) {
    let h = harness(pool, AuthState::with_keys([ADMIN_KEY.to_string()]));
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/admin/products",
        Some(json!({ "name": "", "price": -1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[sqlx::test(migrations = "./migrations")]
async fn status_filter_narrows_listing(pool: PgPool) {
    let h = harness(pool, AuthState::with_keys([ADMIN_KEY.to_string()]));
    create_active_product(&h.app, "Active Mug", 900, 3).await;
    let (status, _) = send(
        &h.app,
        Method::POST,
        "/api/v1/admin/products",
        Some(json!({ "name": "Draft Mug", "price": 900 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, all) = send(&h.app, Method::GET, "/api/v1/admin/products", None).await;
    assert_eq!(all["data"]["total"], 2);

    let (_, drafts) = send(&h.app, Method::GET, "/api/v1/admin/products?status=draft", None).await;
    assert_eq!(drafts["data"]["total"], 1);
    assert_eq!(drafts["data"]["items"][0]["name"], "Draft Mug");

    // The storefront only ever lists active products.
    let (_, public) = send_with(&h.app, Method::GET, "/api/v1/products?status=draft", None, None).await;
    assert_eq!(public["data"]["total"], 1);
    assert_eq!(public["data"]["items"][0]["name"], "Active Mug");
}

#[sqlx::test(migrations = "./migrations")]
async fn cart_checkout_places_order_and_takes_stock(pool: PgPool) {
    let h = harness(pool, AuthState::with_keys([ADMIN_KEY.to_string()]));
    let product = create_active_product(&h.app, "Canvas Tote", 1_200, 5).await;
    let product_id = product["id"].as_str().unwrap().to_string();

    let (status, cart) = send_with(
        &h.app,
        Method::POST,
        "/api/v1/cart/session-1/items",
        Some(json!({ "product_id": product_id, "quantity": 2 })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["data"]["item_count"], 2);
    assert_eq!(cart["data"]["subtotal"], 2_400);

    let (status, order) = send_with(
        &h.app,
        Method::POST,
        "/api/v1/cart/session-1/checkout",
        Some(json!({ "customer": { "email": "Buyer@Example.com", "name": "Buyer" } })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    let order = &order["data"];
    assert_eq!(order["subtotal"], 2_400);
    assert_eq!(order["shipping"], 500);
    assert_eq!(order["total"], 2_900);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["items"].as_array().unwrap().len(), 1);

    let (_, cart) = send_with(&h.app, Method::GET, "/api/v1/cart/session-1", None, None).await;
    assert_eq!(cart["data"]["item_count"], 0);

    let (_, product) = send(&h.app, Method::GET, &format!("/api/v1/admin/products/{product_id}"), None).await;
    assert_eq!(product["data"]["stock"], 3);

    let order_id = order["id"].as_str().unwrap();
    let (status, updated) = send(
        &h.app,
        Method::PATCH,
        &format!("/api/v1/admin/orders/{order_id}"),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["data"]["status"], "cancelled");

    let (_, product) = send(&h.app, Method::GET, &format!("/api/v1/admin/products/{product_id}"), None).await;
    assert_eq!(product["data"]["stock"], 5);
}

#[sqlx::test(migrations = "./migrations")]
async fn checkout_of_empty_cart_is_rejected(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/cart/nobody/checkout",
        Some(json!({ "customer": { "email": "a@example.com" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cart is empty");
}

#[sqlx::test(migrations = "./migrations")]
async fn order_beyond_stock_is_rejected(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let product = create_active_product(&h.app, "Rare Print", 10_000, 1).await;
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/orders",
        Some(json!({
            "items": [{ "product_id": product["id"], "quantity": 2 }],
            "customer": { "email": "collector@example.com" }
        })),
    )
    .await;
    assert!(status.is_client_error(), "{status} {body}");
    assert_eq!(body["success"], false);
}

#[sqlx::test(migrations = "./migrations")]
async fn lucky_wheel_spin_then_cooldown(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let (status, config) = send(
        &h.app,
        Method::POST,
        "/api/v1/admin/lucky-wheel/configs",
        Some(json!({ "name": "Summer wheel", "is_active": true, "cooldown_hours": 24 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{config}");
    let config_id = config["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &h.app,
        Method::POST,
        &format!("/api/v1/admin/lucky-wheel/configs/{config_id}/prizes"),
        Some(json!({ "label": "10% off", "prize_type": "percentage_discount", "value": 10, "probability": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, wheel) = send(&h.app, Method::GET, "/api/v1/lucky-wheel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wheel["data"]["prizes"][0]["label"], "10% off");
    assert!(wheel["data"]["prizes"][0].get("probability").is_none());

    let spin = json!({ "fingerprint": "device-abc" });
    let (status, first) = send(&h.app, Method::POST, "/api/v1/lucky-wheel/spin", Some(spin.clone())).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    let code = first["data"]["coupon_code"].as_str().unwrap().to_string();

    let (status, quote) = send(
        &h.app,
        Method::POST,
        "/api/v1/coupons/validate",
        Some(json!({ "code": code, "subtotal": 5_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{quote}");
    assert_eq!(quote["data"]["discount"], 500);

    let (status, second) = send(&h.app, Method::POST, "/api/v1/lucky-wheel/spin", Some(spin)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(second["code"], "not_eligible");
    assert!(second["next_eligible_at"].is_string());
}

#[sqlx::test(migrations = "./migrations")]
async fn settings_public_subset_and_gateway_redaction(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let (status, _) = send(
        &h.app,
        Method::PUT,
        "/api/v1/admin/settings/public.store_name",
        Some(json!({ "value": "Corner Shop" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    send(&h.app, Method::PUT, "/api/v1/admin/settings/smtp.password", Some(json!({ "value": "hunter2" }))).await;

    let (_, public) = send(&h.app, Method::GET, "/api/v1/settings/public", None).await;
    assert_eq!(public["data"], json!({ "store_name": "Corner Shop" }));

    let (status, gateway) = send(
        &h.app,
        Method::PUT,
        "/api/v1/admin/payment-gateways/stripe",
        Some(json!({ "is_enabled": true, "credentials": { "secret_key": "sk_test_1" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(gateway["data"]["credentials"]["secret_key"], "********");

    let (_, methods) = send(&h.app, Method::GET, "/api/v1/payment-methods", None).await;
    assert_eq!(methods["data"][0]["provider"], "stripe");
    assert!(methods["data"][0].get("credentials").is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn disabled_marketplace_cannot_sync(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let (status, _) = send(
        &h.app,
        Method::PUT,
        "/api/v1/admin/marketplaces/etsy",
        Some(json!({ "shop_name": "corner-shop" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&h.app, Method::POST, "/api/v1/admin/marketplaces/etsy/sync", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    send(
        &h.app,
        Method::PUT,
        "/api/v1/admin/marketplaces/etsy",
        Some(json!({ "shop_name": "corner-shop", "is_enabled": true })),
    )
    .await;
    create_active_product(&h.app, "Ceramic Bowl", 1_500, 4).await;

    let (status, body) = send(&h.app, Method::POST, "/api/v1/admin/marketplaces/etsy/sync", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["report"]["products_pushed"], 1);
    assert_eq!(body["data"]["marketplace"]["last_sync_status"], "success");

    let (status, _) = send(&h.app, Method::PUT, "/api/v1/admin/marketplaces/myspace", Some(json!({ "shop_name": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "./migrations")]
async fn sitemap_lists_active_products_and_published_pages(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    create_active_product(&h.app, "Wool Socks", 800, 20).await;
    send(
        &h.app,
        Method::POST,
        "/api/v1/admin/pages",
        Some(json!({ "title": "About Us", "content": "Hello", "is_published": true })),
    )
    .await;

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/sitemap.xml").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let xml = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(xml.contains("/products/wool-socks"));
    assert!(xml.contains("/pages/about-us"));
}

#[sqlx::test(migrations = "./migrations")]
async fn ai_endpoints_report_unavailable_without_key(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/admin/ai/product-description",
        Some(json!({ "name": "Linen Shirt" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "service_unavailable");
}

#[sqlx::test(migrations = "./migrations")]
async fn taken_order_number_is_skipped(pool: PgPool) {
    let today = chrono::Utc::now().date_naive();
    sqlx::query("SELECT setval('order_number_seq', 500)").execute(&pool).await.unwrap();
    sqlx::query(
        "INSERT INTO orders (id, order_number, customer_email, subtotal, total, currency) \
         VALUES ($1, $2, 'earlier@example.com', 0, 0, 'USD')",
    )
    .bind(uuid::Uuid::now_v7())
    .bind(Order::format_order_number(today, 501))
    .execute(&pool)
    .await
    .unwrap();

    let h = harness(pool, AuthState::disabled());
    let product = create_active_product(&h.app, "Enamel Mug", 1_500, 10).await;
    let product_id = product["id"].as_str().unwrap();

    let (status, first) = place_order(&h.app, product_id, 1, None).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    assert_eq!(first["data"]["order_number"], Order::format_order_number(today, 502));

    let (status, second) = place_order(&h.app, product_id, 1, None).await;
    assert_eq!(status, StatusCode::CREATED, "{second}");
    assert_eq!(second["data"]["order_number"], Order::format_order_number(today, 503));
}

#[sqlx::test(migrations = "./migrations")]
async fn failed_checkout_keeps_the_cart(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let product = create_active_product(&h.app, "Wool Blanket", 6_000, 5).await;
    let product_id = product["id"].as_str().unwrap();

    let (status, _) = send_with(
        &h.app,
        Method::POST,
        "/api/v1/cart/session-9/items",
        Some(json!({ "product_id": product_id, "quantity": 3 })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let uri = format!("/api/v1/admin/products/{product_id}/stock");
    send(&h.app, Method::POST, &uri, Some(json!({ "delta": -4 }))).await;

    let (status, body) = send_with(
        &h.app,
        Method::POST,
        "/api/v1/cart/session-9/checkout",
        Some(json!({ "customer": { "email": "buyer@example.com" } })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (_, cart) = send_with(&h.app, Method::GET, "/api/v1/cart/session-9", None, None).await;
    assert_eq!(cart["data"]["item_count"], 3);
    assert_eq!(product_stock(&h.app, product_id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn delivered_order_cannot_be_cancelled(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let product = create_active_product(&h.app, "Cork Board", 2_000, 4).await;
    let product_id = product["id"].as_str().unwrap();
    let (_, order) = place_order(&h.app, product_id, 2, None).await;
    let uri = format!("/api/v1/admin/orders/{}", order["data"]["id"].as_str().unwrap());

    let (status, body) = send(&h.app, Method::PATCH, &uri, Some(json!({ "status": "delivered" }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["fulfillment_status"], "fulfilled");

    let (status, body) = send(&h.app, Method::PATCH, &uri, Some(json!({ "status": "cancelled" }))).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(product_stock(&h.app, product_id).await, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn customer_with_orders_cannot_be_deleted(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let product = create_active_product(&h.app, "Tea Towel", 800, 3).await;
    let (_, order) = place_order(&h.app, product["id"].as_str().unwrap(), 1, None).await;
    let customer_id = order["data"]["customer_id"].as_str().unwrap();

    let uri = format!("/api/v1/admin/customers/{customer_id}");
    let (status, body) = send(&h.app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    let (status, customer) = send(&h.app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(customer["data"]["email"], "shopper@example.com");
}

#[sqlx::test(migrations = "./migrations")]
async fn csv_import_upserts_by_sku(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    for (name, sku) in [("Cotton Tee", "TEE-1"), ("Linen Shirt", "LS-1")] {
        let (status, body) = send(
            &h.app,
            Method::POST,
            "/api/v1/admin/products",
            Some(json!({ "name": name, "sku": sku, "price": 1_000 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let csv = "\
sku,name,price,stock,status
TEE-1,Cotton Tee,25.00,7,active
LS-2,Linen Shirt,40.00,3,active
BAD-1,,1.00,1,
";
    let (status, report) = send_bytes(&h.app, "/api/v1/admin/import/products", "text/csv", csv.into()).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["data"]["created"], 1);
    assert_eq!(report["data"]["updated"], 1);
    assert_eq!(report["data"]["errors"][0]["line"], 4);

    let (_, tee) = send(&h.app, Method::GET, "/api/v1/admin/products?search=TEE-1", None).await;
    assert_eq!(tee["data"]["items"][0]["price"], 2_500);
    assert_eq!(tee["data"]["items"][0]["stock"], 7);
    assert_eq!(tee["data"]["items"][0]["status"], "active");

    let (_, shirt) = send(&h.app, Method::GET, "/api/v1/admin/products?search=LS-2", None).await;
    assert_eq!(shirt["data"]["total"], 1);
    assert_eq!(shirt["data"]["items"][0]["slug"], "linen-shirt-ls-2");
}

#[sqlx::test(migrations = "./migrations")]
async fn image_upload_checks_content(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let product = create_active_product(&h.app, "Rattan Basket", 3_500, 2).await;
    let uri = format!("/api/v1/admin/products/{}/images", product["id"].as_str().unwrap());

    let multipart = |content: &[u8]| {
        let mut body = b"--BOUNDARY\r\nContent-Disposition: form-data; name=\"file\"; filename=\"basket.png\"\r\n\
Content-Type: image/png\r\n\r\n"
            .to_vec();
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n--BOUNDARY--\r\n");
        body
    };
    let content_type = "multipart/form-data; boundary=BOUNDARY";

    let (status, body) = send_bytes(&h.app, &uri, content_type, multipart(&b"<html>not an image</html>"[..])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let png: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    let (status, body) = send_bytes(&h.app, &uri, content_type, multipart(png)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let images = body["data"]["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    let url = images[0].as_str().unwrap();
    assert!(url.contains("/uploads/products/") && url.ends_with(".png"), "{url}");

    let stored: Vec<_> = std::fs::read_dir(h._uploads.path().join("products")).unwrap().collect();
    assert_eq!(stored.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn coupon_usage_is_counted_and_limited(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let product = create_active_product(&h.app, "Desk Lamp", 3_000, 10).await;
    let product_id = product["id"].as_str().unwrap();
    let (status, coupon) = send(
        &h.app,
        Method::POST,
        "/api/v1/admin/coupons",
        Some(json!({ "code": "ONCE5", "discount_type": "fixed", "value": 500, "usage_limit": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{coupon}");
    let coupon_uri = format!("/api/v1/admin/coupons/{}", coupon["data"]["id"].as_str().unwrap());

    let (status, order) = place_order(&h.app, product_id, 1, Some("once5")).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["data"]["discount"], 500);
    assert_eq!(order["data"]["coupon_code"], "ONCE5");
    let (_, coupon) = send(&h.app, Method::GET, &coupon_uri, None).await;
    assert_eq!(coupon["data"]["used_count"], 1);

    let (status, body) = place_order(&h.app, product_id, 1, Some("ONCE5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    let (_, coupon) = send(&h.app, Method::GET, &coupon_uri, None).await;
    assert_eq!(coupon["data"]["used_count"], 1);
    assert_eq!(product_stock(&h.app, product_id).await, 9);
}

#[sqlx::test(migrations = "./migrations")]
async fn wheel_prize_stock_and_fingerprint_quota(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let config_id = create_wheel(
        &h.app,
        json!({ "name": "Quota wheel", "is_active": true, "cooldown_hours": 0, "max_spins_per_fingerprint": 2 }),
        &[json!({ "label": "Tote bag", "prize_type": "gift", "probability": 1.0, "stock": 5 })],
    )
    .await;

    for _ in 0..2 {
        let (status, body) = spin(&h.app, json!({ "fingerprint": "device-1" })).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["prize"]["label"], "Tote bag");
        assert!(body["data"]["coupon_code"].is_null());
    }
    let (status, body) = spin(&h.app, json!({ "fingerprint": "device-1" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(body["code"], "not_eligible");

    let (_, prizes) = send(&h.app, Method::GET, &format!("/api/v1/admin/lucky-wheel/configs/{config_id}/prizes"), None).await;
    assert_eq!(prizes["data"][0]["stock"], 3);
}

#[sqlx::test(migrations = "./migrations")]
async fn wheel_user_quota_spans_devices(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    create_wheel(
        &h.app,
        json!({ "name": "Member wheel", "is_active": true, "cooldown_hours": 0, "max_spins_per_user": 1 }),
        &[json!({ "label": "Nothing", "prize_type": "no_prize", "probability": 1.0 })],
    )
    .await;
    let (status, customer) =
        send(&h.app, Method::POST, "/api/v1/admin/customers", Some(json!({ "email": "member@example.com" }))).await;
    assert_eq!(status, StatusCode::CREATED, "{customer}");
    let customer_id = customer["data"]["id"].as_str().unwrap();

    let (status, body) = spin(&h.app, json!({ "fingerprint": "phone", "customer_id": customer_id })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, body) = spin(&h.app, json!({ "fingerprint": "laptop", "customer_id": customer_id })).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    let (status, body) = spin(&h.app, json!({ "fingerprint": "laptop" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[sqlx::test(migrations = "./migrations")]
async fn sold_out_prize_is_redrawn(pool: PgPool) {
    let h = harness(pool, AuthState::disabled());
    let config_id = create_wheel(
        &h.app,
        json!({ "name": "Limited wheel", "is_active": true, "cooldown_hours": 0 }),
        &[
            json!({ "label": "Grand prize", "prize_type": "gift", "probability": 1000.0, "stock": 1, "position": 0 }),
            json!({ "label": "Try again", "prize_type": "no_prize", "probability": 0.000001, "position": 1 }),
        ],
    )
    .await;

    let (a, b) = tokio::join!(
        spin(&h.app, json!({ "fingerprint": "racer-a" })),
        spin(&h.app, json!({ "fingerprint": "racer-b" })),
    );
    assert_eq!(a.0, StatusCode::OK, "{}", a.1);
    assert_eq!(b.0, StatusCode::OK, "{}", b.1);
    let mut labels = [
        a.1["data"]["prize"]["label"].as_str().unwrap().to_string(),
        b.1["data"]["prize"]["label"].as_str().unwrap().to_string(),
    ];
    labels.sort();
    assert_eq!(labels, ["Grand prize", "Try again"]);

    let (_, body) = spin(&h.app, json!({ "fingerprint": "racer-c" })).await;
    assert_eq!(body["data"]["prize"]["label"], "Try again");
    let (_, prizes) = send(&h.app, Method::GET, &format!("/api/v1/admin/lucky-wheel/configs/{config_id}/prizes"), None).await;
    assert_eq!(prizes["data"][0]["stock"], 0);
}
