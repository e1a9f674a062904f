//! Storefront and admin back-office API.
//!
//! ## Features
//! - Product catalog, categories and CSV import
//! - Session carts, checkout and order management
//! - Coupons and a lucky-wheel promotion
//! - Storefront analytics and an admin dashboard
//! - Markdown content hub, CMS pages and a sitemap
//! - Marketplace sync, payment gateway settings and an AI copy assistant

pub mod ai;
pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod marketplace;
pub mod publisher;
pub mod seo;
pub mod storage;

pub use api::{build_app, middleware::AuthState, AppState};
pub use config::{load_app_config, AppConfig};
pub use error::{Result, StoreError};
