//! Marketplace connectors.
//!
//! Syncing pushes the active catalog to an external marketplace and pulls
//! its orders back. Only a simulated connector exists; it performs no
//! network calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketplaceKind {
    Shopee,
    Lazada,
    TiktokShop,
    Amazon,
    Ebay,
    Etsy,
}

impl MarketplaceKind {
    pub const ALL: [MarketplaceKind; 6] =
        [Self::Shopee, Self::Lazada, Self::TiktokShop, Self::Amazon, Self::Ebay, Self::Etsy];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shopee => "shopee",
            Self::Lazada => "lazada",
            Self::TiktokShop => "tiktok_shop",
            Self::Amazon => "amazon",
            Self::Ebay => "ebay",
            Self::Etsy => "etsy",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Shopee => "Shopee",
            Self::Lazada => "Lazada",
            Self::TiktokShop => "TikTok Shop",
            Self::Amazon => "Amazon",
            Self::Ebay => "eBay",
            Self::Etsy => "Etsy",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("marketplace API error: {0}")]
    Api(String),

    #[error(transparent)]
    Database(#[from] crate::error::StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub products_pushed: i64,
    pub orders_imported: i64,
}

impl SyncReport {
    pub fn summary(&self) -> String {
        format!(
            "pushed {} products, imported {} orders",
            self.products_pushed, self.orders_imported
        )
    }
}

#[async_trait]
pub trait MarketplaceConnector: Send + Sync {
    /// Runs one catalog/order sync against `marketplace`.
    async fn sync(&self, pool: &PgPool, marketplace: MarketplaceKind, shop_name: &str) -> Result<SyncReport>;
}

/// Stands in for the real marketplace APIs: waits for the configured delay
/// and reports the active catalog as pushed.
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    delay: Duration,
}

impl SimulatedConnector {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl MarketplaceConnector for SimulatedConnector {
    async fn sync(&self, pool: &PgPool, marketplace: MarketplaceKind, shop_name: &str) -> Result<SyncReport> {
        tracing::info!(marketplace = marketplace.as_str(), shop = shop_name, "simulating marketplace sync");
        tokio::time::sleep(self.delay).await;
        let products_pushed = db::products::count_active(pool).await?;
        Ok(SyncReport { products_pushed, orders_imported: 0 })
    }
}

pub fn simulated(delay_ms: u64) -> Arc<dyn MarketplaceConnector> {
    Arc::new(SimulatedConnector::new(Duration::from_millis(delay_ms)))
}
