//! Domain events
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    LuckyWheel(LuckyWheelEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, sku: String },
    Deleted { product_id: Uuid },
    StockAdjusted { product_id: Uuid, stock: i32 },
    Imported { created: usize, updated: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: String, total: i64 },
    Confirmed { order_id: Uuid },
    Paid { order_id: Uuid },
    Shipped { order_id: Uuid, tracking: Option<String> },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid },
    Refunded { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LuckyWheelEvent {
    Spun { spin_id: Uuid, config_id: Uuid, prize_label: String, coupon_code: Option<String> },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Product(e) => ("product", match e {
                ProductEvent::Created { .. } => "created",
                ProductEvent::Deleted { .. } => "deleted",
                ProductEvent::StockAdjusted { .. } => "stock_adjusted",
                ProductEvent::Imported { .. } => "imported",
            }),
            Self::Order(e) => ("order", match e {
                OrderEvent::Created { .. } => "created",
                OrderEvent::Confirmed { .. } => "confirmed",
                OrderEvent::Paid { .. } => "paid",
                OrderEvent::Shipped { .. } => "shipped",
                OrderEvent::Delivered { .. } => "delivered",
                OrderEvent::Cancelled { .. } => "cancelled",
                OrderEvent::Refunded { .. } => "refunded",
            }),
            Self::LuckyWheel(LuckyWheelEvent::Spun { .. }) => ("lucky_wheel", "spun"),
        };
        format!("store.{aggregate}.{name}")
    }
}
