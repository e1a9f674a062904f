//! Order Aggregate

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::StoreRules;
use crate::domain::coupon::Coupon;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug)]
pub struct Order {
    id: Uuid,
    order_number: String,
    currency: String,
    status: OrderStatus,
    fulfillment: FulfillmentStatus,
    payment: PaymentStatus,
    items: Vec<LineItem>,
    coupon: Option<Coupon>,
    rules: PricingRules,
    subtotal: Money,
    shipping: Money,
    tax: Money,
    discount: Money,
    total: Money,
    tracking_number: Option<String>,
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineItem { pub product_id: Uuid, pub name: String, pub sku: String, pub quantity: u32, pub unit_price: Money }

impl LineItem {
    pub fn total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

/// Shipping and tax parameters, in minor units / basis points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PricingRules { pub flat_shipping: i64, pub free_shipping_threshold: i64, pub tax_rate_bps: u32 }

impl From<&StoreRules> for PricingRules {
    fn from(rules: &StoreRules) -> Self {
        Self {
            flat_shipping: rules.flat_shipping,
            free_shipping_threshold: rules.free_shipping_threshold,
            tax_rate_bps: rules.tax_rate_bps,
        }
    }
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name { $($variant),+ }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn parse(s: &str) -> Result<Self, OrderError> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(OrderError::InvalidStatus(other.to_string())),
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self { $(Self::$variant => $text),+ }
            }
        }
    };
}

string_enum!(OrderStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

string_enum!(FulfillmentStatus { Unfulfilled => "unfulfilled", Fulfilled => "fulfilled" });

string_enum!(PaymentStatus { Pending => "pending", Paid => "paid", Failed => "failed", Refunded => "refunded" });

impl OrderStatus {
    fn is_closed(&self) -> bool { matches!(self, Self::Cancelled | Self::Refunded) }
}

/// Side effects the persistence layer must carry out after a status change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusEffect { pub restock: bool }

impl Order {
    pub fn create(order_number: impl Into<String>, currency: &str, rules: PricingRules) -> Self {
        Self {
            id: Uuid::now_v7(), order_number: order_number.into(), currency: currency.to_string(),
            status: OrderStatus::Pending, fulfillment: FulfillmentStatus::Unfulfilled, payment: PaymentStatus::Pending,
            items: vec![], coupon: None, rules, subtotal: Money::zero(currency), shipping: Money::zero(currency),
            tax: Money::zero(currency), discount: Money::zero(currency), total: Money::zero(currency),
            tracking_number: None, events: vec![],
        }
    }

    /// Rebuilds an existing order far enough to run status transitions.
    pub fn restore(
        id: Uuid,
        order_number: impl Into<String>,
        currency: &str,
        status: OrderStatus,
        payment: PaymentStatus,
        fulfillment: FulfillmentStatus,
        tracking_number: Option<String>,
    ) -> Self {
        let mut order = Self::create(order_number, currency, PricingRules::default());
        order.id = id;
        order.status = status;
        order.payment = payment;
        order.fulfillment = fulfillment;
        order.tracking_number = tracking_number;
        order
    }

    /// Formats an `ORD-` number from the placement date and a value drawn
    /// from a store-wide sequence. The sequence alone keeps numbers unique;
    /// it widens past six digits instead of wrapping.
    pub fn format_order_number(date: chrono::NaiveDate, sequence: i64) -> String {
        format!("ORD-{}-{:06}", date.format("%y%m%d"), sequence)
    }

    /// Replaces the number of an order that has not been placed yet.
    pub fn renumber(&mut self, order_number: String) { self.order_number = order_number; }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment }
    pub fn fulfillment_status(&self) -> FulfillmentStatus { self.fulfillment }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn coupon(&self) -> Option<&Coupon> { self.coupon.as_ref() }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn discount(&self) -> &Money { &self.discount }
    pub fn shipping(&self) -> &Money { &self.shipping }
    pub fn tax(&self) -> &Money { &self.tax }
    pub fn total(&self) -> &Money { &self.total }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }

    pub fn add_item(&mut self, item: LineItem) -> Result<(), OrderError> {
        if item.quantity == 0 { return Err(OrderError::InvalidQuantity); }
        if item.unit_price.currency() != self.currency { return Err(OrderError::CurrencyMismatch); }
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
        } else {
            self.items.push(item);
        }
        self.recalculate();
        Ok(())
    }

    pub fn apply_coupon(&mut self, coupon: Coupon) { self.coupon = Some(coupon); self.recalculate(); }

    /// Marks the order as placed. Must be called after the items are final.
    pub fn place(&mut self) -> Result<(), OrderError> {
        if self.items.is_empty() { return Err(OrderError::NoItems); }
        self.raise_event(DomainEvent::Order(OrderEvent::Created {
            order_id: self.id,
            order_number: self.order_number.clone(),
            total: self.total.to_minor(),
        }));
        Ok(())
    }

    /// Moves the order to `next`. Closed orders (cancelled, refunded) only
    /// accept a refund; a delivered order cannot be cancelled.
    pub fn set_status(&mut self, next: OrderStatus) -> Result<StatusEffect, OrderError> {
        if next == self.status { return Ok(StatusEffect::default()); }
        if self.status.is_closed() && !(self.status == OrderStatus::Cancelled && next == OrderStatus::Refunded) {
            return Err(OrderError::Closed(self.status.as_str()));
        }
        if self.status == OrderStatus::Delivered && next == OrderStatus::Cancelled {
            return Err(OrderError::CannotCancel);
        }

        let restock = next.is_closed() && !self.status.is_closed();
        self.status = next;
        let event = match next {
            OrderStatus::Confirmed => Some(OrderEvent::Confirmed { order_id: self.id }),
            OrderStatus::Shipped => {
                self.fulfillment = FulfillmentStatus::Fulfilled;
                Some(OrderEvent::Shipped { order_id: self.id, tracking: self.tracking_number.clone() })
            }
            OrderStatus::Delivered => {
                self.fulfillment = FulfillmentStatus::Fulfilled;
                Some(OrderEvent::Delivered { order_id: self.id })
            }
            OrderStatus::Cancelled => Some(OrderEvent::Cancelled { order_id: self.id }),
            OrderStatus::Refunded => {
                self.payment = match self.payment {
                    PaymentStatus::Paid => PaymentStatus::Refunded,
                    other => other,
                };
                Some(OrderEvent::Refunded { order_id: self.id })
            }
            OrderStatus::Pending | OrderStatus::Processing => None,
        };
        if let Some(event) = event { self.raise_event(DomainEvent::Order(event)); }
        Ok(StatusEffect { restock })
    }

    pub fn set_payment_status(&mut self, next: PaymentStatus) {
        if next == self.payment { return; }
        self.payment = next;
        if next == PaymentStatus::Paid {
            self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id }));
        }
    }

    pub fn set_tracking_number(&mut self, tracking: Option<String>) {
        self.tracking_number = tracking.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
    }

    fn recalculate(&mut self) {
        let zero = Money::zero(&self.currency);
        self.subtotal = self.items.iter().fold(zero.clone(), |acc, i| acc.add(&i.total()).unwrap_or(acc));
        self.discount = self.coupon.as_ref().map_or(zero.clone(), |c| c.discount(&self.subtotal));

        let free_by_threshold = self.rules.free_shipping_threshold > 0
            && self.subtotal.to_minor() >= self.rules.free_shipping_threshold;
        let free_by_coupon = self.coupon.as_ref().is_some_and(Coupon::grants_free_shipping);
        self.shipping = if self.items.is_empty() || free_by_threshold || free_by_coupon {
            zero.clone()
        } else {
            Money::from_minor(self.rules.flat_shipping.max(0), &self.currency)
        };

        let discounted = self.subtotal.saturating_sub(&self.discount).unwrap_or(zero);
        self.tax = discounted.basis_points(self.rules.tax_rate_bps);
        self.total = discounted.add(&self.shipping).and_then(|t| t.add(&self.tax)).unwrap_or(discounted);
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { NoItems, InvalidQuantity, CurrencyMismatch, InvalidStatus(String), CannotCancel, Closed(&'static str) }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "Order has no items"),
            Self::InvalidQuantity => write!(f, "Quantity must be at least 1"),
            Self::CurrencyMismatch => write!(f, "Item currency does not match the order"),
            Self::InvalidStatus(s) => write!(f, "Invalid status '{s}'"),
            Self::CannotCancel => write!(f, "A delivered order cannot be cancelled"),
            Self::Closed(s) => write!(f, "Order is {s} and can no longer change status"),
        }
    }
}
