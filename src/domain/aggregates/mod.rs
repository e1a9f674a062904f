//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Product, ProductError, ProductSnapshot, ProductStatus, SeoFields};
pub use order::{FulfillmentStatus, LineItem, Order, OrderError, OrderStatus, PaymentStatus, PricingRules, StatusEffect};
pub use cart::{Cart, CartError, CartItem};
