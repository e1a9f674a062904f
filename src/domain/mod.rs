//! Domain model: aggregates, value objects and the pure business rules.
pub mod aggregates;
pub mod analytics;
pub mod catalog_import;
pub mod coupon;
pub mod events;
pub mod lucky_wheel;
pub mod value_objects;
