//! Domain model for order settlement.
//!
//! This crate provides:
//! - [`NewOrder`] placement input with validation
//! - [`Order`], the immutable persisted purchase intent
//! - [`PaymentRecord`] and [`PaymentStatus`], the local settlement outcome

pub mod error;
pub mod order;
pub mod payment;

pub use common::{BuyerId, Money, OrderId, ProductId};
pub use error::ValidationError;
pub use order::{NewOrder, Order};
pub use payment::{PaymentRecord, PaymentStatus, UnknownPaymentStatus};
