//! Shared identifier and money types.

mod money;
mod types;

pub use money::Money;
pub use types::{BuyerId, OrderId, ProductId};
