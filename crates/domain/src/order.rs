//! Orders: the purchase intent placed by a buyer.

use chrono::{DateTime, Utc};
use common::{BuyerId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Placement input for a single-product order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub buyer_id: BuyerId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub total_price: Money,
}

impl NewOrder {
    /// Creates a new placement input.
    pub fn new(
        buyer_id: impl Into<BuyerId>,
        product_id: impl Into<ProductId>,
        quantity: u32,
        total_price: Money,
    ) -> Self {
        Self {
            buyer_id: buyer_id.into(),
            product_id: product_id.into(),
            quantity,
            total_price,
        }
    }

    /// Checks quantity and price.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quantity == 0 {
            return Err(ValidationError::InvalidQuantity {
                quantity: i64::from(self.quantity),
            });
        }
        if self.total_price.is_negative() {
            return Err(ValidationError::NegativePrice {
                price: self.total_price,
            });
        }
        Ok(())
    }

    /// Turns this input into a persisted order once the store has assigned an id.
    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            buyer_id: self.buyer_id,
            product_id: self.product_id,
            quantity: self.quantity,
            total_price: self.total_price,
            created_at,
        }
    }
}

/// A persisted order. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: BuyerId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub total_price: Money,
    pub created_at: DateTime<Utc>,
}
