//! Domain error types.

use common::Money;
use thiserror::Error;

/// Reasons an order is rejected before any side effect takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was absent from the placement request.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Quantity must be a positive integer.
    #[error("Invalid quantity: {quantity} (must be positive)")]
    InvalidQuantity { quantity: i64 },

    /// Total price must not be negative.
    #[error("Invalid total price: {price} (must not be negative)")]
    NegativePrice { price: Money },
}
