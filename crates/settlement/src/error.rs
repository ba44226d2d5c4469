//! Settlement error types.

use domain::{OrderId, ValidationError};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during settlement operations.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The order was malformed and rejected before any side effect.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order has no pending payment record to retry.
    #[error("No pending payment found for order {0}")]
    NoPendingPayment(OrderId),

    /// A remote authority could not be reached, timed out, or answered
    /// with an error.
    #[error("{service} unavailable: {reason}")]
    RemoteUnavailable {
        service: &'static str,
        reason: String,
    },

    /// A remote authority answered but refused the request, e.g. a 4xx
    /// status or an amount it does not accept.
    #[error("{service} rejected the request: {reason}")]
    Rejected {
        service: &'static str,
        reason: String,
    },

    /// The circuit breaker rejected the call without reaching the remote.
    #[error("Circuit breaker '{breaker}' is open")]
    CircuitOpen { breaker: &'static str },

    /// No endpoint is configured for a named service.
    #[error("No endpoint configured for service '{0}'")]
    EndpointUnresolved(String),

    /// Local persistence error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SettlementError {
    /// Creates a remote-unavailable error for a service.
    pub fn remote(service: &'static str, reason: impl std::fmt::Display) -> Self {
        SettlementError::RemoteUnavailable {
            service,
            reason: reason.to_string(),
        }
    }

    /// Creates a rejection error for a service.
    pub fn rejected(service: &'static str, reason: impl std::fmt::Display) -> Self {
        SettlementError::Rejected {
            service,
            reason: reason.to_string(),
        }
    }

    /// True for the not-found family (unknown order, nothing to retry).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SettlementError::OrderNotFound(_) | SettlementError::NoPendingPayment(_)
        )
    }

    /// True for failures of the remote side itself. These count against a
    /// circuit breaker.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SettlementError::RemoteUnavailable { .. }
                | SettlementError::CircuitOpen { .. }
                | SettlementError::EndpointUnresolved(_)
        )
    }

    /// True for failures that degrade to a PENDING payment instead of
    /// being returned: remote failures plus requests the authority refused.
    pub fn is_degradable(&self) -> bool {
        self.is_remote() || matches!(self, SettlementError::Rejected { .. })
    }
}

/// Convenience type alias for settlement results.
pub type Result<T> = std::result::Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let unavailable = SettlementError::remote("payment-service", "down");
        assert!(unavailable.is_remote());
        assert!(unavailable.is_degradable());

        let refused = SettlementError::rejected("payment-service", "zero amount");
        assert!(!refused.is_remote());
        assert!(refused.is_degradable());

        let missing = SettlementError::OrderNotFound(OrderId::new(1));
        assert!(missing.is_not_found());
        assert!(!missing.is_degradable());
    }
}
