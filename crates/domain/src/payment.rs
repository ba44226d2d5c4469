//! Payment records: the local settlement outcome of one order.

use chrono::{DateTime, Utc};
use common::{Money, OrderId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::order::Order;

/// Settlement status of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Success
/// ```
/// `Success` is terminal and never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
}

impl PaymentStatus {
    /// Returns true if this is the terminal state.
    pub fn is_success(&self) -> bool {
        matches!(self, PaymentStatus::Success)
    }

    /// Returns the wire/storage name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A status string that is neither `PENDING` nor `SUCCESS`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown payment status: {0}")]
pub struct UnknownPaymentStatus(pub String);

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownPaymentStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            other => Err(UnknownPaymentStatus(other.to_string())),
        }
    }
}

/// The settlement outcome for exactly one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    /// Absent while the record is pending.
    pub transaction_ref: Option<String>,
    pub settled_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Builds a pending record for an order.
    pub fn pending(order: &Order) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            amount: order.total_price,
            status: PaymentStatus::Pending,
            transaction_ref: None,
            settled_at: Utc::now(),
        }
    }

    /// Builds a settled record for an order.
    pub fn success(order: &Order, transaction_ref: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            amount: order.total_price,
            status: PaymentStatus::Success,
            transaction_ref: Some(transaction_ref.into()),
            settled_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }
}
