//! Payment authority trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Money, OrderId, PaymentStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SettlementError};
use crate::resolver::PAYMENT_SERVICE;

/// Body of a settle call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub order_id: OrderId,
    pub amount: Money,
}

/// Answer to a settle call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub status: PaymentStatus,
    pub transaction_ref: Option<String>,
    pub amount: Money,
}

/// The payment authority's own record for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePaymentRecord {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    pub transaction_ref: Option<String>,
    pub amount: Money,
    pub settled_at: DateTime<Utc>,
}

/// Operations offered by the remote payment authority.
#[async_trait]
pub trait PaymentAuthority: Send + Sync {
    /// Asks the authority to settle an order.
    async fn settle(&self, request: SettleRequest) -> Result<SettleResponse>;

    /// Returns the authority's settlement status, or `None` if it has never
    /// seen the order.
    async fn status(&self, order_id: OrderId) -> Result<Option<PaymentStatus>>;

    /// Returns the authority's full record for the order.
    async fn record(&self, order_id: OrderId) -> Result<Option<RemotePaymentRecord>>;
}

/// How the in-memory authority answers settle calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettleBehavior {
    /// Settle immediately with a fresh transaction reference.
    #[default]
    Succeed,
    /// Settle, but leave the transaction reference out of the settle
    /// answer. The reference is still on record.
    SucceedWithoutReference,
    /// Accept the order but leave it pending.
    Defer,
    /// Fail as if the service were unreachable.
    Fail,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    records: HashMap<OrderId, RemotePaymentRecord>,
    behavior: SettleBehavior,
    reads_unavailable: bool,
    latency: Duration,
    settle_calls: u32,
    status_calls: u32,
    record_calls: u32,
}

/// In-memory payment authority for tests and local runs.
///
/// Mirrors the remote service: settlement assigns a UUID transaction
/// reference, a zero amount is rejected, and repeated settle calls for a
/// settled order return the existing record.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentAuthority {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentAuthority {
    /// Creates a new in-memory payment authority.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures how subsequent settle calls behave.
    pub fn set_behavior(&self, behavior: SettleBehavior) {
        self.write().behavior = behavior;
    }

    /// Makes status and record reads fail as if the service were down.
    pub fn set_reads_unavailable(&self, unavailable: bool) {
        self.write().reads_unavailable = unavailable;
    }

    /// Delays every call by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        self.write().latency = latency;
    }

    /// Settles an order out of band, as if the authority finished it later.
    ///
    /// Returns the transaction reference now on record.
    pub fn complete(&self, order_id: OrderId, amount: Money) -> String {
        let mut state = self.write();
        let record = state
            .records
            .entry(order_id)
            .or_insert_with(|| pending_record(order_id, amount));

        if record.status != PaymentStatus::Success {
            record.status = PaymentStatus::Success;
            record.transaction_ref = Some(Uuid::new_v4().to_string());
            record.settled_at = Utc::now();
        }
        record.transaction_ref.clone().unwrap_or_default()
    }

    /// Returns the authority's record for an order.
    pub fn record_for(&self, order_id: OrderId) -> Option<RemotePaymentRecord> {
        self.read().records.get(&order_id).cloned()
    }

    /// Number of settle calls received.
    pub fn settle_calls(&self) -> u32 {
        self.read().settle_calls
    }

    /// Number of status calls received.
    pub fn status_calls(&self) -> u32 {
        self.read().status_calls
    }

    /// Number of record calls received.
    pub fn record_calls(&self) -> u32 {
        self.read().record_calls
    }

    async fn simulate_latency(&self) {
        let latency = self.read().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryPaymentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn pending_record(order_id: OrderId, amount: Money) -> RemotePaymentRecord {
    RemotePaymentRecord {
        order_id,
        status: PaymentStatus::Pending,
        transaction_ref: None,
        amount,
        settled_at: Utc::now(),
    }
}

#[async_trait]
impl PaymentAuthority for InMemoryPaymentAuthority {
    async fn settle(&self, request: SettleRequest) -> Result<SettleResponse> {
        self.write().settle_calls += 1;
        self.simulate_latency().await;

        let mut state = self.write();

        if state.behavior == SettleBehavior::Fail {
            return Err(SettlementError::remote(PAYMENT_SERVICE, "service unavailable"));
        }
        if request.amount.is_zero() {
            return Err(SettlementError::rejected(
                PAYMENT_SERVICE,
                format!("amount is missing for order {}", request.order_id),
            ));
        }

        let behavior = state.behavior;
        let record = state
            .records
            .entry(request.order_id)
            .or_insert_with(|| pending_record(request.order_id, request.amount));

        let settles = matches!(
            behavior,
            SettleBehavior::Succeed | SettleBehavior::SucceedWithoutReference
        );
        if settles && record.status != PaymentStatus::Success {
            record.status = PaymentStatus::Success;
            record.transaction_ref = Some(Uuid::new_v4().to_string());
            record.amount = request.amount;
            record.settled_at = Utc::now();
        }

        let transaction_ref = match behavior {
            SettleBehavior::SucceedWithoutReference => None,
            _ => record.transaction_ref.clone(),
        };
        Ok(SettleResponse {
            status: record.status,
            transaction_ref,
            amount: record.amount,
        })
    }

    async fn status(&self, order_id: OrderId) -> Result<Option<PaymentStatus>> {
        self.write().status_calls += 1;
        self.simulate_latency().await;

        let state = self.read();
        if state.reads_unavailable {
            return Err(SettlementError::remote(PAYMENT_SERVICE, "service unavailable"));
        }
        Ok(state.records.get(&order_id).map(|r| r.status))
    }

    async fn record(&self, order_id: OrderId) -> Result<Option<RemotePaymentRecord>> {
        self.write().record_calls += 1;
        self.simulate_latency().await;

        let state = self.read();
        if state.reads_unavailable {
            return Err(SettlementError::remote(PAYMENT_SERVICE, "service unavailable"));
        }
        Ok(state.records.get(&order_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(order: i64) -> SettleRequest {
        SettleRequest {
            order_id: OrderId::new(order),
            amount: Money::from_cents(4000),
        }
    }

    #[tokio::test]
    async fn test_settle_succeeds_with_reference() {
        let authority = InMemoryPaymentAuthority::new();

        let response = authority.settle(request(1)).await.unwrap();
        assert_eq!(response.status, PaymentStatus::Success);
        assert!(response.transaction_ref.is_some());
        assert_eq!(authority.settle_calls(), 1);
        assert_eq!(
            authority.status(OrderId::new(1)).await.unwrap(),
            Some(PaymentStatus::Success)
        );
    }

    #[tokio::test]
    async fn test_repeated_settle_is_idempotent() {
        let authority = InMemoryPaymentAuthority::new();

        let first = authority.settle(request(1)).await.unwrap();
        let second = authority.settle(request(1)).await.unwrap();
        assert_eq!(first.transaction_ref, second.transaction_ref);
    }

    #[tokio::test]
    async fn test_deferred_settle_stays_pending() {
        let authority = InMemoryPaymentAuthority::new();
        authority.set_behavior(SettleBehavior::Defer);

        let response = authority.settle(request(1)).await.unwrap();
        assert_eq!(response.status, PaymentStatus::Pending);
        assert!(response.transaction_ref.is_none());

        let reference = authority.complete(OrderId::new(1), Money::from_cents(4000));
        let record = authority.record(OrderId::new(1)).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Success);
        assert_eq!(record.transaction_ref, Some(reference));
    }

    #[tokio::test]
    async fn test_fail_on_settle() {
        let authority = InMemoryPaymentAuthority::new();
        authority.set_behavior(SettleBehavior::Fail);

        let result = authority.settle(request(1)).await;
        assert!(matches!(
            result,
            Err(SettlementError::RemoteUnavailable { .. })
        ));
        assert!(authority.record_for(OrderId::new(1)).is_none());
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let authority = InMemoryPaymentAuthority::new();
        let result = authority
            .settle(SettleRequest {
                order_id: OrderId::new(1),
                amount: Money::zero(),
            })
            .await;
        assert!(matches!(result, Err(SettlementError::Rejected { .. })));
        assert!(authority.record_for(OrderId::new(1)).is_none());
    }

    #[tokio::test]
    async fn test_settle_without_reference_keeps_reference_on_record() {
        let authority = InMemoryPaymentAuthority::new();
        authority.set_behavior(SettleBehavior::SucceedWithoutReference);

        let response = authority.settle(request(1)).await.unwrap();
        assert_eq!(response.status, PaymentStatus::Success);
        assert!(response.transaction_ref.is_none());

        let record = authority.record_for(OrderId::new(1)).unwrap();
        assert_eq!(record.status, PaymentStatus::Success);
        assert!(record.transaction_ref.is_some());
    }

    #[tokio::test]
    async fn test_unknown_order_has_no_status() {
        let authority = InMemoryPaymentAuthority::new();
        assert_eq!(authority.status(OrderId::new(9)).await.unwrap(), None);
        assert!(authority.record(OrderId::new(9)).await.unwrap().is_none());
    }

    #[test]
    fn test_settle_response_wire_format() {
        let response = SettleResponse {
            status: PaymentStatus::Success,
            transaction_ref: Some("txn-1".to_string()),
            amount: Money::from_cents(4000),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["transactionRef"], "txn-1");
        assert_eq!(json["amount"], 4000);
    }
}
