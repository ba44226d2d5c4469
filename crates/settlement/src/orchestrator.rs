//! Order placement and settlement orchestration.

use std::sync::Arc;
use std::time::Instant;

use domain::{BuyerId, NewOrder, Order, OrderId, PaymentRecord, PaymentStatus};
use serde::Serialize;
use store::Store;

use crate::config::SettlementConfig;
use crate::error::{Result, SettlementError};
use crate::gateway::PaymentGatewayClient;
use crate::services::inventory::InventoryAuthority;
use crate::services::payment::{PaymentAuthority, RemotePaymentRecord};

/// An order together with the settlement status reached for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub order: Order,
    pub settlement_status: PaymentStatus,
}

/// An order with the authority's view of its payment and the local ledger
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSettlementView {
    pub order: Order,
    /// `None` when the authority has no record or could not be reached.
    pub payment: Option<RemotePaymentRecord>,
    pub ledger: Option<PaymentRecord>,
}

/// Places orders and drives them towards settlement.
///
/// Placement never fails because of the payment authority: once the order
/// is stored, any remote problem degrades to a PENDING result that the
/// sweeper reconciles later.
pub struct SettlementOrchestrator<S, P, I>
where
    S: Store,
    P: PaymentAuthority,
    I: InventoryAuthority,
{
    store: S,
    gateway: Arc<PaymentGatewayClient<S, P, I>>,
    config: SettlementConfig,
}

impl<S, P, I> SettlementOrchestrator<S, P, I>
where
    S: Store,
    P: PaymentAuthority,
    I: InventoryAuthority,
{
    /// Creates an orchestrator sharing `gateway` with other components.
    pub fn new(store: S, gateway: Arc<PaymentGatewayClient<S, P, I>>, config: SettlementConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Returns the shared gateway.
    pub fn gateway(&self) -> &Arc<PaymentGatewayClient<S, P, I>> {
        &self.gateway
    }

    /// Stores a new order and attempts to settle it.
    ///
    /// After the settle attempt the authority is polled up to
    /// `poll_attempts` times until it reports SUCCESS.
    #[tracing::instrument(skip(self, new_order), fields(buyer_id = %new_order.buyer_id))]
    pub async fn place(&self, new_order: NewOrder) -> Result<Placement> {
        new_order.validate()?;

        let start = Instant::now();
        let order = self.store.create_order(new_order).await?;
        tracing::info!(order_id = %order.id, amount = %order.total_price, "order placed");

        let transaction_ref = match self.gateway.settle(&order).await {
            Ok(outcome) => outcome.transaction_ref,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "settle attempt failed");
                None
            }
        };

        if !self.config.initial_delay.is_zero() {
            tokio::time::sleep(self.config.initial_delay).await;
        }

        let settlement_status = if self.await_confirmation(order.id).await {
            match self.gateway.confirm_success(&order, transaction_ref).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "finalizing payment failed");
                    self.record_pending(&order).await
                }
            }
        } else {
            self.record_pending(&order).await
        };

        metrics::counter!("settlement_place_total", "status" => settlement_status.as_str())
            .increment(1);
        metrics::histogram!("settlement_place_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        tracing::info!(order_id = %order.id, status = %settlement_status, "placement finished");

        Ok(Placement {
            order,
            settlement_status,
        })
    }

    /// Makes one more settle attempt for an order whose payment is PENDING.
    #[tracing::instrument(skip(self))]
    pub async fn retry(&self, order_id: OrderId) -> Result<Placement> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))?;

        match self.store.find_payment(order_id).await? {
            Some(record) if record.is_pending() => {}
            _ => return Err(SettlementError::NoPendingPayment(order_id)),
        }

        let outcome = self.gateway.settle(&order).await?;
        tracing::info!(status = %outcome.status, fallback = outcome.fallback, "payment retried");

        Ok(Placement {
            order,
            settlement_status: outcome.status,
        })
    }

    /// Returns an order with the authority's current payment record.
    pub async fn order_with_settlement(&self, order_id: OrderId) -> Result<OrderSettlementView> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))?;

        let payment = match self.gateway.fetch_remote_record(order_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "payment details unavailable");
                None
            }
        };
        let ledger = self.store.find_payment(order_id).await?;

        Ok(OrderSettlementView {
            order,
            payment,
            ledger,
        })
    }

    /// Lists every order.
    pub async fn list_all(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_orders().await?)
    }

    /// Lists the orders of one buyer.
    pub async fn list_by_buyer(&self, buyer_id: BuyerId) -> Result<Vec<Order>> {
        Ok(self.store.list_orders_by_buyer(buyer_id).await?)
    }

    /// Polls the authority until it reports SUCCESS or attempts run out.
    async fn await_confirmation(&self, order_id: OrderId) -> bool {
        let attempts = self.config.poll_attempts;
        for attempt in 1..=attempts {
            match self.gateway.query_status(order_id).await {
                Ok(PaymentStatus::Success) => return true,
                Ok(PaymentStatus::Pending) => {
                    tracing::debug!(%order_id, attempt, "payment still pending");
                }
                Err(e) => {
                    tracing::debug!(%order_id, attempt, error = %e, "status query failed");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.poll_delay).await;
            }
        }
        false
    }

    async fn record_pending(&self, order: &Order) -> PaymentStatus {
        match self.gateway.ensure_pending(order).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "could not record pending payment");
                PaymentStatus::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InMemoryInventoryAuthority, InMemoryPaymentAuthority, SettleBehavior};
    use domain::{Money, ProductId, ValidationError};
    use std::time::Duration;
    use store::{InMemoryStore, PaymentLedger};

    type TestOrchestrator =
        SettlementOrchestrator<InMemoryStore, InMemoryPaymentAuthority, InMemoryInventoryAuthority>;

    struct Fixture {
        store: InMemoryStore,
        payments: InMemoryPaymentAuthority,
        inventory: InMemoryInventoryAuthority,
        orchestrator: TestOrchestrator,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let payments = InMemoryPaymentAuthority::new();
        let inventory = InMemoryInventoryAuthority::new();
        let config = SettlementConfig::default();
        let gateway = Arc::new(PaymentGatewayClient::new(
            store.clone(),
            payments.clone(),
            inventory.clone(),
            &config,
        ));
        let orchestrator = SettlementOrchestrator::new(store.clone(), gateway, config);
        Fixture {
            store,
            payments,
            inventory,
            orchestrator,
        }
    }

    fn new_order() -> NewOrder {
        NewOrder::new(1, 10, 2, Money::from_cents(4000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_settles_immediately() {
        let f = fixture();

        let placement = f.orchestrator.place(new_order()).await.unwrap();
        assert_eq!(placement.settlement_status, PaymentStatus::Success);
        assert_eq!(placement.order.product_id, ProductId::new(10));
        assert_eq!(f.inventory.adjustment_count(), 1);
        // One poll confirms the settlement.
        assert_eq!(f.payments.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_polls_until_attempts_run_out() {
        let f = fixture();
        f.payments.set_behavior(SettleBehavior::Defer);

        let placement = f.orchestrator.place(new_order()).await.unwrap();
        assert_eq!(placement.settlement_status, PaymentStatus::Pending);
        assert_eq!(f.payments.status_calls(), 5);
        assert_eq!(f.inventory.adjustment_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_rejects_invalid_order() {
        let f = fixture();
        let invalid = NewOrder::new(1, 10, 0, Money::from_cents(100));

        let err = f.orchestrator.place(invalid).await.unwrap_err();
        assert!(matches!(
            err,
            SettlementError::Validation(ValidationError::InvalidQuantity { .. })
        ));
        assert_eq!(f.store.order_count().await, 0);
        assert_eq!(f.payments.settle_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_survives_unreachable_authority() {
        let f = fixture();
        f.payments.set_behavior(SettleBehavior::Fail);
        f.payments.set_reads_unavailable(true);

        let placement = f.orchestrator.place(new_order()).await.unwrap();
        assert_eq!(placement.settlement_status, PaymentStatus::Pending);
        let record = f.store.find_payment(placement.order.id).await.unwrap();
        assert!(record.unwrap().is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_waits_at_most_the_poll_envelope() {
        let f = fixture();
        f.payments.set_behavior(SettleBehavior::Defer);

        let start = tokio::time::Instant::now();
        f.orchestrator.place(new_order()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(3200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_requires_pending_record() {
        let f = fixture();
        let placement = f.orchestrator.place(new_order()).await.unwrap();

        let err = f.orchestrator.retry(placement.order.id).await.unwrap_err();
        assert!(matches!(err, SettlementError::NoPendingPayment(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_unknown_order() {
        let f = fixture();
        let err = f.orchestrator.retry(OrderId::new(42)).await.unwrap_err();
        assert!(matches!(err, SettlementError::OrderNotFound(_)));
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_settles_pending_order() {
        let f = fixture();
        f.payments.set_behavior(SettleBehavior::Fail);
        let placement = f.orchestrator.place(new_order()).await.unwrap();
        assert_eq!(placement.settlement_status, PaymentStatus::Pending);

        f.payments.set_behavior(SettleBehavior::Succeed);
        let retried = f.orchestrator.retry(placement.order.id).await.unwrap();
        assert_eq!(retried.settlement_status, PaymentStatus::Success);
        assert_eq!(f.inventory.adjustment_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_with_settlement_degrades_without_authority() {
        let f = fixture();
        let placement = f.orchestrator.place(new_order()).await.unwrap();

        let view = f
            .orchestrator
            .order_with_settlement(placement.order.id)
            .await
            .unwrap();
        assert_eq!(view.payment.unwrap().status, PaymentStatus::Success);
        assert!(view.ledger.is_some());

        f.payments.set_reads_unavailable(true);
        let view = f
            .orchestrator
            .order_with_settlement(placement.order.id)
            .await
            .unwrap();
        assert!(view.payment.is_none());
        assert_eq!(view.order, placement.order);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listings() {
        let f = fixture();
        f.orchestrator.place(new_order()).await.unwrap();
        f.orchestrator
            .place(NewOrder::new(2, 11, 1, Money::from_cents(999)))
            .await
            .unwrap();

        assert_eq!(f.orchestrator.list_all().await.unwrap().len(), 2);
        let mine = f.orchestrator.list_by_buyer(BuyerId::new(2)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].product_id, ProductId::new(11));
    }
}
