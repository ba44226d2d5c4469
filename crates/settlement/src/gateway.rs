//! Circuit-broken client for the payment authority.

use std::future::Future;
use std::time::Duration;

use domain::{Order, OrderId, PaymentRecord, PaymentStatus};
use store::Store;

use crate::breaker::CircuitBreaker;
use crate::config::SettlementConfig;
use crate::error::{Result, SettlementError};
use crate::resolver::{INVENTORY_SERVICE, PAYMENT_SERVICE};
use crate::services::inventory::{InventoryAuthority, StockAdjustment};
use crate::services::payment::{PaymentAuthority, RemotePaymentRecord, SettleRequest};

/// Result of one settle attempt as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleOutcome {
    /// Status stored in the ledger after the attempt.
    pub status: PaymentStatus,
    /// Transaction reference returned by the authority, if any.
    pub transaction_ref: Option<String>,
    /// True when the remote call failed or was short-circuited.
    pub fallback: bool,
}

/// Guards every call to the payment authority with a timeout and a
/// circuit breaker, and records outcomes in the payment ledger.
///
/// Settle calls and read calls (status and record) use separate breakers.
/// One client is shared by placement, retry and the sweeper so they all see
/// the same breaker state.
pub struct PaymentGatewayClient<S, P, I>
where
    S: Store,
    P: PaymentAuthority,
    I: InventoryAuthority,
{
    store: S,
    payments: P,
    inventory: I,
    settle_breaker: CircuitBreaker,
    status_breaker: CircuitBreaker,
    remote_timeout: Duration,
}

impl<S, P, I> PaymentGatewayClient<S, P, I>
where
    S: Store,
    P: PaymentAuthority,
    I: InventoryAuthority,
{
    /// Creates a gateway with closed breakers.
    pub fn new(store: S, payments: P, inventory: I, config: &SettlementConfig) -> Self {
        Self {
            store,
            payments,
            inventory,
            settle_breaker: CircuitBreaker::new("payment-settle", config.breaker.clone()),
            status_breaker: CircuitBreaker::new("payment-status", config.breaker.clone()),
            remote_timeout: config.remote_timeout,
        }
    }

    /// Breaker guarding settle calls.
    pub fn settle_breaker(&self) -> &CircuitBreaker {
        &self.settle_breaker
    }

    /// Breaker guarding status and record reads.
    pub fn status_breaker(&self) -> &CircuitBreaker {
        &self.status_breaker
    }

    /// Attempts to settle an order and records the outcome.
    ///
    /// A SUCCESS answer is finalized through [`confirm_success`](Self::confirm_success).
    /// Anything else leaves a PENDING record behind, refused requests and
    /// open breakers included. Only local store failures are returned as
    /// errors.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn settle(&self, order: &Order) -> Result<SettleOutcome> {
        let request = SettleRequest {
            order_id: order.id,
            amount: order.total_price,
        };

        let attempt = self
            .settle_breaker
            .call(|| self.bounded(PAYMENT_SERVICE, self.payments.settle(request)))
            .await;

        match attempt {
            Ok(response) if response.status.is_success() => {
                let status = self
                    .confirm_success(order, response.transaction_ref.clone())
                    .await?;
                Ok(SettleOutcome {
                    status,
                    transaction_ref: response.transaction_ref,
                    fallback: false,
                })
            }
            Ok(response) => {
                tracing::debug!("payment authority reports settlement pending");
                Ok(SettleOutcome {
                    status: self.ensure_pending(order).await?,
                    transaction_ref: response.transaction_ref,
                    fallback: false,
                })
            }
            Err(e) if e.is_degradable() => {
                tracing::warn!(error = %e, "settle failed, recording pending payment");
                metrics::counter!("settlement_fallback_total").increment(1);
                Ok(SettleOutcome {
                    status: self.ensure_pending(order).await?,
                    transaction_ref: None,
                    fallback: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Queries the authority's settlement status.
    ///
    /// An order the authority has never seen is reported as PENDING.
    pub async fn query_status(&self, order_id: OrderId) -> Result<PaymentStatus> {
        let status = self
            .status_breaker
            .call(|| self.bounded(PAYMENT_SERVICE, self.payments.status(order_id)))
            .await?;
        Ok(status.unwrap_or(PaymentStatus::Pending))
    }

    /// Fetches the authority's own record for an order.
    pub async fn fetch_remote_record(&self, order_id: OrderId) -> Result<Option<RemotePaymentRecord>> {
        self.status_breaker
            .call(|| self.bounded(PAYMENT_SERVICE, self.payments.record(order_id)))
            .await
    }

    /// Makes sure a payment record exists for the order.
    ///
    /// Returns the stored status, which stays SUCCESS if the order was
    /// already settled.
    pub async fn ensure_pending(&self, order: &Order) -> Result<PaymentStatus> {
        let outcome = self.store.upsert_payment(PaymentRecord::pending(order)).await?;
        Ok(outcome.status())
    }

    /// Finalizes an order the authority reports as settled.
    ///
    /// Uses `transaction_ref` when known and otherwise fetches it from the
    /// authority. If no reference can be obtained the order stays PENDING
    /// for a later sweep.
    #[tracing::instrument(skip(self, order, transaction_ref), fields(order_id = %order.id))]
    pub async fn confirm_success(
        &self,
        order: &Order,
        transaction_ref: Option<String>,
    ) -> Result<PaymentStatus> {
        let transaction_ref = match transaction_ref.filter(|r| !r.is_empty()) {
            Some(reference) => Some(reference),
            None => match self.fetch_remote_record(order.id).await {
                Ok(record) => record
                    .and_then(|r| r.transaction_ref)
                    .filter(|r| !r.is_empty()),
                Err(e) if e.is_degradable() => {
                    tracing::warn!(error = %e, "could not fetch transaction reference");
                    None
                }
                Err(e) => return Err(e),
            },
        };

        match transaction_ref {
            Some(reference) => self.finalize_success(order, reference).await,
            None => self.ensure_pending(order).await,
        }
    }

    /// Writes SUCCESS to the ledger and synchronizes inventory if this call
    /// won the transition.
    ///
    /// A failed inventory call is logged and not retried.
    async fn finalize_success(&self, order: &Order, transaction_ref: String) -> Result<PaymentStatus> {
        let outcome = self
            .store
            .upsert_payment(PaymentRecord::success(order, transaction_ref))
            .await?;

        if !outcome.transitioned_to_success() {
            tracing::debug!(kind = outcome.kind.as_str(), "payment already settled");
            return Ok(outcome.status());
        }

        tracing::info!(
            product_id = %order.product_id,
            quantity = order.quantity,
            "payment settled, adjusting stock"
        );
        let adjustment = StockAdjustment {
            product_id: order.product_id,
            quantity: order.quantity,
        };
        match self
            .bounded(INVENTORY_SERVICE, self.inventory.adjust_stock(adjustment))
            .await
        {
            Ok(()) => metrics::counter!("inventory_sync_total").increment(1),
            Err(e) => {
                tracing::error!(error = %e, "inventory sync failed");
                metrics::counter!("inventory_sync_failed_total").increment(1);
            }
        }

        Ok(outcome.status())
    }

    async fn bounded<T, F>(&self, service: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SettlementError::remote(
                service,
                format!("timed out after {:?}", self.remote_timeout),
            )),
        }
    }
}
