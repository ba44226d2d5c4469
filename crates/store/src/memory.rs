use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use domain::{BuyerId, NewOrder, Order, OrderId, PaymentRecord, PaymentStatus};
use tokio::sync::RwLock;

use crate::{
    Result,
    ledger::{PaymentLedger, UpsertKind, UpsertOutcome, apply_upsert},
    orders::OrderStore,
};

/// In-memory order store and payment ledger.
///
/// Provides the same interface as the PostgreSQL implementation. Cloning
/// shares the underlying maps.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    orders: Arc<RwLock<BTreeMap<OrderId, Order>>>,
    last_order_id: Arc<AtomicI64>,
    payments: Arc<RwLock<HashMap<OrderId, PaymentRecord>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Returns the total number of payment records stored.
    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let id = OrderId::new(self.last_order_id.fetch_add(1, Ordering::SeqCst) + 1);
        let order = order.into_order(id, Utc::now());
        self.orders.write().await.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.orders.read().await.values().cloned().collect())
    }

    async fn list_orders_by_buyer(&self, buyer_id: BuyerId) -> Result<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.buyer_id == buyer_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentLedger for InMemoryStore {
    async fn find_payment(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        Ok(self.payments.read().await.get(&order_id).cloned())
    }

    async fn upsert_payment(&self, record: PaymentRecord) -> Result<UpsertOutcome> {
        // The write lock spans read and write, making the upsert a
        // compare-and-swap per order.
        let mut payments = self.payments.write().await;
        let order_id = record.order_id;
        let outcome = apply_upsert(payments.get(&order_id), record);

        if outcome.kind != UpsertKind::Unchanged {
            payments.insert(order_id, outcome.record.clone());
        }

        metrics::counter!("ledger_upserts_total", "kind" => outcome.kind.as_str()).increment(1);
        tracing::debug!(
            %order_id,
            status = %outcome.record.status,
            kind = outcome.kind.as_str(),
            "payment record upserted"
        );
        Ok(outcome)
    }

    async fn find_payments_by_status(&self, status: PaymentStatus) -> Result<Vec<PaymentRecord>> {
        let mut records: Vec<_> = self
            .payments
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.order_id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Money;

    fn new_order(buyer: i64) -> NewOrder {
        NewOrder::new(buyer, 10, 2, Money::from_cents(4000))
    }

    #[tokio::test]
    async fn test_order_ids_are_sequential() {
        let store = InMemoryStore::new();
        let first = store.create_order(new_order(1)).await.unwrap();
        let second = store.create_order(new_order(1)).await.unwrap();

        assert_eq!(first.id, OrderId::new(1));
        assert_eq!(second.id, OrderId::new(2));
        assert_eq!(store.order_count().await, 2);
    }

    #[tokio::test]
    async fn test_list_orders_by_buyer() {
        let store = InMemoryStore::new();
        store.create_order(new_order(1)).await.unwrap();
        store.create_order(new_order(2)).await.unwrap();
        store.create_order(new_order(1)).await.unwrap();

        let orders = store.list_orders_by_buyer(BuyerId::new(1)).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.buyer_id == BuyerId::new(1)));
        assert_eq!(store.list_orders().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_order_is_none() {
        let store = InMemoryStore::new();
        assert!(store.get_order(OrderId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_at_most_one_record_per_order() {
        let store = InMemoryStore::new();
        let order = store.create_order(new_order(1)).await.unwrap();

        store
            .upsert_payment(PaymentRecord::pending(&order))
            .await
            .unwrap();
        store
            .upsert_payment(PaymentRecord::pending(&order))
            .await
            .unwrap();
        store
            .upsert_payment(PaymentRecord::success(&order, "txn-1"))
            .await
            .unwrap();
        store
            .upsert_payment(PaymentRecord::success(&order, "txn-2"))
            .await
            .unwrap();

        assert_eq!(store.payment_count().await, 1);
        let record = store.find_payment(order.id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Success);
        assert_eq!(record.transaction_ref.as_deref(), Some("txn-1"));
    }

    #[tokio::test]
    async fn test_pending_never_overwrites_success() {
        let store = InMemoryStore::new();
        let order = store.create_order(new_order(1)).await.unwrap();

        store
            .upsert_payment(PaymentRecord::success(&order, "txn-1"))
            .await
            .unwrap();
        let outcome = store
            .upsert_payment(PaymentRecord::pending(&order))
            .await
            .unwrap();

        assert_eq!(outcome.kind, UpsertKind::Unchanged);
        let record = store.find_payment(order.id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn test_concurrent_success_upserts_have_one_winner() {
        let store = InMemoryStore::new();
        let order = store.create_order(new_order(1)).await.unwrap();
        store
            .upsert_payment(PaymentRecord::pending(&order))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_payment(PaymentRecord::success(&order, format!("txn-{i}")))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().transitioned_to_success() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_find_by_status() {
        let store = InMemoryStore::new();
        let a = store.create_order(new_order(1)).await.unwrap();
        let b = store.create_order(new_order(1)).await.unwrap();

        store.upsert_payment(PaymentRecord::pending(&a)).await.unwrap();
        store
            .upsert_payment(PaymentRecord::success(&b, "txn-b"))
            .await
            .unwrap();

        let pending = store
            .find_payments_by_status(PaymentStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_id, a.id);
    }
}
