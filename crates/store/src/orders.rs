use async_trait::async_trait;
use domain::{BuyerId, NewOrder, Order, OrderId};

use crate::Result;

/// Keyed storage for orders.
///
/// Orders are immutable once created; the store assigns the identifier and
/// stamps the creation time.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order and returns it with its assigned id.
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    /// Fetches an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists every order, oldest first.
    async fn list_orders(&self) -> Result<Vec<Order>>;

    /// Lists the orders placed by one buyer, oldest first.
    async fn list_orders_by_buyer(&self, buyer_id: BuyerId) -> Result<Vec<Order>>;
}
