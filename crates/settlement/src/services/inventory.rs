//! Inventory authority trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use domain::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SettlementError};
use crate::resolver::INVENTORY_SERVICE;

/// A stock decrement for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Operations offered by the remote inventory authority.
///
/// `adjust_stock` is not idempotent: every successful call removes stock.
#[async_trait]
pub trait InventoryAuthority: Send + Sync {
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    adjustments: Vec<StockAdjustment>,
    stock: HashMap<ProductId, u32>,
    calls: u32,
    fail_on_adjust: bool,
}

/// In-memory inventory authority for tests and local runs.
///
/// Products without a configured stock level accept any adjustment.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryAuthority {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryAuthority {
    /// Creates a new in-memory inventory authority.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on subsequent adjust calls.
    pub fn set_fail_on_adjust(&self, fail: bool) {
        self.write().fail_on_adjust = fail;
    }

    /// Sets the tracked stock level of a product.
    pub fn set_stock(&self, product_id: ProductId, quantity: u32) {
        self.write().stock.insert(product_id, quantity);
    }

    /// Returns the tracked stock level of a product.
    pub fn stock_of(&self, product_id: ProductId) -> Option<u32> {
        self.read().stock.get(&product_id).copied()
    }

    /// Returns the number of applied adjustments.
    pub fn adjustment_count(&self) -> usize {
        self.read().adjustments.len()
    }

    /// Returns the applied adjustments in order.
    pub fn adjustments(&self) -> Vec<StockAdjustment> {
        self.read().adjustments.clone()
    }

    /// Returns the number of adjust calls received, including failed ones.
    pub fn call_count(&self) -> u32 {
        self.read().calls
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryInventoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryInventoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InventoryAuthority for InMemoryInventoryAuthority {
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<()> {
        let mut state = self.write();
        state.calls += 1;

        if state.fail_on_adjust {
            return Err(SettlementError::remote(INVENTORY_SERVICE, "service unavailable"));
        }

        if let Some(available) = state.stock.get_mut(&adjustment.product_id) {
            if *available < adjustment.quantity {
                return Err(SettlementError::rejected(
                    INVENTORY_SERVICE,
                    format!("insufficient stock for product {}", adjustment.product_id),
                ));
            }
            *available -= adjustment.quantity;
        }

        state.adjustments.push(adjustment);
        Ok(())
    }
}
