//! Order placement and payment settlement.
//!
//! An order is stored first and then settled against a remote payment
//! authority:
//! 1. Attempt settlement through the circuit-broken [`PaymentGatewayClient`]
//! 2. Poll the authority a bounded number of times for confirmation
//! 3. Record SUCCESS, or PENDING if settlement could not be confirmed
//!
//! Stock is adjusted at the inventory authority only by the ledger write
//! that moves an order to SUCCESS. The [`PendingSweeper`] periodically
//! reconciles PENDING records left behind by failures.

pub mod breaker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod resolver;
pub mod services;
pub mod sweeper;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::SettlementConfig;
pub use error::{Result, SettlementError};
pub use gateway::{PaymentGatewayClient, SettleOutcome};
pub use orchestrator::{OrderSettlementView, Placement, SettlementOrchestrator};
pub use resolver::{EndpointResolver, INVENTORY_SERVICE, PAYMENT_SERVICE, StaticEndpointResolver};
pub use services::{
    HttpInventoryAuthority, HttpPaymentAuthority, InMemoryInventoryAuthority,
    InMemoryPaymentAuthority, InventoryAuthority, PaymentAuthority, RemotePaymentRecord,
    SettleBehavior, SettleRequest, SettleResponse, StockAdjustment,
};
pub use sweeper::{MIN_SWEEP_INTERVAL, PendingSweeper, SweepReport};
