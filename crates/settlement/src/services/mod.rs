//! Remote authority traits with in-memory and HTTP implementations.

pub mod http;
pub mod inventory;
pub mod payment;

pub use http::{HttpInventoryAuthority, HttpPaymentAuthority, StatusResponse};
pub use inventory::{InMemoryInventoryAuthority, InventoryAuthority, StockAdjustment};
pub use payment::{
    InMemoryPaymentAuthority, PaymentAuthority, RemotePaymentRecord, SettleBehavior,
    SettleRequest, SettleResponse,
};
