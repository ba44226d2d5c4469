//! Persistence for orders and payment records.
//!
//! The [`PaymentLedger`] is the single mutation point for payment records:
//! every write is a keyed upsert, at most one record exists per order, and a
//! `SUCCESS` record is never overwritten.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod orders;
pub mod postgres;

pub use error::{Result, StoreError};
pub use ledger::{PaymentLedger, UpsertKind, UpsertOutcome, apply_upsert};
pub use memory::InMemoryStore;
pub use orders::OrderStore;
pub use postgres::PostgresStore;

/// A backend that stores both orders and payment records.
pub trait Store: OrderStore + PaymentLedger + Clone + 'static {}

impl<T> Store for T where T: OrderStore + PaymentLedger + Clone + 'static {}
