use async_trait::async_trait;
use domain::{OrderId, PaymentRecord, PaymentStatus};

use crate::Result;

/// How an upsert changed the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    /// No record existed for the order; the incoming record was stored.
    Inserted,
    /// A pending record was overwritten in place (its id is kept).
    Updated,
    /// The stored record is already `SUCCESS` and was left untouched.
    Unchanged,
}

impl UpsertKind {
    /// Returns the kind name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertKind::Inserted => "inserted",
            UpsertKind::Updated => "updated",
            UpsertKind::Unchanged => "unchanged",
        }
    }
}

/// Result of a ledger upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// The record as stored after the upsert.
    pub record: PaymentRecord,
    pub kind: UpsertKind,
    /// Status of the stored record before the upsert, if one existed.
    pub previous_status: Option<PaymentStatus>,
}

impl UpsertOutcome {
    /// True only for the single upsert that moved the order to `SUCCESS`.
    ///
    /// This is the compare-and-swap winner; it alone may trigger
    /// non-idempotent follow-up work such as the stock decrement.
    pub fn transitioned_to_success(&self) -> bool {
        self.kind != UpsertKind::Unchanged
            && self.record.status.is_success()
            && self.previous_status != Some(PaymentStatus::Success)
    }

    /// Status of the stored record after the upsert.
    pub fn status(&self) -> PaymentStatus {
        self.record.status
    }
}

/// Applies the ledger's upsert rule to an existing record.
///
/// - absent: insert the incoming record
/// - `PENDING`: overwrite status, amount, reference and timestamp, keep the id
/// - `SUCCESS`: sticky, nothing changes
pub fn apply_upsert(existing: Option<&PaymentRecord>, incoming: PaymentRecord) -> UpsertOutcome {
    match existing {
        None => UpsertOutcome {
            record: incoming,
            kind: UpsertKind::Inserted,
            previous_status: None,
        },
        Some(current) if current.status.is_success() => UpsertOutcome {
            record: current.clone(),
            kind: UpsertKind::Unchanged,
            previous_status: Some(PaymentStatus::Success),
        },
        Some(current) => UpsertOutcome {
            record: PaymentRecord {
                id: current.id,
                ..incoming
            },
            kind: UpsertKind::Updated,
            previous_status: Some(current.status),
        },
    }
}

/// Idempotent store of payment records, keyed by order.
///
/// `upsert` is the only mutation entry point. Implementations must apply
/// [`apply_upsert`] atomically per order so concurrent writers cannot both
/// observe a non-`SUCCESS` record and both win the transition.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Fetches the record for an order, if any.
    async fn find_payment(&self, order_id: OrderId) -> Result<Option<PaymentRecord>>;

    /// Inserts or updates the record keyed by `record.order_id`.
    async fn upsert_payment(&self, record: PaymentRecord) -> Result<UpsertOutcome>;

    /// Lists every record with the given status.
    async fn find_payments_by_status(&self, status: PaymentStatus) -> Result<Vec<PaymentRecord>>;
}
