//! Periodic reconciliation of pending payments.

use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::{OrderId, PaymentRecord, PaymentStatus};
use store::Store;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{Result, SettlementError};
use crate::gateway::PaymentGatewayClient;
use crate::resolver::PAYMENT_SERVICE;
use crate::services::inventory::InventoryAuthority;
use crate::services::payment::PaymentAuthority;

/// Shortest period the sweeper accepts.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending records found at the start of the pass.
    pub examined: usize,
    /// Records the authority had already settled.
    pub reconciled: usize,
    /// Records settled by a fresh settle attempt.
    pub settled: usize,
    /// Records still pending after the pass.
    pub still_pending: usize,
    /// Records whose processing failed with an error.
    pub failed: usize,
}

enum RecordOutcome {
    Reconciled,
    Settled,
    StillPending,
}

/// Re-examines every PENDING payment on a fixed period.
///
/// Each pass lists the pending records afresh, so nothing is tracked
/// between passes.
pub struct PendingSweeper<S, P, I>
where
    S: Store,
    P: PaymentAuthority,
    I: InventoryAuthority,
{
    store: S,
    gateway: Arc<PaymentGatewayClient<S, P, I>>,
    interval: Duration,
}

impl<S, P, I> PendingSweeper<S, P, I>
where
    S: Store,
    P: PaymentAuthority,
    I: InventoryAuthority,
{
    /// Creates a sweeper. Periods below [`MIN_SWEEP_INTERVAL`] are raised to it.
    pub fn new(store: S, gateway: Arc<PaymentGatewayClient<S, P, I>>, interval: Duration) -> Self {
        if interval < MIN_SWEEP_INTERVAL {
            tracing::warn!(
                requested = ?interval,
                using = ?MIN_SWEEP_INTERVAL,
                "sweep interval too short, clamping"
            );
        }
        Self {
            store,
            gateway,
            interval: interval.max(MIN_SWEEP_INTERVAL),
        }
    }

    /// Period between two passes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one pass over all pending records.
    ///
    /// Failures are counted per record and never stop the pass. Only a
    /// failure to list the pending records is returned as an error.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let start = Instant::now();
        metrics::counter!("sweep_runs_total").increment(1);

        let pending = self
            .store
            .find_payments_by_status(PaymentStatus::Pending)
            .await?;
        let mut report = SweepReport {
            examined: pending.len(),
            ..SweepReport::default()
        };

        for record in &pending {
            match self.process(record).await {
                Ok(RecordOutcome::Reconciled) => report.reconciled += 1,
                Ok(RecordOutcome::Settled) => report.settled += 1,
                Ok(RecordOutcome::StillPending) => report.still_pending += 1,
                Err(e) => {
                    tracing::warn!(order_id = %record.order_id, error = %e, "sweep failed for order");
                    report.failed += 1;
                }
            }
        }

        metrics::counter!("sweep_reconciled_total")
            .increment((report.reconciled + report.settled) as u64);
        metrics::histogram!("sweep_duration_seconds").record(start.elapsed().as_secs_f64());
        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                reconciled = report.reconciled,
                settled = report.settled,
                still_pending = report.still_pending,
                failed = report.failed,
                "pending sweep finished"
            );
        }

        Ok(report)
    }

    async fn process(&self, record: &PaymentRecord) -> Result<RecordOutcome> {
        let order = self
            .store
            .get_order(record.order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(record.order_id))?;

        let remote_status = match self.gateway.query_status(order.id).await {
            Ok(status) => status,
            Err(e) if e.is_degradable() => {
                tracing::debug!(order_id = %order.id, error = %e, "status unavailable, retrying settle");
                PaymentStatus::Pending
            }
            Err(e) => return Err(e),
        };

        if remote_status.is_success() {
            return Ok(match self.gateway.confirm_success(&order, None).await? {
                PaymentStatus::Success => RecordOutcome::Reconciled,
                PaymentStatus::Pending => RecordOutcome::StillPending,
            });
        }

        let outcome = self.gateway.settle(&order).await?;
        if outcome.fallback {
            return Err(SettlementError::remote(
                PAYMENT_SERVICE,
                format!("settle attempt for order {} fell back", order.id),
            ));
        }
        Ok(match outcome.status {
            PaymentStatus::Success => RecordOutcome::Settled,
            PaymentStatus::Pending => RecordOutcome::StillPending,
        })
    }

    /// Sweeps every `interval` until `shutdown` turns true.
    ///
    /// The first pass runs one interval after start. Ticks missed while a
    /// pass was running are delayed, so passes never overlap.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.interval, "pending sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "pending sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("pending sweeper stopped");
    }

    /// Runs the sweeper on its own task.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()>
    where
        P: 'static,
        I: 'static,
    {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Returns the orders currently awaiting settlement.
    pub async fn pending_orders(&self) -> Result<Vec<OrderId>> {
        let pending = self
            .store
            .find_payments_by_status(PaymentStatus::Pending)
            .await?;
        Ok(pending.into_iter().map(|r| r.order_id).collect())
    }
}
