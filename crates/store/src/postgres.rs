use async_trait::async_trait;
use domain::{
    BuyerId, Money, NewOrder, Order, OrderId, PaymentRecord, PaymentStatus, ProductId,
};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Result, StoreError,
    ledger::{PaymentLedger, UpsertKind, UpsertOutcome},
    orders::OrderStore,
};

const PAYMENT_COLUMNS: &str =
    "id, order_id, amount_cents, status, transaction_ref, settled_at";

/// PostgreSQL-backed order store and payment ledger.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url` with a pool of `max_connections`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| StoreError::Corrupt(format!("negative order quantity {quantity}")))?;

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            buyer_id: BuyerId::new(row.try_get("buyer_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity,
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_payment(row: &PgRow) -> Result<PaymentRecord> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<PaymentStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(PaymentRecord {
            id: row.try_get("id")?,
            order_id: OrderId::new(row.try_get("order_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            status,
            transaction_ref: row.try_get("transaction_ref")?,
            settled_at: row.try_get("settled_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let quantity = i32::try_from(order.quantity)
            .map_err(|_| StoreError::Corrupt(format!("quantity {} overflows", order.quantity)))?;

        let row = sqlx::query(
            r#"
            INSERT INTO orders (buyer_id, product_id, quantity, total_price_cents, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, buyer_id, product_id, quantity, total_price_cents, created_at
            "#,
        )
        .bind(order.buyer_id.get())
        .bind(order.product_id.get())
        .bind(quantity)
        .bind(order.total_price.cents())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_order(row)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, buyer_id, product_id, quantity, total_price_cents, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, buyer_id, product_id, quantity, total_price_cents, created_at
            FROM orders
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn list_orders_by_buyer(&self, buyer_id: BuyerId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, buyer_id, product_id, quantity, total_price_cents, created_at
            FROM orders
            WHERE buyer_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(buyer_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl PaymentLedger for PostgresStore {
    async fn find_payment(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment_records WHERE order_id = $1"
        ))
        .bind(order_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_payment).transpose()
    }

    async fn upsert_payment(&self, record: PaymentRecord) -> Result<UpsertOutcome> {
        // The conflict branch only fires while the stored row is not yet
        // SUCCESS, so Postgres' row lock makes this a per-order
        // compare-and-swap. `xmax = 0` identifies a fresh insert.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payment_records ({PAYMENT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id) DO UPDATE
            SET amount_cents = EXCLUDED.amount_cents,
                status = EXCLUDED.status,
                transaction_ref = EXCLUDED.transaction_ref,
                settled_at = EXCLUDED.settled_at
            WHERE payment_records.status <> 'SUCCESS'
            RETURNING {PAYMENT_COLUMNS}, (xmax = 0) AS inserted
            "#
        ))
        .bind(record.id)
        .bind(record.order_id.get())
        .bind(record.amount.cents())
        .bind(record.status.as_str())
        .bind(&record.transaction_ref)
        .bind(record.settled_at)
        .fetch_optional(&self.pool)
        .await?;

        let outcome = match row {
            Some(row) => {
                let inserted: bool = row.try_get("inserted")?;
                UpsertOutcome {
                    record: Self::row_to_payment(&row)?,
                    kind: if inserted {
                        UpsertKind::Inserted
                    } else {
                        UpsertKind::Updated
                    },
                    // Only PENDING rows pass the conflict predicate.
                    previous_status: (!inserted).then_some(PaymentStatus::Pending),
                }
            }
            None => {
                let stored = self.find_payment(record.order_id).await?.ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "upsert for order {} skipped but no record exists",
                        record.order_id
                    ))
                })?;
                UpsertOutcome {
                    record: stored,
                    kind: UpsertKind::Unchanged,
                    previous_status: Some(PaymentStatus::Success),
                }
            }
        };

        metrics::counter!("ledger_upserts_total", "kind" => outcome.kind.as_str()).increment(1);
        tracing::debug!(
            order_id = %record.order_id,
            status = %outcome.record.status,
            kind = outcome.kind.as_str(),
            "payment record upserted"
        );
        Ok(outcome)
    }

    async fn find_payments_by_status(&self, status: PaymentStatus) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment_records WHERE status = $1 ORDER BY order_id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_payment).collect()
    }
}
