use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, FromRow, Postgres, Transaction};

use super::errors::{StoreError, TxStage};
use super::repository::{OrderStore, OrderTx};
use crate::config::DatabaseConfig;
use crate::models::Order;

// ============================================================================
// PostgreSQL Order Store
// ============================================================================
//
// One `orders` table keyed by `order_uid`. Scalar fields are columns;
// `delivery`, `payment` and `items` are stored verbatim as JSONB documents.
//
// The query functions at the bottom of this file are generic over the sqlx
// executor, so the pool-bound store and the transaction-bound `PgOrderTx`
// run exactly the same SQL.
//
// ============================================================================

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS orders (
        order_uid           TEXT PRIMARY KEY,
        track_number        TEXT NOT NULL,
        entry               TEXT NOT NULL,
        delivery            JSONB NOT NULL,
        payment             JSONB NOT NULL,
        items               JSONB NOT NULL,
        locale              TEXT NOT NULL,
        internal_signature  TEXT NOT NULL,
        customer_id         TEXT NOT NULL,
        delivery_service    TEXT NOT NULL,
        shardkey            TEXT NOT NULL,
        sm_id               INTEGER NOT NULL,
        date_created        TIMESTAMPTZ NOT NULL,
        oof_shard           TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_orders_date_created ON orders (date_created DESC)",
    "CREATE INDEX IF NOT EXISTS idx_orders_customer_id ON orders (customer_id)",
];

const UPSERT_ORDER: &str = "
    INSERT INTO orders (
        order_uid, track_number, entry, delivery, payment, items,
        locale, internal_signature, customer_id, delivery_service,
        shardkey, sm_id, date_created, oof_shard
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    ON CONFLICT (order_uid) DO UPDATE SET
        track_number = EXCLUDED.track_number,
        entry = EXCLUDED.entry,
        delivery = EXCLUDED.delivery,
        payment = EXCLUDED.payment,
        items = EXCLUDED.items,
        locale = EXCLUDED.locale,
        internal_signature = EXCLUDED.internal_signature,
        customer_id = EXCLUDED.customer_id,
        delivery_service = EXCLUDED.delivery_service,
        shardkey = EXCLUDED.shardkey,
        sm_id = EXCLUDED.sm_id,
        date_created = EXCLUDED.date_created,
        oof_shard = EXCLUDED.oof_shard";

const SELECT_ORDER: &str = "
    SELECT order_uid, track_number, entry, delivery, payment, items,
           locale, internal_signature, customer_id, delivery_service,
           shardkey, sm_id, date_created, oof_shard
    FROM orders
    WHERE order_uid = $1";

const SELECT_ALL_ORDERS: &str = "
    SELECT order_uid, track_number, entry, delivery, payment, items,
           locale, internal_signature, customer_id, delivery_service,
           shardkey, sm_id, date_created, oof_shard
    FROM orders
    ORDER BY date_created DESC";

const DELETE_ORDER: &str = "DELETE FROM orders WHERE order_uid = $1";

/// Column-level shape of an order row.
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    delivery: serde_json::Value,
    payment: serde_json::Value,
    items: serde_json::Value,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
}

impl TryFrom<&Order> for OrderRow {
    type Error = StoreError;

    fn try_from(order: &Order) -> Result<Self, Self::Error> {
        Ok(Self {
            order_uid: order.order_uid.clone(),
            track_number: order.track_number.clone(),
            entry: order.entry.clone(),
            delivery: serde_json::to_value(&order.delivery)?,
            payment: serde_json::to_value(&order.payment)?,
            items: serde_json::to_value(&order.items)?,
            locale: order.locale.clone(),
            internal_signature: order.internal_signature.clone(),
            customer_id: order.customer_id.clone(),
            delivery_service: order.delivery_service.clone(),
            shardkey: order.shardkey.clone(),
            sm_id: order.sm_id,
            date_created: order.date_created,
            oof_shard: order.oof_shard.clone(),
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            order_uid: row.order_uid,
            track_number: row.track_number,
            entry: row.entry,
            delivery: serde_json::from_value(row.delivery)?,
            payment: serde_json::from_value(row.payment)?,
            items: serde_json::from_value(row.items)?,
            locale: row.locale,
            internal_signature: row.internal_signature,
            customer_id: row.customer_id,
            delivery_service: row.delivery_service,
            shardkey: row.shardkey,
            sm_id: row.sm_id,
            date_created: row.date_created,
            oof_shard: row.oof_shard,
        })
    }
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Build the pool, verify the connection and create the schema.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        let store = Self { pool };
        store.ping().await?;
        store.create_schema().await?;

        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "✅ Connected to PostgreSQL"
        );
        Ok(store)
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Orders table created or already exists");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn get(&self, order_uid: &str) -> Result<Order, StoreError> {
        fetch_order(&self.pool, order_uid).await
    }

    async fn upsert(&self, order: &Order) -> Result<(), StoreError> {
        upsert_order(&self.pool, order).await
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(SELECT_ALL_ORDERS)
            .fetch_all(&self.pool)
            .await?;

        let orders = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = orders.len(), "Loaded order snapshot");
        Ok(orders)
    }

    async fn delete(&self, order_uid: &str) -> Result<(), StoreError> {
        delete_order(&self.pool, order_uid).await
    }

    async fn begin(&self) -> Result<Box<dyn OrderTx>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::transaction(TxStage::Begin))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED, READ WRITE")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::transaction(TxStage::Begin))?;

        Ok(Box::new(PgOrderTx { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct PgOrderTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTx for PgOrderTx {
    async fn get(&mut self, order_uid: &str) -> Result<Order, StoreError> {
        fetch_order(&mut *self.tx, order_uid).await
    }

    async fn upsert(&mut self, order: &Order) -> Result<(), StoreError> {
        upsert_order(&mut *self.tx, order).await
    }

    async fn delete(&mut self, order_uid: &str) -> Result<(), StoreError> {
        delete_order(&mut *self.tx, order_uid).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgOrderTx { tx } = *self;
        tx.commit()
            .await
            .map_err(StoreError::transaction(TxStage::Commit))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgOrderTx { tx } = *self;
        tx.rollback()
            .await
            .map_err(StoreError::transaction(TxStage::Rollback))
    }
}

// ============================================================================
// Executor-generic queries
// ============================================================================

async fn fetch_order<'e, E>(executor: E, order_uid: &str) -> Result<Order, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<OrderRow> = sqlx::query_as(SELECT_ORDER)
        .bind(order_uid)
        .fetch_optional(executor)
        .await?;

    match row {
        Some(row) => Order::try_from(row),
        None => Err(StoreError::NotFound(order_uid.to_string())),
    }
}

async fn upsert_order<'e, E>(executor: E, order: &Order) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    order.validate()?;
    let row = OrderRow::try_from(order)?;

    sqlx::query(UPSERT_ORDER)
        .bind(row.order_uid)
        .bind(row.track_number)
        .bind(row.entry)
        .bind(row.delivery)
        .bind(row.payment)
        .bind(row.items)
        .bind(row.locale)
        .bind(row.internal_signature)
        .bind(row.customer_id)
        .bind(row.delivery_service)
        .bind(row.shardkey)
        .bind(row.sm_id)
        .bind(row.date_created)
        .bind(row.oof_shard)
        .execute(executor)
        .await?;

    tracing::debug!(order_uid = %order.order_uid, "Order saved");
    Ok(())
}

async fn delete_order<'e, E>(executor: E, order_uid: &str) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(DELETE_ORDER)
        .bind(order_uid)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(order_uid.to_string()));
    }

    tracing::debug!(order_uid = %order_uid, "Order deleted");
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
//
// Queries against a live database are exercised in deployment; these tests
// cover the row mapping that decides what a read gives back.
//
// ============================================================================
