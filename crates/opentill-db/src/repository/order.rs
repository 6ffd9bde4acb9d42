//! # Order Repository
//!
//! Settlement records: the order header plus its frozen line items,
//! written in one transaction.
//!
//! ## Atomicity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record() wraps header + items in a single transaction.                 │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    INSERT INTO orders (...)                                             │
//! │    INSERT INTO order_items (...)   × N                                  │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Either the whole sale exists or none of it does; a headerless          │
//! │  item row or an itemless header can never be observed.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use opentill_core::{ContextKey, Order, OrderLine};

/// Repository for finalized order rows.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Records an order and its line items atomically.
    pub async fn record(&self, order: &Order, lines: &[OrderLine]) -> DbResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO orders
                (id, context_key, status, subtotal_cents, discount_cents,
                 tip_cents, total_cents, payment_method, created_at, voided_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&order.id)
        .bind(order.context_key.to_string())
        .bind(order.status)
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(order.tip_cents)
        .bind(order.total_cents)
        .bind(order.payment_method)
        .bind(order.created_at)
        .bind(order.voided_at)
        .execute(&mut *tx)
        .await?;

        for (position, line) in lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (order_id, position, variant_id, name, unit_price_cents, quantity)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&order.id)
            .bind(position as i64)
            .bind(&line.variant_id)
            .bind(&line.name)
            .bind(line.unit_price_cents)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(order_id = %order.id, total_cents = order.total_cents, "Order recorded");
        Ok(())
    }

    /// Gets an order header by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, context_key, status, subtotal_cents, discount_cents,
                   tip_cents, total_cents, payment_method, created_at, voided_at
            FROM orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| order_from_row(&r)).transpose()
    }

    /// Gets the line items of an order, in recorded order.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderLine>> {
        let rows = sqlx::query(
            r#"
            SELECT variant_id, name, unit_price_cents, quantity
            FROM order_items
            WHERE order_id = ?1
            ORDER BY position
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(OrderLine {
                    variant_id: r.try_get("variant_id")?,
                    name: r.try_get("name")?,
                    unit_price_cents: r.try_get("unit_price_cents")?,
                    quantity: r.try_get("quantity")?,
                })
            })
            .collect()
    }

    /// Conditionally transitions a Completed order to Voided.
    /// Returns false when the order was not Completed (or doesn't exist).
    pub async fn void(&self, id: &str, voided_at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'voided', voided_at = ?2
            WHERE id = ?1 AND status = 'completed'
            "#,
        )
        .bind(id)
        .bind(voided_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Sum of totals across Completed orders. Voided orders are excluded.
    pub async fn completed_revenue_cents(&self) -> DbResult<i64> {
        let revenue: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_cents), 0) FROM orders WHERE status = 'completed'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(revenue)
    }
}

fn order_from_row(row: &SqliteRow) -> DbResult<Order> {
    let id: String = row.try_get("id")?;

    let context_raw: String = row.try_get("context_key")?;
    let context_key: ContextKey = context_raw
        .parse()
        .map_err(|e: String| DbError::corrupt_row("Order", &id, e))?;

    Ok(Order {
        id,
        context_key,
        status: row.try_get("status")?,
        subtotal_cents: row.try_get("subtotal_cents")?,
        discount_cents: row.try_get("discount_cents")?,
        tip_cents: row.try_get("tip_cents")?,
        total_cents: row.try_get("total_cents")?,
        payment_method: row.try_get("payment_method")?,
        created_at: row.try_get("created_at")?,
        voided_at: row.try_get("voided_at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
