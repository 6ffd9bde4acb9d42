//! # Variant Repository
//!
//! Catalog rows plus the two atomic stock updates every reservation in
//! the system funnels through.
//!
//! ## The Conditional Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              Why a Conditional UPDATE, Not Read-Then-Write              │
//! │                                                                         │
//! │  Two tills race for the last croissant (stock_quantity = 1):           │
//! │                                                                         │
//! │  Till A: UPDATE ... SET qty = qty - 1 WHERE id=? AND qty >= 1          │
//! │  Till B: UPDATE ... SET qty = qty - 1 WHERE id=? AND qty >= 1          │
//! │                                                                         │
//! │  SQLite serializes the writes. Exactly one UPDATE matches a row;       │
//! │  the other matches zero rows and reports Insufficient. No window        │
//! │  exists where both see "1 available" and both decrement.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use opentill_core::Variant;

/// What an atomic reservation attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Stock was decremented; this many units remain.
    Reserved { remaining: i64 },
    /// The variant does not track stock; nothing was decremented.
    Unlimited,
    /// Not enough stock; nothing was decremented.
    Insufficient { name: String, available: i64 },
}

/// Repository for variant rows and atomic stock updates.
#[derive(Debug, Clone)]
pub struct VariantRepository {
    pool: SqlitePool,
}

impl VariantRepository {
    /// Creates a new VariantRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VariantRepository { pool }
    }

    /// Inserts a variant row.
    pub async fn insert(&self, variant: &Variant) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO variants
                (id, product_name, option_name, price_cents, stock_quantity,
                 track_stock, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.product_name)
        .bind(&variant.option_name)
        .bind(variant.price_cents)
        .bind(variant.stock_quantity)
        .bind(variant.track_stock)
        .bind(variant.is_active)
        .bind(variant.created_at)
        .bind(variant.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a variant by its ID, active or not.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Variant>> {
        let variant = sqlx::query_as::<_, Variant>(
            r#"
            SELECT id, product_name, option_name, price_cents, stock_quantity,
                   track_stock, is_active, created_at, updated_at
            FROM variants
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    /// Lists active variants sorted by product then option name.
    pub async fn list_active(&self) -> DbResult<Vec<Variant>> {
        let variants = sqlx::query_as::<_, Variant>(
            r#"
            SELECT id, product_name, option_name, price_cents, stock_quantity,
                   track_stock, is_active, created_at, updated_at
            FROM variants
            WHERE is_active = 1
            ORDER BY product_name, option_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(variants)
    }

    /// Counts all variant rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM variants")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Atomically reserves `quantity` units of a tracked variant.
    ///
    /// The decrement and the availability check are one statement, so
    /// concurrent reservations can never both take the last unit. When
    /// the UPDATE matches no row, a follow-up read distinguishes the
    /// three zero-row cases: unknown id, untracked variant (a no-op
    /// success) and genuine shortage.
    pub async fn try_reserve(&self, id: &str, quantity: i64) -> DbResult<ReserveOutcome> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE variants
            SET stock_quantity = stock_quantity - ?2, updated_at = ?3
            WHERE id = ?1 AND track_stock = 1 AND stock_quantity >= ?2
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            let remaining: i64 =
                sqlx::query_scalar("SELECT stock_quantity FROM variants WHERE id = ?1")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?;

            debug!(variant_id = %id, quantity, remaining, "Stock reserved");
            return Ok(ReserveOutcome::Reserved { remaining });
        }

        // Zero rows: missing, untracked, or short.
        let variant = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Variant", id))?;

        if !variant.track_stock {
            return Ok(ReserveOutcome::Unlimited);
        }

        debug!(
            variant_id = %id,
            quantity,
            available = variant.stock_quantity,
            "Reservation refused"
        );
        Ok(ReserveOutcome::Insufficient {
            name: variant.name(),
            available: variant.stock_quantity,
        })
    }

    /// Returns `quantity` units of a tracked variant to stock.
    ///
    /// A no-op for untracked variants. Errors only if the variant row
    /// is gone entirely.
    pub async fn release(&self, id: &str, quantity: i64) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE variants
            SET stock_quantity = stock_quantity + ?2, updated_at = ?3
            WHERE id = ?1 AND track_stock = 1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Untracked variants legitimately match no row.
            self.get_by_id(id)
                .await?
                .ok_or_else(|| DbError::not_found("Variant", id))?;
        } else {
            debug!(variant_id = %id, quantity, "Stock released");
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
