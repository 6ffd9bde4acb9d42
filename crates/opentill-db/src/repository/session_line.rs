//! # Session Line Repository
//!
//! Durable cart rows for table-backed contexts.
//!
//! ## Persistence Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Table carts survive restarts; quick-service carts do not.              │
//! │                                                                         │
//! │  Table context:   every add/remove/status change writes through here.  │
//! │  Quick-service:   lives only in the engine's in-memory map and never   │
//! │                   touches this table.                                   │
//! │                                                                         │
//! │  A table session is reconstructed from its rows (ordered by position)  │
//! │  the first time the context is touched after a restart.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use opentill_core::{ContextKey, LineStatus, SessionLine};

/// Repository for durable session line rows.
#[derive(Debug, Clone)]
pub struct SessionLineRepository {
    pool: SqlitePool,
}

impl SessionLineRepository {
    /// Creates a new SessionLineRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SessionLineRepository { pool }
    }

    /// Loads every line for a context, ordered by position.
    pub async fn load(&self, context: &ContextKey) -> DbResult<Vec<SessionLine>> {
        let lines = sqlx::query_as::<_, SessionLine>(
            r#"
            SELECT position, variant_id, name, unit_price_cents, quantity,
                   status, added_at
            FROM session_lines
            WHERE context_key = ?1
            ORDER BY position
            "#,
        )
        .bind(context.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Inserts or replaces one line. Write-through from the in-memory
    /// session, so REPLACE semantics are exactly what we want.
    pub async fn upsert(&self, context: &ContextKey, line: &SessionLine) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO session_lines
                (context_key, position, variant_id, name, unit_price_cents,
                 quantity, status, added_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(context.to_string())
        .bind(line.position)
        .bind(&line.variant_id)
        .bind(&line.name)
        .bind(line.unit_price_cents)
        .bind(line.quantity)
        .bind(line.status)
        .bind(line.added_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes one line by position.
    pub async fn delete(&self, context: &ContextKey, position: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM session_lines WHERE context_key = ?1 AND position = ?2")
            .bind(context.to_string())
            .bind(position)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Deletes every line for a context (settlement or cart clear).
    pub async fn delete_all(&self, context: &ContextKey) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM session_lines WHERE context_key = ?1")
            .bind(context.to_string())
            .execute(&self.pool)
            .await?;

        debug!(
            context = %context,
            rows = result.rows_affected(),
            "Cleared persisted session lines"
        );
        Ok(())
    }

    /// Updates the status of the given positions.
    pub async fn set_status(
        &self,
        context: &ContextKey,
        positions: &[i64],
        status: LineStatus,
    ) -> DbResult<()> {
        for position in positions {
            sqlx::query(
                r#"
                UPDATE session_lines
                SET status = ?3
                WHERE context_key = ?1 AND position = ?2
                "#,
            )
            .bind(context.to_string())
            .bind(position)
            .bind(status)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;

    fn line(position: i64, variant_id: &str) -> SessionLine {
        SessionLine {
            position,
            variant_id: variant_id.to_string(),
            name: "Latte (Large)".to_string(),
            unit_price_cents: 350,
            quantity: 1,
            status: LineStatus::Draft,
            added_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_write_through_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sessions();
        let ctx = ContextKey::Table("T1".to_string());

        repo.upsert(&ctx, &line(0, "v1")).await.unwrap();
        repo.upsert(&ctx, &line(1, "v2")).await.unwrap();

        // Replacing position 0 must not duplicate it.
        let mut updated = line(0, "v1");
        updated.quantity = 3;
        repo.upsert(&ctx, &updated).await.unwrap();

        let loaded = repo.load(&ctx).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].quantity, 3);
        assert_eq!(loaded[1].variant_id, "v2");
    }

    #[tokio::test]
    async fn test_contexts_are_isolated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sessions();
        let t1 = ContextKey::Table("T1".to_string());
        let t2 = ContextKey::Table("T2".to_string());

        repo.upsert(&t1, &line(0, "v1")).await.unwrap();
        repo.upsert(&t2, &line(0, "v2")).await.unwrap();

        repo.delete_all(&t1).await.unwrap();

        assert!(repo.load(&t1).await.unwrap().is_empty());
        assert_eq!(repo.load(&t2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_status() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sessions();
        let ctx = ContextKey::Table("T3".to_string());

        repo.upsert(&ctx, &line(0, "v1")).await.unwrap();
        repo.upsert(&ctx, &line(1, "v2")).await.unwrap();
        repo.set_status(&ctx, &[0, 1], LineStatus::Sent).await.unwrap();

        let loaded = repo.load(&ctx).await.unwrap();
        assert!(loaded.iter().all(|l| l.status == LineStatus::Sent));
    }
}
