//! # Kitchen Ticket Repository
//!
//! Ticket snapshots, status transitions and the kitchen display feed.
//!
//! ## Ordering Guarantee
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The kitchen feed orders by (created_at, seq).                          │
//! │                                                                         │
//! │  created_at alone can tie when two dispatches land in the same          │
//! │  timestamp granule; seq is AUTOINCREMENT and breaks the tie in true     │
//! │  insertion order. A ticket never moves relative to its neighbours.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status transitions use conditional UPDATEs (`WHERE status = 'pending'`)
//! so a racing double-complete resolves to exactly one winner.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use opentill_core::{ContextKey, KitchenTicket, TicketLine, TicketStatus};

/// Repository for kitchen ticket rows.
#[derive(Debug, Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    /// Creates a new TicketRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TicketRepository { pool }
    }

    /// Inserts a ticket snapshot and returns the storage-assigned seq.
    pub async fn insert(
        &self,
        id: &str,
        context: &ContextKey,
        items: &[TicketLine],
        status: TicketStatus,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> DbResult<i64> {
        let items_json =
            serde_json::to_string(items).map_err(|e| DbError::Internal(e.to_string()))?;

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO kitchen_tickets (id, context_key, items, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING seq
            "#,
        )
        .bind(id)
        .bind(context.to_string())
        .bind(items_json)
        .bind(status)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(ticket_id = %id, seq, context = %context, "Ticket inserted");
        Ok(seq)
    }

    /// Gets a ticket by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<KitchenTicket>> {
        let row = sqlx::query(
            r#"
            SELECT seq, id, context_key, items, status, created_at
            FROM kitchen_tickets
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| ticket_from_row(&r)).transpose()
    }

    /// Conditionally transitions a Pending ticket to Completed.
    /// Returns false when the ticket was not Pending (or doesn't exist).
    pub async fn complete(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE kitchen_tickets SET status = 'completed' WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Conditionally transitions a Pending ticket to Voided.
    /// Returns false when the ticket was not Pending (or doesn't exist).
    pub async fn void(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE kitchen_tickets SET status = 'voided' WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the item snapshot of a still-Pending ticket.
    /// Used to append crossed-out void lines. Returns false when the
    /// ticket is no longer Pending.
    pub async fn update_items(&self, id: &str, items: &[TicketLine]) -> DbResult<bool> {
        let items_json =
            serde_json::to_string(items).map_err(|e| DbError::Internal(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE kitchen_tickets SET items = ?2 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(items_json)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// The most recently dispatched Pending ticket for a context, if any.
    pub async fn newest_pending_for_context(
        &self,
        context: &ContextKey,
    ) -> DbResult<Option<KitchenTicket>> {
        let row = sqlx::query(
            r#"
            SELECT seq, id, context_key, items, status, created_at
            FROM kitchen_tickets
            WHERE context_key = ?1 AND status = 'pending'
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(context.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| ticket_from_row(&r)).transpose()
    }

    /// The kitchen display feed: Pending and Voided tickets, oldest first.
    /// Completed tickets drop off the display.
    pub async fn active_feed(&self) -> DbResult<Vec<KitchenTicket>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, id, context_key, items, status, created_at
            FROM kitchen_tickets
            WHERE status IN ('pending', 'voided')
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ticket_from_row).collect()
    }
}

/// Maps one row to a KitchenTicket, surfacing unparseable TEXT columns
/// as CorruptRow rather than panicking on bad data.
fn ticket_from_row(row: &SqliteRow) -> DbResult<KitchenTicket> {
    let id: String = row.try_get("id")?;

    let context_raw: String = row.try_get("context_key")?;
    let context_key: ContextKey = context_raw
        .parse()
        .map_err(|e: String| DbError::corrupt_row("Ticket", &id, e))?;

    let items_raw: String = row.try_get("items")?;
    let items: Vec<TicketLine> = serde_json::from_str(&items_raw)
        .map_err(|e| DbError::corrupt_row("Ticket", &id, e.to_string()))?;

    Ok(KitchenTicket {
        seq: row.try_get("seq")?,
        id,
        context_key,
        items,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;

    fn lines(name: &str, qty: i64) -> Vec<TicketLine> {
        vec![TicketLine {
            name: name.to_string(),
            quantity: qty,
            voided: false,
        }]
    }

    #[tokio::test]
    async fn test_insert_assigns_monotonic_seq() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.tickets();
        let ctx = ContextKey::QuickService;
        let now = Utc::now();

        let seq1 = repo
            .insert("t1", &ctx, &lines("Latte (Large)", 1), TicketStatus::Pending, now)
            .await
            .unwrap();
        let seq2 = repo
            .insert("t2", &ctx, &lines("Muffin (Regular)", 2), TicketStatus::Pending, now)
            .await
            .unwrap();

        assert!(seq2 > seq1);

        // Same created_at; seq keeps the feed in insertion order.
        let feed = repo.active_feed().await.unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].id, "t1");
        assert_eq!(feed[1].id, "t2");
    }

    #[tokio::test]
    async fn test_complete_is_exactly_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.tickets();
        let ctx = ContextKey::Table("T1".to_string());

        repo.insert("t1", &ctx, &lines("Latte (Large)", 1), TicketStatus::Pending, Utc::now())
            .await
            .unwrap();

        assert!(repo.complete("t1").await.unwrap());
        assert!(!repo.complete("t1").await.unwrap());
        assert!(!repo.void("t1").await.unwrap());

        let ticket = repo.get_by_id("t1").await.unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Completed);
    }

    #[tokio::test]
    async fn test_completed_tickets_leave_the_feed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.tickets();
        let ctx = ContextKey::QuickService;

        repo.insert("t1", &ctx, &lines("Latte (Large)", 1), TicketStatus::Pending, Utc::now())
            .await
            .unwrap();
        repo.insert("t2", &ctx, &lines("Muffin (Regular)", 1), TicketStatus::Pending, Utc::now())
            .await
            .unwrap();

        repo.complete("t1").await.unwrap();
        repo.void("t2").await.unwrap();

        // Voided tickets stay visible (crossed out); completed ones drop.
        let feed = repo.active_feed().await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, "t2");
        assert_eq!(feed[0].status, TicketStatus::Voided);
    }

    #[tokio::test]
    async fn test_update_items_only_while_pending() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.tickets();
        let ctx = ContextKey::Table("T2".to_string());

        repo.insert("t1", &ctx, &lines("Latte (Large)", 2), TicketStatus::Pending, Utc::now())
            .await
            .unwrap();

        let mut items = lines("Latte (Large)", 2);
        items.push(TicketLine {
            name: "Muffin (Regular)".to_string(),
            quantity: 1,
            voided: true,
        });
        assert!(repo.update_items("t1", &items).await.unwrap());

        repo.complete("t1").await.unwrap();
        assert!(!repo.update_items("t1", &items).await.unwrap());

        let ticket = repo.get_by_id("t1").await.unwrap().unwrap();
        assert_eq!(ticket.items.len(), 2);
        assert!(ticket.items[1].voided);
    }

    #[tokio::test]
    async fn test_newest_pending_for_context() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.tickets();
        let t1 = ContextKey::Table("T1".to_string());
        let t2 = ContextKey::Table("T2".to_string());

        repo.insert("a", &t1, &lines("Latte (Large)", 1), TicketStatus::Pending, Utc::now())
            .await
            .unwrap();
        repo.insert("b", &t1, &lines("Muffin (Regular)", 1), TicketStatus::Pending, Utc::now())
            .await
            .unwrap();
        repo.insert("c", &t2, &lines("Latte (Large)", 1), TicketStatus::Pending, Utc::now())
            .await
            .unwrap();

        let newest = repo.newest_pending_for_context(&t1).await.unwrap().unwrap();
        assert_eq!(newest.id, "b");

        repo.complete("b").await.unwrap();
        let newest = repo.newest_pending_for_context(&t1).await.unwrap().unwrap();
        assert_eq!(newest.id, "a");
    }
}
