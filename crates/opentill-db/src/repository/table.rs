//! # Dining Table Repository
//!
//! Floor-plan rows. Table status is display state for the host stand;
//! the authoritative occupancy signal is whether the table's session
//! has lines.

use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use opentill_core::{DiningTable, TableStatus};

/// Repository for dining table rows.
#[derive(Debug, Clone)]
pub struct TableRepository {
    pool: SqlitePool,
}

impl TableRepository {
    /// Creates a new TableRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TableRepository { pool }
    }

    /// Creates a table with the given number, starting Available.
    pub async fn create(&self, table_number: &str) -> DbResult<DiningTable> {
        let table = DiningTable {
            id: Uuid::new_v4().to_string(),
            table_number: table_number.to_string(),
            status: TableStatus::Available,
        };

        sqlx::query("INSERT INTO dining_tables (id, table_number, status) VALUES (?1, ?2, ?3)")
            .bind(&table.id)
            .bind(&table.table_number)
            .bind(table.status)
            .execute(&self.pool)
            .await?;

        Ok(table)
    }

    /// Gets a table by its number.
    pub async fn get_by_number(&self, table_number: &str) -> DbResult<Option<DiningTable>> {
        let table = sqlx::query_as::<_, DiningTable>(
            "SELECT id, table_number, status FROM dining_tables WHERE table_number = ?1",
        )
        .bind(table_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(table)
    }

    /// Lists all tables sorted by number.
    pub async fn list(&self) -> DbResult<Vec<DiningTable>> {
        let tables = sqlx::query_as::<_, DiningTable>(
            "SELECT id, table_number, status FROM dining_tables ORDER BY table_number",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tables)
    }

    /// Sets a table's status; returns false for an unknown table number.
    pub async fn set_status(&self, table_number: &str, status: TableStatus) -> DbResult<bool> {
        let result =
            sqlx::query("UPDATE dining_tables SET status = ?2 WHERE table_number = ?1")
                .bind(table_number)
                .bind(status)
                .execute(&self.pool)
                .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            debug!(table = %table_number, status = status.as_str(), "Table status updated");
        }
        Ok(updated)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
