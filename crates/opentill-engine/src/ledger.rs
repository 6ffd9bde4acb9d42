//! # Stock Ledger
//!
//! The single gateway for stock movement. Every reservation and release
//! in the system goes through here, and the underlying mutation is one
//! conditional UPDATE, so two tills can never both take the last unit.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  try_reserve(id, qty)  decrement iff enough stock; all-or-nothing      │
//! │  release(id, qty)      return units (removals, voids, rollbacks)       │
//! │  availability(id)      advisory read for UI checks                     │
//! │                                                                         │
//! │  Untracked variants short-circuit as Unlimited: reserve and release    │
//! │  are no-ops that always succeed.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::debug;

use crate::error::EngineResult;
use opentill_core::{CoreError, StockLevel};
use opentill_db::{Database, ReserveOutcome, VariantRepository};

/// Atomic reserve/release over the variant rows.
#[derive(Debug, Clone)]
pub struct StockLedger {
    variants: VariantRepository,
}

impl StockLedger {
    /// Creates a ledger over the given database.
    pub fn new(db: &Database) -> Self {
        StockLedger {
            variants: db.variants(),
        }
    }

    /// Atomically reserves `quantity` units.
    ///
    /// Succeeds with the post-reservation level, or fails with
    /// `InsufficientStock` having reserved nothing. Unknown variants
    /// surface as `VariantNotFound`.
    pub async fn try_reserve(&self, variant_id: &str, quantity: i64) -> EngineResult<StockLevel> {
        match self.variants.try_reserve(variant_id, quantity).await {
            Ok(ReserveOutcome::Reserved { remaining }) => Ok(StockLevel::Tracked(remaining)),
            Ok(ReserveOutcome::Unlimited) => Ok(StockLevel::Unlimited),
            Ok(ReserveOutcome::Insufficient { name, available }) => {
                Err(CoreError::InsufficientStock {
                    name,
                    available,
                    requested: quantity,
                }
                .into())
            }
            Err(opentill_db::DbError::NotFound { id, .. }) => {
                Err(CoreError::VariantNotFound(id).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns `quantity` units to stock. No-op for untracked variants.
    pub async fn release(&self, variant_id: &str, quantity: i64) -> EngineResult<()> {
        match self.variants.release(variant_id, quantity).await {
            Ok(()) => Ok(()),
            Err(opentill_db::DbError::NotFound { id, .. }) => {
                Err(CoreError::VariantNotFound(id).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Advisory availability read. The answer may be stale by the time
    /// the caller acts on it; only `try_reserve` is authoritative.
    pub async fn availability(&self, variant_id: &str) -> EngineResult<StockLevel> {
        let variant = self
            .variants
            .get_by_id(variant_id)
            .await?
            .ok_or_else(|| CoreError::VariantNotFound(variant_id.to_string()))?;

        let level = variant.stock_level();
        debug!(variant_id, ?level, "Availability read");
        Ok(level)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
