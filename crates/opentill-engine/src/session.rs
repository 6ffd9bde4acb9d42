//! # Session Manager
//!
//! Owns the per-context carts and the locking that serializes work on
//! each of them.
//!
//! ## Concurrency Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Per-Context Serialization                            │
//! │                                                                         │
//! │  sessions: std::Mutex<HashMap<ContextKey, Arc<tokio::Mutex<Slot>>>>    │
//! │            ─────┬────                         ──────┬──────            │
//! │                 │                                    │                  │
//! │     held only to find/insert          held across the whole            │
//! │     the slot (microseconds)           operation, including I/O         │
//! │                                                                         │
//! │  Operations on DIFFERENT contexts run in parallel.                      │
//! │  Operations on the SAME context queue up in arrival order.              │
//! │                                                                         │
//! │  Map entries are never removed (a settled cart is cleared, not          │
//! │  dropped), so a stale Arc can never resurrect an old session.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reservation Policy
//! Quick-service carts are ephemeral and defer stock reservation to
//! settlement; table carts are durable and reserve immediately at add
//! time. The asymmetry is deliberate: a table cart can sit open for an
//! hour, and its items must not be sellable twice in the meantime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::error::EngineResult;
use crate::ledger::StockLedger;
use opentill_core::{
    CartSession, ContextKey, CoreError, LineRemoval, Money, SessionLine, TableStatus, Variant,
};
use opentill_db::{Database, SessionLineRepository, TableRepository, VariantRepository};

// =============================================================================
// Reservation Policy
// =============================================================================

/// When a context's items claim stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationPolicy {
    /// Stock is checked advisorily at add time and reserved atomically
    /// at settlement. Quick-service carts.
    Deferred,
    /// Stock is reserved atomically at add time and released on removal.
    /// Table carts.
    Immediate,
}

impl ReservationPolicy {
    /// The policy a context operates under.
    pub fn for_context(context: &ContextKey) -> Self {
        match context {
            ContextKey::QuickService => ReservationPolicy::Deferred,
            ContextKey::Table(_) => ReservationPolicy::Immediate,
        }
    }
}

// =============================================================================
// Session View
// =============================================================================

/// A read-only snapshot of a session for display.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub context_key: ContextKey,
    pub lines: Vec<SessionLine>,
    pub discount_percentage: u8,
    pub subtotal: Money,
    pub discount: Money,
    pub is_settling: bool,
}

// =============================================================================
// Slot
// =============================================================================

/// One context's cart plus its hydration flag. Table sessions hydrate
/// lazily from their persisted rows on first touch.
pub(crate) struct Slot {
    hydrated: bool,
    pub(crate) session: CartSession,
}

impl Slot {
    fn empty() -> Self {
        Slot {
            hydrated: false,
            session: CartSession::new(),
        }
    }
}

// =============================================================================
// Session Manager
// =============================================================================

/// Per-context cart registry. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    sessions: Mutex<HashMap<ContextKey, Arc<AsyncMutex<Slot>>>>,
    ledger: StockLedger,
    variants: VariantRepository,
    store: SessionLineRepository,
    tables: TableRepository,
}

impl SessionManager {
    /// Creates a session manager over the given database.
    pub fn new(db: &Database, ledger: StockLedger) -> Self {
        SessionManager {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                ledger,
                variants: db.variants(),
                store: db.sessions(),
                tables: db.tables(),
            }),
        }
    }

    pub(crate) fn ledger(&self) -> &StockLedger {
        &self.inner.ledger
    }

    pub(crate) fn store(&self) -> &SessionLineRepository {
        &self.inner.store
    }

    pub(crate) fn tables(&self) -> &TableRepository {
        &self.inner.tables
    }

    /// Gets (or creates) the slot for a context and hydrates it.
    ///
    /// The sync map lock is held only for the lookup; hydration happens
    /// under the slot's own async lock so two first-touches of the same
    /// table load it exactly once.
    pub(crate) async fn slot(
        &self,
        context: &ContextKey,
    ) -> EngineResult<Arc<AsyncMutex<Slot>>> {
        let slot = {
            let mut map = self
                .inner
                .sessions
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.entry(context.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(Slot::empty())))
                .clone()
        };

        {
            let mut guard = slot.lock().await;
            if !guard.hydrated {
                if let ContextKey::Table(_) = context {
                    let lines = self.inner.store.load(context).await?;
                    if !lines.is_empty() {
                        debug!(context = %context, lines = lines.len(), "Hydrated table session");
                        guard.session = CartSession::from_lines(lines);
                    }
                }
                guard.hydrated = true;
            }
        }

        Ok(slot)
    }

    /// Adds one unit of a variant to a context's cart.
    ///
    /// Table contexts reserve the unit atomically before the cart
    /// changes; quick-service contexts get an advisory availability
    /// check against what the cart already holds.
    pub async fn add_item(
        &self,
        context: &ContextKey,
        variant_id: &str,
    ) -> EngineResult<SessionLine> {
        let variant = self.active_variant(variant_id).await?;
        let policy = ReservationPolicy::for_context(context);

        let slot = self.slot(context).await?;
        let mut guard = slot.lock().await;
        let session = &mut guard.session;

        match policy {
            ReservationPolicy::Deferred => {
                // Advisory only: the authoritative reservation happens at
                // settlement. Held units count against availability so the
                // operator isn't promised stock the cart already claims.
                let held = session.held_quantity(variant_id);
                let level = self.inner.ledger.availability(variant_id).await?;
                if !level.can_supply(held + 1) {
                    return Err(CoreError::InsufficientStock {
                        name: variant.name(),
                        available: level.units().unwrap_or(0),
                        requested: held + 1,
                    }
                    .into());
                }
                Ok(session.add_unit(&variant, Utc::now())?)
            }
            ReservationPolicy::Immediate => {
                let first_line = session.is_empty();

                self.inner.ledger.try_reserve(variant_id, 1).await?;

                let line = match session.add_unit(&variant, Utc::now()) {
                    Ok(line) => line,
                    Err(e) => {
                        // The cart refused the unit; hand the reservation back.
                        self.inner.ledger.release(variant_id, 1).await?;
                        return Err(e.into());
                    }
                };

                if let Err(e) = self.inner.store.upsert(context, &line).await {
                    // Persistence failed; undo the in-memory add and the
                    // reservation so memory, disk and ledger stay agreed.
                    let _ = session.remove_unit(variant_id, false);
                    self.inner.ledger.release(variant_id, 1).await?;
                    return Err(e.into());
                }

                if first_line {
                    self.mark_table_occupied(context).await;
                }

                Ok(line)
            }
        }
    }

    /// Removes one unit of a variant from a context's cart.
    ///
    /// Sent lines require `confirm_void`; the caller is expected to
    /// forward a `VoidedSent` outcome to the ticket dispatcher so the
    /// kitchen hears about it.
    pub async fn remove_item(
        &self,
        context: &ContextKey,
        variant_id: &str,
        confirm_void: bool,
    ) -> EngineResult<LineRemoval> {
        let policy = ReservationPolicy::for_context(context);

        let slot = self.slot(context).await?;
        let mut guard = slot.lock().await;
        let session = &mut guard.session;

        if policy == ReservationPolicy::Deferred {
            return Ok(session.remove_unit(variant_id, confirm_void)?);
        }

        let snapshot = session.clone();
        let removal = session.remove_unit(variant_id, confirm_void)?;
        let position = match &removal {
            LineRemoval::Decremented { position, .. }
            | LineRemoval::RemovedDraft { position, .. }
            | LineRemoval::VoidedSent { position, .. } => *position,
        };

        // Persist before releasing: a failure here leaves the unit still
        // reserved, never double-available after a rehydration.
        let persisted = match &removal {
            LineRemoval::Decremented { .. } => {
                match session.lines().iter().find(|l| l.position == position) {
                    Some(line) => self.inner.store.upsert(context, line).await,
                    None => Ok(()),
                }
            }
            LineRemoval::RemovedDraft { .. } | LineRemoval::VoidedSent { .. } => {
                self.inner.store.delete(context, position).await
            }
        };
        if let Err(e) = persisted {
            *session = snapshot;
            return Err(e.into());
        }

        if let Err(e) = self
            .inner
            .ledger
            .release(variant_id, removal.released_units())
            .await
        {
            // Put disk and memory back so ledger, store and session agree.
            if let Some(line) = snapshot.lines().iter().find(|l| l.position == position) {
                if let Err(restore_err) = self.inner.store.upsert(context, line).await {
                    warn!(
                        context = %context,
                        position,
                        error = %restore_err,
                        "Failed to restore persisted line after release failure"
                    );
                }
            }
            *session = snapshot;
            return Err(e);
        }

        if session.is_empty() {
            self.free_table(context).await;
        }

        Ok(removal)
    }

    /// Walks away from a context without settling: releases any held
    /// reservations, drops persisted rows, frees the table and empties
    /// the cart. No order is created. Refused while a checkout is open;
    /// cancel that first.
    pub async fn abandon(&self, context: &ContextKey) -> EngineResult<()> {
        let policy = ReservationPolicy::for_context(context);

        let slot = self.slot(context).await?;
        let mut guard = slot.lock().await;
        let session = &mut guard.session;

        if session.is_settling() {
            return Err(CoreError::SettlementInProgress.into());
        }

        if policy == ReservationPolicy::Immediate {
            // Best-effort: a failed release must not strand the table.
            for line in session.lines() {
                if let Err(e) = self.inner.ledger.release(&line.variant_id, line.quantity).await {
                    warn!(
                        context = %context,
                        variant_id = %line.variant_id,
                        error = %e,
                        "Failed to release reservation while abandoning session"
                    );
                }
            }
            if let Err(e) = self.inner.store.delete_all(context).await {
                warn!(context = %context, error = %e, "Failed to drop persisted session lines");
            }
            self.free_table(context).await;
        }

        session.clear();
        debug!(context = %context, "Session abandoned");
        Ok(())
    }

    /// Sets the whole-order discount percentage for a context.
    pub async fn set_discount(&self, context: &ContextKey, percentage: u8) -> EngineResult<()> {
        let slot = self.slot(context).await?;
        let mut guard = slot.lock().await;
        guard.session.set_discount(percentage)?;
        Ok(())
    }

    /// A display snapshot of a context's session.
    pub async fn view(&self, context: &ContextKey) -> EngineResult<SessionView> {
        let slot = self.slot(context).await?;
        let guard = slot.lock().await;
        let session = &guard.session;
        let totals = session.totals();

        Ok(SessionView {
            context_key: context.clone(),
            lines: session.lines().to_vec(),
            discount_percentage: session.discount_percentage(),
            subtotal: totals.subtotal,
            discount: totals.discount,
            is_settling: session.is_settling(),
        })
    }

    /// Fetches a variant and rejects inactive or unknown ids.
    async fn active_variant(&self, variant_id: &str) -> EngineResult<Variant> {
        let variant = self
            .inner
            .variants
            .get_by_id(variant_id)
            .await?
            .filter(|v| v.is_active)
            .ok_or_else(|| CoreError::VariantNotFound(variant_id.to_string()))?;
        Ok(variant)
    }

    /// Marks a table occupied when its first line lands. An unknown
    /// table number is logged, not fatal: the cart is already correct
    /// and the floor plan is display state.
    async fn mark_table_occupied(&self, context: &ContextKey) {
        let Some(table_number) = context.table_number() else {
            return;
        };
        match self
            .inner
            .tables
            .set_status(table_number, TableStatus::Occupied)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(table = %table_number, "Session opened for unknown table");
            }
            Err(e) => {
                warn!(table = %table_number, error = %e, "Failed to mark table occupied");
            }
        }
    }

    /// Returns a table to Available once its cart is empty. Same
    /// tolerance as `mark_table_occupied`: the floor plan is display
    /// state and never blocks the cart.
    async fn free_table(&self, context: &ContextKey) {
        let Some(table_number) = context.table_number() else {
            return;
        };
        if let Err(e) = self
            .inner
            .tables
            .set_status(table_number, TableStatus::Available)
            .await
        {
            warn!(table = %table_number, error = %e, "Failed to free table");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use opentill_core::StockLevel;
    use opentill_db::DbConfig;

    async fn setup() -> (Database, SessionManager) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed(&db).await;
        let ledger = StockLedger::new(&db);
        let manager = SessionManager::new(&db, ledger);
        (db, manager)
    }

    async fn seed(db: &Database) {
        let now = Utc::now();
        let variants = [
            ("latte", "Latte", "Large", 350, 0, false),
            ("muffin", "Muffin", "Blueberry", 275, 2, true),
        ];
        for (id, product, option, price, stock, track) in variants {
            db.variants()
                .insert(&Variant {
                    id: id.to_string(),
                    product_name: product.to_string(),
                    option_name: option.to_string(),
                    price_cents: price,
                    stock_quantity: stock,
                    track_stock: track,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }
        db.tables().create("T1").await.unwrap();
    }

    fn table(n: &str) -> ContextKey {
        ContextKey::Table(n.to_string())
    }

    #[tokio::test]
    async fn test_quick_service_defers_reservation() {
        let (db, manager) = setup().await;
        let ctx = ContextKey::QuickService;

        manager.add_item(&ctx, "muffin").await.unwrap();

        // Nothing reserved yet.
        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 2);
    }

    #[tokio::test]
    async fn test_quick_service_advisory_check_counts_held_units() {
        let (_db, manager) = setup().await;
        let ctx = ContextKey::QuickService;

        // Stock is 2; the cart may hold two but not three.
        manager.add_item(&ctx, "muffin").await.unwrap();
        manager.add_item(&ctx, "muffin").await.unwrap();

        let err = manager.add_item(&ctx, "muffin").await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_table_reserves_immediately_and_releases_on_remove() {
        let (db, manager) = setup().await;
        let ctx = table("T1");

        manager.add_item(&ctx, "muffin").await.unwrap();
        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 1);

        manager.remove_item(&ctx, "muffin", false).await.unwrap();
        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 2);
    }

    #[tokio::test]
    async fn test_table_add_fails_when_stock_exhausted() {
        let (db, manager) = setup().await;
        let ctx = table("T1");

        manager.add_item(&ctx, "muffin").await.unwrap();
        manager.add_item(&ctx, "muffin").await.unwrap();

        let err = manager.add_item(&ctx, "muffin").await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InsufficientStock { available: 0, .. })
        ));

        // The failed add reserved nothing extra.
        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 0);
        let view = manager.view(&ctx).await.unwrap();
        assert_eq!(view.lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_table_session_survives_manager_restart() {
        let db_path = format!(
            "{}/opentill-session-{}.db",
            std::env::temp_dir().display(),
            uuid::Uuid::new_v4()
        );

        {
            let db = Database::new(DbConfig::new(&db_path)).await.unwrap();
            seed(&db).await;
            let manager = SessionManager::new(&db, StockLedger::new(&db));
            manager.add_item(&table("T1"), "latte").await.unwrap();
            manager.add_item(&table("T1"), "latte").await.unwrap();
            db.close().await;
        }

        // A fresh manager over the same file sees the table's cart;
        // quick-service carts would be gone.
        let db = Database::new(DbConfig::new(&db_path)).await.unwrap();
        let manager = SessionManager::new(&db, StockLedger::new(&db));

        let view = manager.view(&table("T1")).await.unwrap();
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.lines[0].quantity, 2);
        assert_eq!(view.subtotal.cents(), 700);
    }

    #[tokio::test]
    async fn test_first_line_marks_table_occupied() {
        let (db, manager) = setup().await;

        manager.add_item(&table("T1"), "latte").await.unwrap();

        let row = db.tables().get_by_number("T1").await.unwrap().unwrap();
        assert_eq!(row.status, TableStatus::Occupied);
    }

    #[tokio::test]
    async fn test_remove_persistence_failure_keeps_reservation() {
        let (db, manager) = setup().await;
        let ctx = table("T1");

        manager.add_item(&ctx, "muffin").await.unwrap();

        sqlx::query("ALTER TABLE session_lines RENAME TO session_lines_gone")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(manager.remove_item(&ctx, "muffin", false).await.is_err());

        // The unit stays reserved and the cart still holds the line.
        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 1);
        let view = manager.view(&ctx).await.unwrap();
        assert_eq!(view.lines[0].quantity, 1);

        // A fresh manager hydrating from the same store agrees: one line
        // held, one unit reserved, nothing double-available.
        sqlx::query("ALTER TABLE session_lines_gone RENAME TO session_lines")
            .execute(db.pool())
            .await
            .unwrap();
        let rehydrated = SessionManager::new(&db, StockLedger::new(&db));
        let view = rehydrated.view(&ctx).await.unwrap();
        assert_eq!(view.lines[0].quantity, 1);

        // With the store healthy again the removal completes.
        manager.remove_item(&ctx, "muffin", false).await.unwrap();
        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 2);
    }

    #[tokio::test]
    async fn test_removing_last_line_frees_table() {
        let (db, manager) = setup().await;
        let ctx = table("T1");

        manager.add_item(&ctx, "latte").await.unwrap();
        manager.remove_item(&ctx, "latte", false).await.unwrap();

        let row = db.tables().get_by_number("T1").await.unwrap().unwrap();
        assert_eq!(row.status, TableStatus::Available);
    }

    #[tokio::test]
    async fn test_abandon_releases_stock_and_frees_table() {
        let (db, manager) = setup().await;
        let ctx = table("T1");

        manager.add_item(&ctx, "muffin").await.unwrap();
        manager.add_item(&ctx, "muffin").await.unwrap();
        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 0);

        manager.abandon(&ctx).await.unwrap();

        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 2);
        let row = db.tables().get_by_number("T1").await.unwrap().unwrap();
        assert_eq!(row.status, TableStatus::Available);

        let view = manager.view(&ctx).await.unwrap();
        assert!(view.lines.is_empty());

        // No persisted rows survive for a fresh hydration to find.
        let rows = db.sessions().load(&ctx).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table_is_tolerated() {
        let (_db, manager) = setup().await;

        // T9 has no floor-plan row; the cart still works.
        let line = manager.add_item(&table("T9"), "latte").await.unwrap();
        assert_eq!(line.quantity, 1);
    }

    #[tokio::test]
    async fn test_inactive_variant_is_not_found() {
        let (db, manager) = setup().await;

        sqlx::query("UPDATE variants SET is_active = 0 WHERE id = 'latte'")
            .execute(db.pool())
            .await
            .unwrap();

        let err = manager
            .add_item(&ContextKey::QuickService, "latte")
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::VariantNotFound(_))));
    }

    #[tokio::test]
    async fn test_untracked_variant_never_blocks() {
        let (_db, manager) = setup().await;
        let ctx = ContextKey::QuickService;

        for _ in 0..10 {
            manager.add_item(&ctx, "latte").await.unwrap();
        }
        let view = manager.view(&ctx).await.unwrap();
        assert_eq!(view.lines[0].quantity, 10);
        assert_eq!(view.subtotal.cents(), 3500);

        let level = manager.ledger().availability("latte").await.unwrap();
        assert_eq!(level, StockLevel::Unlimited);
    }
}
