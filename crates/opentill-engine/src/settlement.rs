//! # Settlement Engine
//!
//! Checkout freeze, payment recording and order reversal.
//!
//! ## Settlement Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  initiate_checkout ──► cart frozen, totals snapshotted                  │
//! │        │                                                                │
//! │        ├── cancel_checkout ──► cart thaws unchanged                     │
//! │        │                                                                │
//! │        └── confirm_payment(method, tip)                                 │
//! │              │                                                          │
//! │              ├─ deferred carts: atomically reserve every line now       │
//! │              │    shortfall ──► release partials, thaw cart,            │
//! │              │                  InsufficientStock (operator adjusts)    │
//! │              │                                                          │
//! │              ├─ record order + items in one transaction                 │
//! │              │    failure ──► release THIS attempt's reservations,      │
//! │              │                stay frozen, PaymentRecordingFailed       │
//! │              │                (the whole call is safe to retry)         │
//! │              │                                                          │
//! │              └─ success ──► clear cart, drop persisted rows, free table │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Void Semantics
//! The durable part (flipping the order row) happens first and exactly
//! once. Restocking is best-effort afterwards: a failed release is
//! reported as a warning, never a reason to un-void the order.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::session::{ReservationPolicy, SessionManager};
use opentill_core::{
    CheckoutSnapshot, ContextKey, CoreError, Money, Order, OrderLine, OrderStatus, PaymentMethod,
    TableStatus,
};
use opentill_db::{Database, OrderRepository};

/// The result of voiding an order: the void itself always succeeded;
/// restock failures ride along as warnings.
#[derive(Debug, Clone)]
pub struct VoidOutcome {
    pub order_id: String,
    /// Human-readable notes for each line that could not be restocked.
    pub restock_warnings: Vec<String>,
}

/// Checkout and payment orchestration.
#[derive(Clone)]
pub struct SettlementEngine {
    sessions: SessionManager,
    orders: OrderRepository,
}

impl SettlementEngine {
    /// Creates a settlement engine over the given database and sessions.
    pub fn new(db: &Database, sessions: SessionManager) -> Self {
        SettlementEngine {
            sessions,
            orders: db.orders(),
        }
    }

    /// Freezes a context's cart for payment and returns the totals the
    /// customer will be quoted.
    pub async fn initiate_checkout(&self, context: &ContextKey) -> EngineResult<CheckoutSnapshot> {
        let slot = self.sessions.slot(context).await?;
        let mut guard = slot.lock().await;
        Ok(guard.session.begin_checkout()?)
    }

    /// Abandons an initiated checkout; the cart thaws with nothing lost.
    pub async fn cancel_checkout(&self, context: &ContextKey) -> EngineResult<()> {
        let slot = self.sessions.slot(context).await?;
        let mut guard = slot.lock().await;
        guard.session.cancel_checkout()?;
        Ok(())
    }

    /// Confirms payment for a settling cart and records the order.
    pub async fn confirm_payment(
        &self,
        context: &ContextKey,
        method: PaymentMethod,
        tip_cents: i64,
    ) -> EngineResult<Order> {
        let policy = ReservationPolicy::for_context(context);

        let slot = self.sessions.slot(context).await?;
        let mut guard = slot.lock().await;
        let session = &mut guard.session;

        let totals = session.settlement_totals(tip_cents)?;
        let lines: Vec<OrderLine> = session
            .lines()
            .iter()
            .map(|l| OrderLine {
                variant_id: l.variant_id.clone(),
                name: l.name.clone(),
                unit_price_cents: l.unit_price_cents,
                quantity: l.quantity,
            })
            .collect();

        // Deferred carts claim their stock now, all-or-nothing. Table
        // carts reserved at add time; their units are already held.
        let reserved: Vec<(String, i64)> = if policy == ReservationPolicy::Deferred {
            match self.reserve_all(&lines).await {
                Ok(reserved) => reserved,
                Err(e) => {
                    // Shortfall: thaw the cart so the operator can drop
                    // the unavailable item and try again.
                    session.revert_to_active();
                    return Err(e);
                }
            }
        } else {
            Vec::new()
        };

        let order = Order {
            id: Uuid::new_v4().to_string(),
            context_key: context.clone(),
            status: OrderStatus::Completed,
            subtotal_cents: totals.subtotal.cents(),
            discount_cents: totals.discount.cents(),
            tip_cents: totals.tip.cents(),
            total_cents: totals.total.cents(),
            payment_method: method,
            created_at: Utc::now(),
            voided_at: None,
        };

        if let Err(e) = self.orders.record(&order, &lines).await {
            // Undo only what THIS attempt took; the cart stays frozen at
            // the quoted totals and the whole call is safe to retry.
            self.release_all(&reserved).await;
            return Err(CoreError::PaymentRecordingFailed(e.to_string()).into());
        }

        // The sale is durable; everything after this is cleanup.
        session.clear();
        self.cleanup_context(context).await;

        info!(
            order_id = %order.id,
            context = %context,
            total = %Money::from_cents(order.total_cents),
            "Payment recorded"
        );
        Ok(order)
    }

    /// Voids a completed order, restocking its lines best-effort.
    pub async fn void_order(&self, order_id: &str) -> EngineResult<VoidOutcome> {
        // Durable first: the conditional update is the exactly-once gate.
        if !self.orders.void(order_id, Utc::now()).await? {
            return match self.orders.get_by_id(order_id).await? {
                Some(order) => Err(CoreError::invalid_transition(
                    "Order",
                    order.status.as_str(),
                    "voided",
                )
                .into()),
                None => Err(CoreError::OrderNotFound(order_id.to_string()).into()),
            };
        }

        let mut warnings = Vec::new();
        for line in self.orders.items(order_id).await? {
            if let Err(e) = self
                .sessions
                .ledger()
                .release(&line.variant_id, line.quantity)
                .await
            {
                warn!(
                    order_id = %order_id,
                    variant_id = %line.variant_id,
                    error = %e,
                    "Restock failed while voiding order"
                );
                warnings.push(format!("could not restock {}: {}", line.name, e));
            }
        }

        info!(order_id = %order_id, warnings = warnings.len(), "Order voided");
        Ok(VoidOutcome {
            order_id: order_id.to_string(),
            restock_warnings: warnings,
        })
    }

    /// Revenue across completed orders. Voided orders don't count.
    pub async fn completed_revenue(&self) -> EngineResult<Money> {
        Ok(Money::from_cents(
            self.orders.completed_revenue_cents().await?,
        ))
    }

    /// Reserves every line, aggregated per variant; on any shortfall,
    /// releases what this call already took and returns the error.
    async fn reserve_all(&self, lines: &[OrderLine]) -> EngineResult<Vec<(String, i64)>> {
        let mut per_variant: Vec<(String, i64)> = Vec::new();
        for line in lines {
            match per_variant.iter_mut().find(|(id, _)| *id == line.variant_id) {
                Some((_, qty)) => *qty += line.quantity,
                None => per_variant.push((line.variant_id.clone(), line.quantity)),
            }
        }

        let mut reserved: Vec<(String, i64)> = Vec::new();
        for (variant_id, quantity) in per_variant {
            match self.sessions.ledger().try_reserve(&variant_id, quantity).await {
                Ok(_) => reserved.push((variant_id, quantity)),
                Err(e) => {
                    self.release_all(&reserved).await;
                    return Err(e);
                }
            }
        }
        Ok(reserved)
    }

    /// Best-effort release of a batch of reservations.
    async fn release_all(&self, reserved: &[(String, i64)]) {
        for (variant_id, quantity) in reserved {
            if let Err(e) = self.sessions.ledger().release(variant_id, *quantity).await {
                warn!(variant_id = %variant_id, error = %e, "Failed to release reservation");
            }
        }
    }

    /// Post-settlement cleanup for durable contexts: drop persisted cart
    /// rows and free the table. Failures are logged; the sale already
    /// happened and must not be rolled back by cleanup.
    async fn cleanup_context(&self, context: &ContextKey) {
        let Some(table_number) = context.table_number() else {
            return;
        };

        if let Err(e) = self.sessions.store().delete_all(context).await {
            warn!(context = %context, error = %e, "Failed to drop persisted session lines");
        }
        match self
            .sessions
            .tables()
            .set_status(table_number, TableStatus::Available)
            .await
        {
            Ok(_) => {}
            Err(e) => warn!(table = %table_number, error = %e, "Failed to free table"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::StockLedger;
    use opentill_core::Variant;
    use opentill_db::DbConfig;

    async fn setup() -> (Database, SessionManager, SettlementEngine) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let variants = [
            ("latte", "Latte", "Large", 350, 0, false),
            ("muffin", "Muffin", "Blueberry", 275, 5, true),
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

        let sessions = SessionManager::new(&db, StockLedger::new(&db));
        let engine = SettlementEngine::new(&db, sessions.clone());
        (db, sessions, engine)
    }

    fn table(n: &str) -> ContextKey {
        ContextKey::Table(n.to_string())
    }

    #[tokio::test]
    async fn test_receipt_math_end_to_end() {
        // Latte x2 @ 350 + Muffin x1 @ 275, 10% discount, 100 tip:
        // subtotal 975, discount 98, total 975 - 98 + 100 = 977.
        let (_db, sessions, engine) = setup().await;
        let ctx = ContextKey::QuickService;

        sessions.add_item(&ctx, "latte").await.unwrap();
        sessions.add_item(&ctx, "latte").await.unwrap();
        sessions.add_item(&ctx, "muffin").await.unwrap();
        sessions.set_discount(&ctx, 10).await.unwrap();

        let snapshot = engine.initiate_checkout(&ctx).await.unwrap();
        assert_eq!(snapshot.subtotal.cents(), 975);
        assert_eq!(snapshot.discount.cents(), 98);

        let order = engine
            .confirm_payment(&ctx, PaymentMethod::Card, 100)
            .await
            .unwrap();
        assert_eq!(order.total_cents, 977);
        assert_eq!(order.tip_cents, 100);

        // Cart is cleared for the next customer.
        let view = sessions.view(&ctx).await.unwrap();
        assert!(view.lines.is_empty());
        assert!(!view.is_settling);

        assert_eq!(engine.completed_revenue().await.unwrap().cents(), 977);
    }

    #[tokio::test]
    async fn test_deferred_reservation_happens_at_settlement() {
        let (db, sessions, engine) = setup().await;
        let ctx = ContextKey::QuickService;

        sessions.add_item(&ctx, "muffin").await.unwrap();
        sessions.add_item(&ctx, "muffin").await.unwrap();

        // Still unreserved while the cart is open.
        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 5);

        engine.initiate_checkout(&ctx).await.unwrap();
        engine
            .confirm_payment(&ctx, PaymentMethod::Cash, 0)
            .await
            .unwrap();

        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 3);
    }

    #[tokio::test]
    async fn test_settlement_shortfall_thaws_cart_and_leaks_nothing() {
        let (db, sessions, engine) = setup().await;
        let ctx = ContextKey::QuickService;

        sessions.add_item(&ctx, "muffin").await.unwrap();
        sessions.add_item(&ctx, "muffin").await.unwrap();
        engine.initiate_checkout(&ctx).await.unwrap();

        // Stock drops underneath the open checkout (another till sold them).
        sqlx::query("UPDATE variants SET stock_quantity = 1 WHERE id = 'muffin'")
            .execute(db.pool())
            .await
            .unwrap();

        let err = engine
            .confirm_payment(&ctx, PaymentMethod::Cash, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InsufficientStock { available: 1, .. })
        ));

        // Nothing was taken, and the cart thawed so it can be adjusted.
        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 1);
        sessions.remove_item(&ctx, "muffin", false).await.unwrap();

        engine.initiate_checkout(&ctx).await.unwrap();
        let order = engine
            .confirm_payment(&ctx, PaymentMethod::Cash, 0)
            .await
            .unwrap();
        assert_eq!(order.total_cents, 275);
    }

    #[tokio::test]
    async fn test_confirm_without_checkout_is_invalid() {
        let (_db, sessions, engine) = setup().await;
        let ctx = ContextKey::QuickService;

        sessions.add_item(&ctx, "latte").await.unwrap();
        let err = engine
            .confirm_payment(&ctx, PaymentMethod::Cash, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_checkout_empty_cart_rejected() {
        let (_db, _sessions, engine) = setup().await;

        let err = engine
            .initiate_checkout(&ContextKey::QuickService)
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::EmptyCart)));
    }

    #[tokio::test]
    async fn test_recording_failure_restores_stock_and_keeps_cart() {
        let (db, sessions, engine) = setup().await;
        let ctx = ContextKey::QuickService;

        sessions.add_item(&ctx, "muffin").await.unwrap();
        engine.initiate_checkout(&ctx).await.unwrap();

        // Make the order insert fail without touching anything else.
        sqlx::query("ALTER TABLE orders RENAME TO orders_gone")
            .execute(db.pool())
            .await
            .unwrap();

        let err = engine
            .confirm_payment(&ctx, PaymentMethod::Cash, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::PaymentRecordingFailed(_))
        ));
        assert!(err.is_retryable_payment_failure());

        // The settlement-time reservation was rolled back.
        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 5);

        // The cart is intact and still frozen at the quoted totals.
        let view = sessions.view(&ctx).await.unwrap();
        assert_eq!(view.lines.len(), 1);
        assert!(view.is_settling);

        // And the retry succeeds once storage recovers.
        sqlx::query("ALTER TABLE orders_gone RENAME TO orders")
            .execute(db.pool())
            .await
            .unwrap();
        let order = engine
            .confirm_payment(&ctx, PaymentMethod::Cash, 0)
            .await
            .unwrap();
        assert_eq!(order.total_cents, 275);
    }

    #[tokio::test]
    async fn test_table_settlement_cleans_up_durable_state() {
        let (db, sessions, engine) = setup().await;
        let ctx = table("T1");

        sessions.add_item(&ctx, "muffin").await.unwrap();
        engine.initiate_checkout(&ctx).await.unwrap();
        engine
            .confirm_payment(&ctx, PaymentMethod::Card, 0)
            .await
            .unwrap();

        // Persisted rows dropped, table freed, and the sold unit stays
        // consumed (the add-time reservation became the sale).
        assert!(db.sessions().load(&ctx).await.unwrap().is_empty());
        let row = db.tables().get_by_number("T1").await.unwrap().unwrap();
        assert_eq!(row.status, TableStatus::Available);
        let variant = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(variant.stock_quantity, 4);
    }

    #[tokio::test]
    async fn test_void_order_restocks_and_excludes_revenue() {
        let (db, sessions, engine) = setup().await;
        let ctx = ContextKey::QuickService;

        sessions.add_item(&ctx, "muffin").await.unwrap();
        engine.initiate_checkout(&ctx).await.unwrap();
        let order = engine
            .confirm_payment(&ctx, PaymentMethod::Cash, 0)
            .await
            .unwrap();

        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 4);

        let outcome = engine.void_order(&order.id).await.unwrap();
        assert!(outcome.restock_warnings.is_empty());

        let row = db.variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 5);
        assert_eq!(engine.completed_revenue().await.unwrap().cents(), 0);

        // Second void is refused; the first already won.
        let err = engine.void_order(&order.id).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_void_order_restock_failure_is_a_warning() {
        let (db, sessions, engine) = setup().await;
        let ctx = ContextKey::QuickService;

        sessions.add_item(&ctx, "muffin").await.unwrap();
        engine.initiate_checkout(&ctx).await.unwrap();
        let order = engine
            .confirm_payment(&ctx, PaymentMethod::Cash, 0)
            .await
            .unwrap();

        // The variant vanishes from the catalog before the void.
        sqlx::query("DELETE FROM variants WHERE id = 'muffin'")
            .execute(db.pool())
            .await
            .unwrap();

        let outcome = engine.void_order(&order.id).await.unwrap();
        assert_eq!(outcome.restock_warnings.len(), 1);

        // The void itself still stands.
        let voided = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(voided.status, OrderStatus::Voided);
    }

    #[tokio::test]
    async fn test_void_unknown_order() {
        let (_db, _sessions, engine) = setup().await;

        let err = engine.void_order("ghost").await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::OrderNotFound(_))));
    }
}
