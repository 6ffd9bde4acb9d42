//! # Till Façade
//!
//! The single handle a front-end holds. Wires the ledger, sessions,
//! dispatcher, settlement and bus over one database and re-exposes the
//! operations a counter screen actually calls.
//!
//! ## Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Till                                       │
//! │                                                                         │
//! │   SessionManager ──┬── StockLedger ──── VariantRepository               │
//! │         │          │                                                    │
//! │   TicketDispatcher ┤                                                    │
//! │         │          └── NotificationBus ──► subscribers                  │
//! │   SettlementEngine │                                                    │
//! │         │          │                                                    │
//! │         └──────────┴── Database (SQLite)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::bus::NotificationBus;
use crate::dispatch::TicketDispatcher;
use crate::error::EngineResult;
use crate::ledger::StockLedger;
use crate::session::{SessionManager, SessionView};
use crate::settlement::{SettlementEngine, VoidOutcome};
use opentill_core::{
    CheckoutSnapshot, ContextKey, DiningTable, KitchenTicket, LineRemoval, Money, Order,
    PaymentMethod, SessionLine, Variant,
};
use opentill_db::{Database, DbConfig};

/// The assembled till. Clone-cheap; clones share all state.
#[derive(Clone)]
pub struct Till {
    db: Database,
    bus: NotificationBus,
    sessions: SessionManager,
    dispatcher: TicketDispatcher,
    settlement: SettlementEngine,
}

impl Till {
    /// Opens a till over a new database connection (runs migrations).
    pub async fn open(config: DbConfig) -> EngineResult<Self> {
        let db = Database::new(config).await?;
        Ok(Self::with_database(db))
    }

    /// Assembles a till over an existing database handle.
    pub fn with_database(db: Database) -> Self {
        let bus = NotificationBus::new();
        let ledger = StockLedger::new(&db);
        let sessions = SessionManager::new(&db, ledger);
        let dispatcher = TicketDispatcher::new(&db, sessions.clone(), bus.clone());
        let settlement = SettlementEngine::new(&db, sessions.clone());

        Till {
            db,
            bus,
            sessions,
            dispatcher,
            settlement,
        }
    }

    // -------------------------------------------------------------------------
    // Component access
    // -------------------------------------------------------------------------

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn dispatcher(&self) -> &TicketDispatcher {
        &self.dispatcher
    }

    pub fn settlement(&self) -> &SettlementEngine {
        &self.settlement
    }

    // -------------------------------------------------------------------------
    // Catalog and floor plan
    // -------------------------------------------------------------------------

    /// The sellable menu.
    pub async fn menu(&self) -> EngineResult<Vec<Variant>> {
        Ok(self.db.variants().list_active().await?)
    }

    /// The floor plan.
    pub async fn floor_plan(&self) -> EngineResult<Vec<DiningTable>> {
        Ok(self.db.tables().list().await?)
    }

    // -------------------------------------------------------------------------
    // Cart operations
    // -------------------------------------------------------------------------

    /// Adds one unit of a variant to a context's cart.
    pub async fn add_item(
        &self,
        context: &ContextKey,
        variant_id: &str,
    ) -> EngineResult<SessionLine> {
        self.sessions.add_item(context, variant_id).await
    }

    /// Removes one unit of a variant. When the removal voids a line the
    /// kitchen is already making, the void notice is forwarded to the
    /// dispatcher so the cook sees it.
    pub async fn remove_item(
        &self,
        context: &ContextKey,
        variant_id: &str,
        confirm_void: bool,
    ) -> EngineResult<LineRemoval> {
        let removal = self
            .sessions
            .remove_item(context, variant_id, confirm_void)
            .await?;

        if let LineRemoval::VoidedSent { name, quantity, .. } = &removal {
            self.dispatcher.void_line(context, name, *quantity).await?;
        }

        Ok(removal)
    }

    /// Walks away from a cart without settling it. Releases table
    /// reservations and frees the table; no order is recorded.
    pub async fn abandon_session(&self, context: &ContextKey) -> EngineResult<()> {
        self.sessions.abandon(context).await
    }

    /// Sets the whole-order discount percentage.
    pub async fn set_discount(&self, context: &ContextKey, percentage: u8) -> EngineResult<()> {
        self.sessions.set_discount(context, percentage).await
    }

    /// A display snapshot of a context's cart.
    pub async fn view_session(&self, context: &ContextKey) -> EngineResult<SessionView> {
        self.sessions.view(context).await
    }

    // -------------------------------------------------------------------------
    // Kitchen operations
    // -------------------------------------------------------------------------

    /// Sends a context's unsent lines to the kitchen.
    pub async fn send_to_kitchen(&self, context: &ContextKey) -> EngineResult<KitchenTicket> {
        self.dispatcher.dispatch(context).await
    }

    /// The kitchen display feed.
    pub async fn kitchen_feed(&self) -> EngineResult<Vec<KitchenTicket>> {
        self.dispatcher.active_tickets().await
    }

    /// Kitchen acknowledgement that a ticket is ready.
    pub async fn mark_ticket_ready(&self, ticket_id: &str) -> EngineResult<()> {
        self.dispatcher.acknowledge_ready(ticket_id).await
    }

    /// Cancels an entire pending ticket.
    pub async fn void_ticket(&self, ticket_id: &str) -> EngineResult<()> {
        self.dispatcher.void_ticket(ticket_id).await
    }

    // -------------------------------------------------------------------------
    // Settlement operations
    // -------------------------------------------------------------------------

    /// Freezes a cart for payment; returns the quoted totals.
    pub async fn begin_checkout(&self, context: &ContextKey) -> EngineResult<CheckoutSnapshot> {
        self.settlement.initiate_checkout(context).await
    }

    /// Abandons an initiated checkout.
    pub async fn cancel_checkout(&self, context: &ContextKey) -> EngineResult<()> {
        self.settlement.cancel_checkout(context).await
    }

    /// Confirms payment and records the order.
    pub async fn confirm_payment(
        &self,
        context: &ContextKey,
        method: PaymentMethod,
        tip_cents: i64,
    ) -> EngineResult<Order> {
        self.settlement
            .confirm_payment(context, method, tip_cents)
            .await
    }

    /// Voids a completed order.
    pub async fn void_order(&self, order_id: &str) -> EngineResult<VoidOutcome> {
        self.settlement.void_order(order_id).await
    }

    /// Revenue across completed orders.
    pub async fn completed_revenue(&self) -> EngineResult<Money> {
        self.settlement.completed_revenue().await
    }
}

// =============================================================================
// Integration Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use opentill_core::{CoreError, LineStatus, TicketStatus};

    async fn open_seeded_till() -> Till {
        let till = Till::open(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let variants = [
            ("latte", "Latte", "Large", 350, 0, false),
            ("muffin", "Muffin", "Blueberry", 275, 10, true),
        ];
        for (id, product, option, price, stock, track) in variants {
            till.database()
                .variants()
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
        till.database().tables().create("T1").await.unwrap();
        till
    }

    fn table(n: &str) -> ContextKey {
        ContextKey::Table(n.to_string())
    }

    #[tokio::test]
    async fn test_full_dine_in_service() {
        let till = open_seeded_till().await;
        let ctx = table("T1");

        // First round goes to the kitchen.
        till.add_item(&ctx, "latte").await.unwrap();
        till.add_item(&ctx, "latte").await.unwrap();
        till.add_item(&ctx, "muffin").await.unwrap();
        let ticket = till.send_to_kitchen(&ctx).await.unwrap();
        till.mark_ticket_ready(&ticket.id).await.unwrap();

        let view = till.view_session(&ctx).await.unwrap();
        assert!(view.lines.iter().all(|l| l.status == LineStatus::Ready));

        // Receipt: 975 subtotal, 10% → 98 discount, 100 tip → 977 total.
        till.set_discount(&ctx, 10).await.unwrap();
        let quote = till.begin_checkout(&ctx).await.unwrap();
        assert_eq!(quote.subtotal.cents(), 975);
        assert_eq!(quote.discount.cents(), 98);

        let order = till
            .confirm_payment(&ctx, PaymentMethod::Card, 100)
            .await
            .unwrap();
        assert_eq!(order.total_cents, 977);

        assert_eq!(till.completed_revenue().await.unwrap().cents(), 977);
        assert!(till.view_session(&ctx).await.unwrap().lines.is_empty());
    }

    #[tokio::test]
    async fn test_removing_sent_item_notifies_kitchen() {
        let till = open_seeded_till().await;
        let ctx = table("T1");

        till.add_item(&ctx, "muffin").await.unwrap();
        till.send_to_kitchen(&ctx).await.unwrap();

        // First attempt without confirmation is refused.
        let err = till.remove_item(&ctx, "muffin", false).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::VoidConfirmationRequired { .. })
        ));

        // Confirmed removal voids the line, releases its stock and
        // crosses it out on the kitchen display.
        let removal = till.remove_item(&ctx, "muffin", true).await.unwrap();
        assert!(matches!(removal, LineRemoval::VoidedSent { .. }));

        let variant = till
            .database()
            .variants()
            .get_by_id("muffin")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(variant.stock_quantity, 10);

        let feed = till.kitchen_feed().await.unwrap();
        assert_eq!(feed.len(), 1);
        assert!(feed[0].items.iter().any(|i| i.voided));
    }

    #[tokio::test]
    async fn test_void_order_round_trip() {
        let till = open_seeded_till().await;
        let ctx = ContextKey::QuickService;

        till.add_item(&ctx, "muffin").await.unwrap();
        till.add_item(&ctx, "latte").await.unwrap();
        till.begin_checkout(&ctx).await.unwrap();
        let order = till
            .confirm_payment(&ctx, PaymentMethod::Cash, 0)
            .await
            .unwrap();

        let muffin = till.database().variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(muffin.stock_quantity, 9);

        let outcome = till.void_order(&order.id).await.unwrap();
        assert!(outcome.restock_warnings.is_empty());
        assert_eq!(till.completed_revenue().await.unwrap().cents(), 0);

        // The tracked line is restocked; the untracked line is a no-op.
        let muffin = till.database().variants().get_by_id("muffin").await.unwrap().unwrap();
        assert_eq!(muffin.stock_quantity, 10);
        let latte = till.database().variants().get_by_id("latte").await.unwrap().unwrap();
        assert!(!latte.track_stock);
    }

    #[tokio::test]
    async fn test_cancel_checkout_keeps_everything() {
        let till = open_seeded_till().await;
        let ctx = ContextKey::QuickService;

        till.add_item(&ctx, "latte").await.unwrap();
        till.begin_checkout(&ctx).await.unwrap();
        till.cancel_checkout(&ctx).await.unwrap();

        // Cart intact and editable again.
        till.add_item(&ctx, "latte").await.unwrap();
        let view = till.view_session(&ctx).await.unwrap();
        assert_eq!(view.lines[0].quantity, 2);
        assert!(!view.is_settling);
    }

    #[tokio::test]
    async fn test_kitchen_feed_keeps_dispatch_order() {
        let till = open_seeded_till().await;

        till.add_item(&table("T1"), "latte").await.unwrap();
        till.send_to_kitchen(&table("T1")).await.unwrap();

        till.add_item(&ContextKey::QuickService, "muffin").await.unwrap();
        till.send_to_kitchen(&ContextKey::QuickService).await.unwrap();

        let feed = till.kitchen_feed().await.unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].context_key, table("T1"));
        assert_eq!(feed[1].context_key, ContextKey::QuickService);
        assert!(feed.iter().all(|t| t.status == TicketStatus::Pending));
    }
}
