//! # opentill-core
//!
//! Pure business logic for the OpenTill point-of-sale system.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      OpenTill Workspace                                 │
//! │                                                                         │
//! │   ┌──────────────────┐                                                  │
//! │   │ opentill-engine  │  orchestration: sessions, tickets, settlement   │
//! │   └────────┬─────────┘                                                  │
//! │            │                                                            │
//! │   ┌────────▼─────────┐   ┌──────────────────┐                          │
//! │   │  opentill-core   │◄──│   opentill-db    │  SQLite persistence      │
//! │   │   (this crate)   │   └──────────────────┘                          │
//! │   └──────────────────┘                                                  │
//! │                                                                         │
//! │   This crate has NO I/O. Everything here is synchronous, deterministic  │
//! │   and testable without a database.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//! - [`money`]: Integer-cents monetary arithmetic
//! - [`types`]: Domain types (variants, lines, tickets, orders, tables)
//! - [`session`]: The per-context cart state machine
//! - [`error`]: The domain error taxonomy

pub mod error;
pub mod money;
pub mod session;
pub mod types;

// Re-export the most commonly used items at the crate root.
pub use error::{CoreError, CoreResult};
pub use money::Money;
pub use session::{
    CartSession, CheckoutSnapshot, LineRemoval, SettlementTotals, MAX_LINE_QUANTITY,
    MAX_SESSION_LINES,
};
pub use types::{
    ContextKey, DiningTable, KitchenTicket, LineStatus, Order, OrderLine, OrderStatus,
    PaymentMethod, SessionLine, StockLevel, TableStatus, TicketLine, TicketStatus, Variant,
};
