//! # opentill-engine
//!
//! Orchestration layer for OpenTill: the concurrency model, stock
//! ledger, kitchen dispatch, settlement and event bus, assembled behind
//! the [`Till`] façade.
//!
//! ## Component Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        opentill-engine                                  │
//! │                                                                         │
//! │  ┌────────────────┐  per-context carts behind per-context async locks  │
//! │  │ SessionManager │  (table carts durable, quick-service ephemeral)    │
//! │  └───────┬────────┘                                                     │
//! │          │                                                              │
//! │  ┌───────▼────────┐  atomic reserve/release; the only stock writer     │
//! │  │  StockLedger   │                                                     │
//! │  └───────┬────────┘                                                     │
//! │          │                                                              │
//! │  ┌───────▼────────┐  exactly-once tickets, void notices, KDS feed      │
//! │  │TicketDispatcher│                                                     │
//! │  └───────┬────────┘                                                     │
//! │          │                                                              │
//! │  ┌───────▼────────┐  checkout freeze, payment recording, order voids   │
//! │  │SettlementEngine│                                                     │
//! │  └───────┬────────┘                                                     │
//! │          │                                                              │
//! │  ┌───────▼────────┐  broadcast events to displays                      │
//! │  │NotificationBus │                                                     │
//! │  └────────────────┘                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod session;
pub mod settlement;
pub mod till;

pub use bus::{NotificationBus, TillEvent};
pub use dispatch::TicketDispatcher;
pub use error::{EngineError, EngineResult};
pub use ledger::StockLedger;
pub use session::{ReservationPolicy, SessionManager, SessionView};
pub use settlement::{SettlementEngine, VoidOutcome};
pub use till::Till;
