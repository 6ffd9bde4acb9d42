//! # Repository Module
//!
//! One repository per aggregate, each a thin wrapper over a cloned
//! `SqlitePool` handle.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Responsibilities                          │
//! │                                                                         │
//! │  VariantRepository      catalog rows + the ledger's conditional         │
//! │                         stock updates (the only stock writer)           │
//! │  SessionLineRepository  durable cart rows for table contexts            │
//! │  TicketRepository       kitchen ticket snapshots + status transitions   │
//! │  OrderRepository        settlement records (order + item rows)          │
//! │  TableRepository        floor plan status                               │
//! │                                                                         │
//! │  Repositories execute SQL and map rows. Sequencing, locking and         │
//! │  business rules live in opentill-engine.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod order;
pub mod session_line;
pub mod table;
pub mod ticket;
pub mod variant;
