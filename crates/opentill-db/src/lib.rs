//! # opentill-db: SQLite Persistence for OpenTill
//!
//! Repositories, connection pool and embedded migrations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        OpenTill Data Flow                               │
//! │                                                                         │
//! │  Engine operation (reserve stock, dispatch ticket, record order)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    opentill-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │   │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │   │                │   │  (embedded)  │   │   │
//! │  │   │               │   │ VariantRepo    │   │              │   │   │
//! │  │   │ SqlitePool    │◄──│ TicketRepo     │   │ 001_init.sql │   │   │
//! │  │   │ WAL + FK on   │   │ OrderRepo ...  │   │              │   │   │
//! │  │   └───────────────┘   └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (or :memory: in tests)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per aggregate

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::order::OrderRepository;
pub use repository::session_line::SessionLineRepository;
pub use repository::table::TableRepository;
pub use repository::ticket::TicketRepository;
pub use repository::variant::{ReserveOutcome, VariantRepository};
