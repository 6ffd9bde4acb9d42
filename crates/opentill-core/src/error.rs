//! # Error Types
//!
//! Domain-specific error types for opentill-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  opentill-core errors (this file)                                      │
//! │  └── CoreError        - Business rule / state machine violations       │
//! │                                                                         │
//! │  opentill-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  opentill-engine errors (service crate)                                │
//! │  └── EngineError      - CoreError | DbError, what callers see          │
//! │                                                                         │
//! │  Flow: CoreError ──┐                                                   │
//! │        DbError  ───┴──► EngineError ──► caller / UI messaging          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Every failure identifies the offending variant/line/ticket/order
//! 3. Errors are enum variants, never String
//! 4. Business rule violations are never silently downgraded

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or state machine
/// failures. They are surfaced to the caller for UI messaging and are
/// never retried automatically (except `PaymentRecordingFailed`, where
/// the whole `confirm_payment` call is safe to retry).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Variant cannot be found (unknown id or soft-deleted).
    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    /// Kitchen ticket cannot be found.
    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    /// Order cannot be found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// The session has no line for the requested variant.
    #[error("No line for variant {0} in this session")]
    LineNotFound(String),

    /// Insufficient stock to satisfy a reservation.
    ///
    /// ## When This Occurs
    /// - Advisory check at add time (quick-service sessions)
    /// - Immediate reservation at add time (table sessions)
    /// - Authoritative reservation at settlement (quick-service sessions)
    ///
    /// Reservation is all-or-nothing: the ledger never leaves a partial
    /// reservation behind when this is returned.
    #[error("Insufficient stock for {name}: available {available}, requested {requested}")]
    InsufficientStock {
        name: String,
        available: i64,
        requested: i64,
    },

    /// A status transition that the state machine forbids.
    ///
    /// ## When This Occurs
    /// - Completing an already-completed ticket
    /// - Voiding an already-voided order
    /// - Confirming payment on a session that never initiated checkout
    #[error("{entity} cannot transition from {from} to {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// Checkout was initiated on a session with no lines.
    #[error("Cannot check out an empty session")]
    EmptyCart,

    /// Dispatch was requested but every line has already been sent.
    #[error("No draft lines to send to the kitchen")]
    NothingToSend,

    /// Removing a line the kitchen is already preparing requires an
    /// explicit void confirmation — it is never silently deleted.
    #[error("Removing sent line '{name}' requires void confirmation")]
    VoidConfirmationRequired { name: String },

    /// A cart mutation arrived while a payment step is pending.
    #[error("Session is settling; cancel or confirm payment first")]
    SettlementInProgress,

    /// The order record could not be persisted during settlement.
    /// The cart is left untouched; the whole call is safe to retry.
    #[error("Payment could not be recorded: {0}")]
    PaymentRecordingFailed(String),

    /// Session has exceeded the maximum allowed number of lines.
    #[error("Session cannot have more than {max} lines")]
    SessionTooLarge { max: usize },

    /// Line quantity exceeds the maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Discount percentage outside 0-100.
    #[error("Discount percentage {requested} is out of range (0-100)")]
    InvalidDiscount { requested: u8 },

    /// Tip must be zero or positive.
    #[error("Tip amount {tip_cents} must not be negative")]
    InvalidTip { tip_cents: i64 },
}

impl CoreError {
    /// Creates an InvalidTransition error.
    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        CoreError::InvalidTransition {
            entity: entity.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            name: "Latte (Large)".to_string(),
            available: 1,
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Latte (Large): available 1, requested 2"
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = CoreError::invalid_transition("Ticket", "completed", "completed");
        assert_eq!(
            err.to_string(),
            "Ticket cannot transition from completed to completed"
        );
    }
}
