//! # Engine Error Types
//!
//! The error type callers of the engine actually see: the domain
//! taxonomy from opentill-core merged with storage failures from
//! opentill-db.

use thiserror::Error;

use opentill_core::CoreError;
use opentill_db::DbError;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule or state machine violation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A storage failure.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl EngineError {
    /// Borrow the domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            EngineError::Core(e) => Some(e),
            EngineError::Db(_) => None,
        }
    }

    /// True when this error means "try again with the same arguments".
    pub fn is_retryable_payment_failure(&self) -> bool {
        matches!(
            self,
            EngineError::Core(CoreError::PaymentRecordingFailed(_))
                | EngineError::Db(DbError::PoolExhausted)
        )
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
