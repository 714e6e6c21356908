//! # Ledger Error Type
//!
//! What handlers see when a ledger operation fails.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Ledger                             │
//! │                                                                         │
//! │  ValidationError ──┐                                                   │
//! │  CoreError ────────┼──► LedgerError ──► ErrorResponse (serializable)   │
//! │  DbError ──────────┘        │                 code     SCREAMING_SNAKE │
//! │                             │                 message  human readable  │
//! │                             │                 outcome  see below       │
//! │                             ▼                                          │
//! │  outcome():                                                            │
//! │    NothingApplied    Validation, NotFound, InsufficientStock,          │
//! │                      InvalidTransition                                 │
//! │    Retryable         StorageUnavailable                                │
//! │    PartiallyApplied  ReconciliationRequired (manual follow-up)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A client can always tell "nothing happened" from "should retry" from
//! "partially happened" without parsing messages.

use serde::Serialize;
use thiserror::Error;

use meridian_core::{CoreError, StockMovement, TransferAction, TransferStatus, ValidationError};
use meridian_db::DbError;

/// Failure of a ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Malformed input; rejected before any store call.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced order, item, transfer or product is missing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A reservation found less stock than requested at commit time.
    #[error(
        "Insufficient stock for {product_id} at {branch_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        branch_id: String,
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// Transfer decided twice, or decided from a non-Pending state.
    #[error("Cannot {action} transfer in {status} state")]
    InvalidTransition {
        status: TransferStatus,
        action: TransferAction,
    },

    /// Transient infrastructure failure, including store call timeouts.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Compensation failed after `original`; `movements` are outstanding
    /// and have been written to the reconciliation log.
    #[error(
        "{original}; compensation failed, {} stock movement(s) need reconciliation",
        .movements.len()
    )]
    ReconciliationRequired {
        original: Box<LedgerError>,
        movements: Vec<StockMovement>,
    },
}

impl LedgerError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Result of compensating after `original`: the original error when
    /// every movement was undone, otherwise `ReconciliationRequired`.
    pub fn after_compensation(original: LedgerError, outstanding: Vec<StockMovement>) -> Self {
        if outstanding.is_empty() {
            return original;
        }
        LedgerError::ReconciliationRequired {
            original: Box::new(original),
            movements: outstanding,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::Validation(_) => ErrorCode::ValidationError,
            LedgerError::NotFound { .. } => ErrorCode::NotFound,
            LedgerError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            LedgerError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            LedgerError::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            LedgerError::ReconciliationRequired { .. } => ErrorCode::ReconciliationRequired,
        }
    }

    /// What the failure left behind.
    pub fn outcome(&self) -> Outcome {
        match self {
            LedgerError::StorageUnavailable(_) => Outcome::Retryable,
            LedgerError::ReconciliationRequired { .. } => Outcome::PartiallyApplied,
            _ => Outcome::NothingApplied,
        }
    }

    /// Whether the same call may succeed later without client changes.
    ///
    /// Insufficient stock is retryable once stock has been replenished.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::StorageUnavailable(_) | LedgerError::InsufficientStock { .. }
        )
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { status, action } => {
                LedgerError::InvalidTransition { status, action }
            }
            CoreError::Validation(v) => LedgerError::Validation(v),
        }
    }
}

/// Only `NotFound` keeps its meaning; every other storage failure is
/// reported as unavailable.
impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            other => LedgerError::StorageUnavailable(other.to_string()),
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Handler-facing Representation
// =============================================================================

/// Error codes for responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,

    /// Resource not found (404)
    NotFound,

    /// Not enough stock (409)
    InsufficientStock,

    /// Transfer already decided (409)
    InvalidTransition,

    /// Store unreachable or timed out (503)
    StorageUnavailable,

    /// Partially applied, needs manual reconciliation (500)
    ReconciliationRequired,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::StorageUnavailable => "STORAGE_UNAVAILABLE",
            ErrorCode::ReconciliationRequired => "RECONCILIATION_REQUIRED",
        }
    }
}

/// What a failed call left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    NothingApplied,
    Retryable,
    PartiallyApplied,
}

/// Serializable error body.
///
/// ```json
/// {
///   "code": "INSUFFICIENT_STOCK",
///   "message": "Insufficient stock for p-1 at branch-7: requested 5, available 2",
///   "outcome": "nothing_applied"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    pub outcome: Outcome,
}

impl From<&LedgerError> for ErrorResponse {
    fn from(err: &LedgerError) -> Self {
        ErrorResponse {
            code: err.code(),
            message: err.to_string(),
            outcome: err.outcome(),
        }
    }
}

impl From<LedgerError> for ErrorResponse {
    fn from(err: LedgerError) -> Self {
        ErrorResponse::from(&err)
    }
}
