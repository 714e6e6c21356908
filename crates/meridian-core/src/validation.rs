//! # Validation Module
//!
//! Input validation run before any store call.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request shape (handler deserialization)                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Required identifiers (actor, branch, ids)                         │
//! │  ├── Line counts and quantities                                        │
//! │  └── Source / destination branch must differ                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Orchestrator (product existence, needs the store)            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite (CHECK stock_quantity >= 0, foreign keys)             │
//! │                                                                         │
//! │  A failure in layers 1-3 never touches stock.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use meridian_core::validation::{validate_identifier, validate_quantity};
//!
//! validate_identifier("branch_id", "branch-7").unwrap();
//! validate_quantity("items[0].quantity", 5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::{NewOrder, NewTransfer, StockLine};
use crate::{MAX_DOCUMENT_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of identifiers (ids, branch ids, actor ids).
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Maximum length of a customer code.
pub const MAX_CUSTOMER_CODE_LEN: usize = 32;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an identifier such as a branch id, product id or actor.
///
/// ## Rules
/// - Must not be empty or whitespace
/// - At most 64 characters
/// - No whitespace or `:` (the scope key separator)
///
/// ## Example
/// ```rust
/// use meridian_core::validation::validate_identifier;
///
/// assert!(validate_identifier("branch_id", "branch-7").is_ok());
/// assert!(validate_identifier("branch_id", "").is_err());
/// assert!(validate_identifier("branch_id", "ORDER:1").is_err());
/// ```
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_IDENTIFIER_LEN,
        });
    }

    if value.chars().any(|c| c.is_whitespace() || c == ':') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace or ':'".to_string(),
        });
    }

    Ok(())
}

/// Validates and normalizes an optional customer code.
///
/// Blank codes are treated as "no customer". Returns the trimmed code.
pub fn validate_customer_code(code: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };

    if code.len() > MAX_CUSTOMER_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "customer_code".to_string(),
            max: MAX_CUSTOMER_CODE_LEN,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "customer_code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(Some(code.to_string()))
}

/// Validates a record id generated by the ledger (UUID v4 text).
///
/// ## Example
/// ```rust
/// use meridian_core::validation::validate_record_id;
///
/// assert!(validate_record_id("order_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_record_id("order_id", "not-a-uuid").is_err());
/// ```
pub fn validate_record_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(field: &str, qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive(field));
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates the number of lines on a document.
pub fn validate_line_count(field: &str, count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::required(field));
    }

    if count > MAX_DOCUMENT_LINES {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_DOCUMENT_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Document Validators
// =============================================================================

/// Validates stock lines handed to the inventory ledger.
///
/// An empty batch is valid (nothing to do).
pub fn validate_stock_lines(lines: &[StockLine]) -> ValidationResult<()> {
    for (idx, line) in lines.iter().enumerate() {
        validate_identifier(&format!("lines[{idx}].product_id"), &line.product_id)?;
        validate_quantity(&format!("lines[{idx}].quantity"), line.quantity)?;
    }
    Ok(())
}

/// Validates the shape of a new order.
///
/// Product existence is checked later by the order manager, which needs the
/// product store. Returns the normalized customer code.
pub fn validate_new_order(order: &NewOrder) -> ValidationResult<Option<String>> {
    validate_identifier("branch_id", &order.branch_id)?;
    let customer_code = validate_customer_code(order.customer_code.as_deref())?;
    validate_line_count("items", order.items.len())?;

    for (idx, item) in order.items.iter().enumerate() {
        validate_identifier(&format!("items[{idx}].product_id"), &item.product_id)?;
        validate_quantity(&format!("items[{idx}].quantity"), item.quantity)?;
    }

    Ok(customer_code)
}

/// Validates the shape of a new stock transfer.
///
/// ## Example
/// ```rust
/// use meridian_core::types::{NewTransfer, TransferItem};
/// use meridian_core::validation::validate_new_transfer;
///
/// let same_branch = NewTransfer {
///     source_branch_id: "a".to_string(),
///     destination_branch_id: "a".to_string(),
///     items: vec![TransferItem { product_id: "p".to_string(), quantity: 1 }],
/// };
/// assert!(validate_new_transfer(&same_branch).is_err());
/// ```
pub fn validate_new_transfer(transfer: &NewTransfer) -> ValidationResult<()> {
    validate_identifier("source_branch_id", &transfer.source_branch_id)?;
    validate_identifier("destination_branch_id", &transfer.destination_branch_id)?;

    if transfer.source_branch_id == transfer.destination_branch_id {
        return Err(ValidationError::MustDiffer {
            field: "destination_branch_id".to_string(),
            other: "source_branch_id".to_string(),
        });
    }

    validate_line_count("items", transfer.items.len())?;

    for (idx, item) in transfer.items.iter().enumerate() {
        validate_identifier(&format!("items[{idx}].product_id"), &item.product_id)?;
        validate_quantity(&format!("items[{idx}].quantity"), item.quantity)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
