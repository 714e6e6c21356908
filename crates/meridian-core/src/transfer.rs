//! # Stock Transfer State Machine
//!
//! ```text
//!   Pending ──approve──► Approved   (terminal)
//!      │
//!      └─────reject────► Rejected   (terminal)
//! ```
//!
//! Only the transition table lives here. Stock movement and the
//! compare-and-set on the stored status are done by the transfer manager.

use crate::error::{CoreError, CoreResult};
use crate::types::{TransferAction, TransferStatus};

/// Status reached by applying `action` to a transfer in `status`.
///
/// ```rust
/// use meridian_core::transfer::next_status;
/// use meridian_core::types::{TransferAction, TransferStatus};
///
/// assert_eq!(
///     next_status(TransferStatus::Pending, TransferAction::Approve).unwrap(),
///     TransferStatus::Approved
/// );
/// assert!(next_status(TransferStatus::Rejected, TransferAction::Approve).is_err());
/// ```
pub fn next_status(status: TransferStatus, action: TransferAction) -> CoreResult<TransferStatus> {
    match (status, action) {
        (TransferStatus::Pending, TransferAction::Approve) => Ok(TransferStatus::Approved),
        (TransferStatus::Pending, TransferAction::Reject) => Ok(TransferStatus::Rejected),
        (status, action) => Err(CoreError::InvalidTransition { status, action }),
    }
}

/// Fails unless `action` is allowed from `status`.
pub fn ensure_can(status: TransferStatus, action: TransferAction) -> CoreResult<()> {
    next_status(status, action).map(|_| ())
}
