//! # Sequence Generator
//!
//! Allocates document numbers per `(document type, branch)` scope.
//!
//! ```text
//! allocate(ORDER:branch-7)
//!      │
//!      ▼
//! INSERT INTO sequence_counters ... ON CONFLICT DO UPDATE
//!     SET current_value = current_value + 1 RETURNING current_value
//!      │   (one statement: no read-then-write window)
//!      ▼
//! DocumentNumber { value: 42, code: "ORD-branch-7-000042" }
//! ```
//!
//! Values are strictly increasing and never reused. Gaps are allowed: a
//! value allocated for a document that then fails to persist is burned.
//! So is a value whose increment commits after the call has already timed
//! out; the caller sees `StorageUnavailable` and the scope is logged at
//! `warn`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use meridian_core::numbering::NumberFormat;
use meridian_core::validation::validate_identifier;
use meridian_core::{DocumentNumber, DocumentType, ScopeKey};

use crate::error::LedgerResult;
use crate::store::{timed_out, SequenceStore};

pub struct SequenceGenerator {
    store: Arc<dyn SequenceStore>,
    timeout: Duration,
    order_format: NumberFormat,
    transfer_format: NumberFormat,
}

impl SequenceGenerator {
    pub fn new(
        store: Arc<dyn SequenceStore>,
        timeout: Duration,
        order_format: NumberFormat,
        transfer_format: NumberFormat,
    ) -> Self {
        SequenceGenerator {
            store,
            timeout,
            order_format,
            transfer_format,
        }
    }

    fn format_for(&self, document_type: DocumentType) -> &NumberFormat {
        match document_type {
            DocumentType::Order => &self.order_format,
            DocumentType::Transfer => &self.transfer_format,
        }
    }

    /// Allocates the next number of `scope`.
    ///
    /// ## Returns
    /// * `Ok(DocumentNumber)` - value greater than any earlier one in scope
    /// * `Err(Validation)` - empty or malformed branch id
    /// * `Err(StorageUnavailable)` - counter store unreachable or too slow
    pub async fn allocate(&self, scope: &ScopeKey) -> LedgerResult<DocumentNumber> {
        validate_identifier("branch_id", &scope.branch_id)?;

        let key = scope.storage_key();
        let value = match tokio::time::timeout(self.timeout, self.store.next_value(&key)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    scope = %key,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Sequence allocation timed out, value may have been consumed"
                );
                return Err(timed_out("sequence allocation", self.timeout));
            }
        };

        let number = DocumentNumber::new(scope.clone(), value, self.format_for(scope.document_type));
        debug!(scope = %key, value, code = %number.code, "Allocated document number");
        Ok(number)
    }
}
