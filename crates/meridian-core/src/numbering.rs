//! # Document Numbering
//!
//! Scope keys partition the sequence counters; this module only names
//! scopes and renders allocated values. Allocation itself lives in
//! `meridian-ledger::sequence`, on top of an atomic counter store.
//!
//! ```text
//!   ScopeKey { Order, "branch-7" }  ──►  "ORDER:branch-7"   (counter row)
//!                                            │
//!                          allocate() → 42   │
//!                                            ▼
//!   NumberFormat { "ORD", 6 }       ──►  "ORD-branch-7-000042"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of document that consumes sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Order,
    Transfer,
}

impl DocumentType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Order => "ORDER",
            DocumentType::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one sequence counter: document type plus branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub document_type: DocumentType,
    pub branch_id: String,
}

impl ScopeKey {
    pub fn new(document_type: DocumentType, branch_id: impl Into<String>) -> Self {
        ScopeKey {
            document_type,
            branch_id: branch_id.into(),
        }
    }

    /// Scope for orders taken at a branch.
    pub fn order(branch_id: impl Into<String>) -> Self {
        Self::new(DocumentType::Order, branch_id)
    }

    /// Scope for transfers leaving a branch.
    pub fn transfer(source_branch_id: impl Into<String>) -> Self {
        Self::new(DocumentType::Transfer, source_branch_id)
    }

    /// Storage key of the counter row, e.g. `ORDER:branch-7`.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document_type, self.branch_id)
    }
}

/// Prefix and zero-padding used to render a document code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    pub prefix: String,
    pub width: usize,
}

impl NumberFormat {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        NumberFormat {
            prefix: prefix.into(),
            width,
        }
    }

    /// Renders `<prefix>-<branch>-<value>`.
    ///
    /// ```rust
    /// use meridian_core::numbering::{NumberFormat, ScopeKey};
    ///
    /// let format = NumberFormat::new("ORD", 6);
    /// assert_eq!(format.render(&ScopeKey::order("branch-7"), 42), "ORD-branch-7-000042");
    /// ```
    pub fn render(&self, scope: &ScopeKey, value: i64) -> String {
        format!(
            "{}-{}-{:0width$}",
            self.prefix,
            scope.branch_id,
            value,
            width = self.width
        )
    }
}

impl Default for NumberFormat {
    fn default() -> Self {
        NumberFormat::new("DOC", 6)
    }
}

/// An allocated document number.
///
/// `value` is the durable counter state; `code` is for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNumber {
    pub scope: ScopeKey,
    pub value: i64,
    pub code: String,
}

impl DocumentNumber {
    pub fn new(scope: ScopeKey, value: i64, format: &NumberFormat) -> Self {
        let code = format.render(&scope, value);
        DocumentNumber { scope, value, code }
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_key_format() {
        assert_eq!(ScopeKey::order("branch-7").to_string(), "ORDER:branch-7");
        assert_eq!(ScopeKey::transfer("a").storage_key(), "TRANSFER:a");
    }

    #[test]
    fn test_scopes_are_distinct() {
        assert_ne!(ScopeKey::order("a"), ScopeKey::transfer("a"));
        assert_ne!(ScopeKey::order("a"), ScopeKey::order("b"));
    }

    #[test]
    fn test_render_overflows_width() {
        let format = NumberFormat::new("TRF", 3);
        let number = DocumentNumber::new(ScopeKey::transfer("x"), 12345, &format);
        assert_eq!(number.code, "TRF-x-12345");
        assert_eq!(number.to_string(), "TRF-x-12345");
        assert_eq!(number.value, 12345);
    }
}
