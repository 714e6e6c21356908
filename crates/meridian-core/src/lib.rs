//! # meridian-core: Pure Business Logic for the Meridian Ledger
//!
//! Everything in this crate is deterministic and free of I/O. The storage
//! layer (`meridian-db`) and the orchestrators (`meridian-ledger`) build on
//! these types and functions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Meridian Ledger Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           HTTP handlers (external, not in this workspace)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │  meridian-ledger: OrderManager, TransferManager, InventoryLedger│   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ meridian-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌──────────┐ ┌────────┐ │   │
//! │  │   │  types  │ │ pricing │ │promotion │ │numbering │ │transfer│ │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └──────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO CLOCK                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              meridian-db (SQLite repositories)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, Order, StockTransfer, Promotion, ...)
//! - [`money`] - Integer-cent money type
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation run before any store call
//! - [`numbering`] - Sequence scopes and document number formatting
//! - [`pricing`] - Order line pricing and total recomputation
//! - [`promotion`] - Best-single-discount promotion evaluator
//! - [`transfer`] - Stock transfer state machine
//!
//! ## Example Usage
//!
//! ```rust
//! use meridian_core::money::Money;
//! use meridian_core::types::TaxRate;
//!
//! let price = Money::from_cents(1099);
//! let tax = price.calculate_tax(TaxRate::from_bps(825));
//! assert_eq!(tax.cents(), 91);
//! ```

pub mod error;
pub mod money;
pub mod numbering;
pub mod pricing;
pub mod promotion;
pub mod transfer;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use numbering::{DocumentNumber, DocumentType, ScopeKey};
pub use types::*;

/// Maximum number of lines accepted on a single order or transfer.
pub const MAX_DOCUMENT_LINES: usize = 200;

/// Maximum quantity of a single line.
///
/// Guards against typing 1000 instead of 10 at the counter.
pub const MAX_LINE_QUANTITY: i64 = 99_999;
