//! # meridian-ledger: Stock-Consistent Orders and Transfers
//!
//! Orchestration layer of the Meridian back office. Every operation here that
//! touches stock runs as a small saga: apply each stock movement with a
//! conditional statement, and on any failure walk the applied movements back.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Meridian Request Flow                            │
//! │                                                                         │
//! │  HTTP handlers / jobs (not in this workspace)                           │
//! │       │  Backend + ErrorResponse                                        │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 meridian-ledger (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌────────────────┐   ┌────────────────┐   │   │
//! │  │   │ OrderManager │   │TransferManager │   │ config/logging │   │   │
//! │  │   └──────┬───────┘   └───────┬────────┘   └────────────────┘   │   │
//! │  │          │                   │                                  │   │
//! │  │          ▼                   ▼                                  │   │
//! │  │   ┌─────────────────┐  ┌───────────────────┐                   │   │
//! │  │   │ InventoryLedger │  │ SequenceGenerator │                   │   │
//! │  │   └────────┬────────┘  └─────────┬─────────┘                   │   │
//! │  │            └─────────┬───────────┘                              │   │
//! │  │                      ▼                                          │   │
//! │  │             store traits (store.rs)                             │   │
//! │  └──────────────────────┬──────────────────────────────────────────┘   │
//! │                         ▼                                               │
//! │  meridian-db (SQLite)     meridian-core (pricing, numbering, rules)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`inventory`] - Single and batch reserve/release with compensation
//! - [`sequence`] - Per-branch document numbers
//! - [`orders`] - Order create, delete, item removal, customer code
//! - [`transfers`] - Inter-branch transfer approval and rejection
//! - [`store`] - Storage seams, implemented by the meridian-db repositories
//! - [`backend`] - Wires everything from a [`LedgerConfig`]
//! - [`error`] - [`LedgerError`] and the stable codes handlers return
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_ledger::{Backend, LedgerConfig};
//!
//! let config = LedgerConfig::load(None)?;
//! meridian_ledger::logging::init(&config.logging);
//!
//! let backend = Backend::connect(&config).await?;
//! let order = backend.orders().create_order(request, "cashier-1").await?;
//! println!("{}", order.document_number);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backend;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod orders;
pub mod sequence;
pub mod store;
pub mod transfers;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{Backend, Stores};
pub use config::{ConfigError, LedgerConfig};
pub use error::{ErrorCode, ErrorResponse, LedgerError, LedgerResult, Outcome};
pub use inventory::{InventoryLedger, MissingProductPolicy};
pub use orders::OrderManager;
pub use sequence::SequenceGenerator;
pub use store::{
    OrderStore, ProductStore, PromotionStore, ReconciliationStore, SequenceStore, TransferStore,
};
pub use transfers::TransferManager;
