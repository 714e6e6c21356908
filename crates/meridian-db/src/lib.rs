//! # meridian-db: SQLite Storage for the Meridian Ledger
//!
//! Pool management, embedded migrations and one repository per stored
//! entity. Built on sqlx with runtime-checked queries.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Meridian Data Flow                               │
//! │                                                                         │
//! │  OrderManager / TransferManager / InventoryLedger (meridian-ledger)    │
//! │       │  via store traits                                               │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   meridian-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ ProductRepo    │   │              │   │   │
//! │  │   │ SqlitePool    │◄───│ SequenceRepo   │   │ 001_initial_ │   │   │
//! │  │   │ WAL, FKs      │    │ OrderRepo      │   │   schema.sql │   │   │
//! │  │   │               │    │ TransferRepo   │   │              │   │   │
//! │  │   │               │    │ PromotionRepo  │   │              │   │   │
//! │  │   │               │    │ Reconciliation │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (shared by every ledger process)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let value = db.sequences().next_value("ORDER:branch-7").await?;
//! ```

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

pub use repository::{
    generate_id, OrderRepository, ProductRepository, PromotionRepository,
    ReconciliationRepository, SequenceRepository, TransferRepository,
};
