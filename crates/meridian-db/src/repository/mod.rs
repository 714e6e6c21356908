//! # Repository Module
//!
//! One repository per stored entity, each a thin struct over the pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  meridian-ledger store traits          meridian-db repositories        │
//! │                                                                         │
//! │  ProductStore        ◄── impl ──  ProductRepository                    │
//! │  SequenceStore       ◄── impl ──  SequenceRepository                   │
//! │  OrderStore          ◄── impl ──  OrderRepository                      │
//! │  TransferStore       ◄── impl ──  TransferRepository                   │
//! │  PromotionStore      ◄── impl ──  PromotionRepository                  │
//! │  ReconciliationStore ◄── impl ──  ReconciliationRepository             │
//! │                                                                         │
//! │  SQL lives only here. Stock and counters change through single         │
//! │  conditional statements; aggregates (order + items) through one tx.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod order;
pub mod product;
pub mod promotion;
pub mod reconciliation;
pub mod sequence;
pub mod transfer;

pub use order::OrderRepository;
pub use product::ProductRepository;
pub use promotion::PromotionRepository;
pub use reconciliation::ReconciliationRepository;
pub use sequence::SequenceRepository;
pub use transfer::TransferRepository;

/// Generates a new record id (UUID v4).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
