//! # Store Capabilities
//!
//! One trait per store the orchestrators talk to. The SQLite repositories
//! from `meridian-db` implement them; tests wrap them to inject failures.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  InventoryLedger ──► ProductStore, ReconciliationStore                 │
//! │  SequenceGenerator ► SequenceStore                                     │
//! │  OrderManager ─────► OrderStore, ProductStore, PromotionStore          │
//! │  TransferManager ──► TransferStore, ProductStore                       │
//! │                                                                         │
//! │  Every stock change goes through try_decrement_stock / increment_stock │
//! │  (single-statement conditional updates). There is no stock overwrite.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use meridian_core::{
    Order, OrderDeletion, Product, Promotion, ReconciliationEntry, StockTransfer, StockUpdate,
    TransferStatus,
};
use meridian_db::{
    OrderRepository, ProductRepository, PromotionRepository, ReconciliationRepository,
    SequenceRepository, TransferRepository,
};

use crate::error::{LedgerError, LedgerResult};

/// Error reported when a store call exceeds its limit.
pub(crate) fn timed_out(operation: &str, limit: Duration) -> LedgerError {
    LedgerError::StorageUnavailable(format!(
        "{operation} timed out after {}ms",
        limit.as_millis()
    ))
}

/// Runs a store call under `limit`. A timeout becomes `StorageUnavailable`.
///
/// Only for calls whose effect is harmless to leave unknown (reads,
/// aggregate writes guarded by a transaction). Stock calls go through the
/// inventory ledger, which logs unknown outcomes.
pub(crate) async fn bounded<T>(
    limit: Duration,
    operation: &str,
    call: impl Future<Output = LedgerResult<T>>,
) -> LedgerResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(timed_out(operation, limit)),
    }
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get(&self, branch_id: &str, id: &str) -> LedgerResult<Option<Product>>;

    async fn list_by_branch(&self, branch_id: &str) -> LedgerResult<Vec<Product>>;

    /// Decrements only if at least `quantity` is in stock.
    async fn try_decrement_stock(
        &self,
        branch_id: &str,
        id: &str,
        quantity: i64,
    ) -> LedgerResult<StockUpdate>;

    /// Returns the new level; `NotFound` if the branch does not stock it.
    async fn increment_stock(&self, branch_id: &str, id: &str, quantity: i64) -> LedgerResult<i64>;
}

#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Increments the counter of `scope_key` (creating it at 1) and returns
    /// the new value in one atomic step.
    async fn next_value(&self, scope_key: &str) -> LedgerResult<i64>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order and all of its items in one write.
    async fn insert(&self, order: &Order) -> LedgerResult<()>;

    async fn get(&self, id: &str) -> LedgerResult<Option<Order>>;

    /// Deletes the order and its items only if the items are exactly
    /// `expected_item_ids`; otherwise nothing changes.
    async fn delete(&self, id: &str, expected_item_ids: &[String]) -> LedgerResult<OrderDeletion>;

    /// Removes one item, recomputes totals and returns the updated order.
    async fn remove_item(
        &self,
        order_id: &str,
        item_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<Order>;

    async fn update_customer_code(
        &self,
        id: &str,
        customer_code: Option<&str>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<()>;

    async fn list_by_branch(&self, branch_id: &str) -> LedgerResult<Vec<Order>>;

    async fn list_by_customer(&self, customer_code: &str) -> LedgerResult<Vec<Order>>;
}

#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn insert(&self, transfer: &StockTransfer) -> LedgerResult<()>;

    async fn get(&self, id: &str) -> LedgerResult<Option<StockTransfer>>;

    /// Compare-and-set on the status. `false` means the transfer was not in
    /// `from` (already decided, or missing).
    async fn mark_decided(
        &self,
        id: &str,
        from: TransferStatus,
        to: TransferStatus,
        actor: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<bool>;

    async fn list(
        &self,
        branch_id: &str,
        status: Option<TransferStatus>,
    ) -> LedgerResult<Vec<StockTransfer>>;
}

#[async_trait]
pub trait PromotionStore: Send + Sync {
    async fn list_active(&self, now: DateTime<Utc>) -> LedgerResult<Vec<Promotion>>;
}

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    async fn record(&self, entry: &ReconciliationEntry) -> LedgerResult<()>;
}

// =============================================================================
// SQLite Implementations
// =============================================================================

#[async_trait]
impl ProductStore for ProductRepository {
    async fn get(&self, branch_id: &str, id: &str) -> LedgerResult<Option<Product>> {
        Ok(ProductRepository::get(self, branch_id, id).await?)
    }

    async fn list_by_branch(&self, branch_id: &str) -> LedgerResult<Vec<Product>> {
        Ok(ProductRepository::list_by_branch(self, branch_id).await?)
    }

    async fn try_decrement_stock(
        &self,
        branch_id: &str,
        id: &str,
        quantity: i64,
    ) -> LedgerResult<StockUpdate> {
        Ok(ProductRepository::try_decrement_stock(self, branch_id, id, quantity).await?)
    }

    async fn increment_stock(&self, branch_id: &str, id: &str, quantity: i64) -> LedgerResult<i64> {
        Ok(ProductRepository::increment_stock(self, branch_id, id, quantity).await?)
    }
}

#[async_trait]
impl SequenceStore for SequenceRepository {
    async fn next_value(&self, scope_key: &str) -> LedgerResult<i64> {
        Ok(SequenceRepository::next_value(self, scope_key).await?)
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn insert(&self, order: &Order) -> LedgerResult<()> {
        Ok(OrderRepository::insert(self, order).await?)
    }

    async fn get(&self, id: &str) -> LedgerResult<Option<Order>> {
        Ok(OrderRepository::get(self, id).await?)
    }

    async fn delete(&self, id: &str, expected_item_ids: &[String]) -> LedgerResult<OrderDeletion> {
        Ok(OrderRepository::delete(self, id, expected_item_ids).await?)
    }

    async fn remove_item(
        &self,
        order_id: &str,
        item_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<Order> {
        Ok(OrderRepository::remove_item(self, order_id, item_id, actor, now).await?)
    }

    async fn update_customer_code(
        &self,
        id: &str,
        customer_code: Option<&str>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        Ok(OrderRepository::update_customer_code(self, id, customer_code, actor, now).await?)
    }

    async fn list_by_branch(&self, branch_id: &str) -> LedgerResult<Vec<Order>> {
        Ok(OrderRepository::list_by_branch(self, branch_id).await?)
    }

    async fn list_by_customer(&self, customer_code: &str) -> LedgerResult<Vec<Order>> {
        Ok(OrderRepository::list_by_customer(self, customer_code).await?)
    }
}

#[async_trait]
impl TransferStore for TransferRepository {
    async fn insert(&self, transfer: &StockTransfer) -> LedgerResult<()> {
        Ok(TransferRepository::insert(self, transfer).await?)
    }

    async fn get(&self, id: &str) -> LedgerResult<Option<StockTransfer>> {
        Ok(TransferRepository::get(self, id).await?)
    }

    async fn mark_decided(
        &self,
        id: &str,
        from: TransferStatus,
        to: TransferStatus,
        actor: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        Ok(TransferRepository::mark_decided(self, id, from, to, actor, now).await?)
    }

    async fn list(
        &self,
        branch_id: &str,
        status: Option<TransferStatus>,
    ) -> LedgerResult<Vec<StockTransfer>> {
        Ok(TransferRepository::list(self, branch_id, status).await?)
    }
}

#[async_trait]
impl PromotionStore for PromotionRepository {
    async fn list_active(&self, now: DateTime<Utc>) -> LedgerResult<Vec<Promotion>> {
        Ok(PromotionRepository::list_active(self, now).await?)
    }
}

#[async_trait]
impl ReconciliationStore for ReconciliationRepository {
    async fn record(&self, entry: &ReconciliationEntry) -> LedgerResult<()> {
        Ok(ReconciliationRepository::record(self, entry).await?)
    }
}
