//! Shared fixtures for ledger tests.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use meridian_core::{Order, OrderDeletion, Product, StockUpdate};
use meridian_db::{Database, DbConfig, OrderRepository, ProductRepository};

use crate::backend::{Backend, Stores};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{OrderStore, ProductStore};

/// Defaults with a short store timeout so stalled calls fail fast.
pub(crate) fn test_config() -> LedgerConfig {
    let mut config = LedgerConfig::default();
    config.store.timeout_ms = 200;
    config
}

pub(crate) async fn memory_backend() -> Backend {
    Backend::in_memory(&test_config()).await.unwrap()
}

/// In-memory backend with some stores replaced.
pub(crate) async fn backend_with_stores(customize: impl FnOnce(&Database, &mut Stores)) -> Backend {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let mut stores = Stores::sqlite(&db);
    customize(&db, &mut stores);
    Backend::assemble(db, stores, &test_config())
}

pub(crate) async fn backend_with_products<P>(wrap: impl FnOnce(ProductRepository) -> P) -> Backend
where
    P: ProductStore + 'static,
{
    backend_with_stores(|db, stores| stores.products = Arc::new(wrap(db.products()))).await
}

/// Removes the database file (and its WAL companions) on drop.
pub(crate) struct TempDb {
    path: PathBuf,
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path.display()));
        }
    }
}

/// File-backed backend with a multi-connection pool, for contention tests.
pub(crate) async fn file_backend() -> (Backend, TempDb) {
    let path = std::env::temp_dir().join(format!("meridian-ledger-{}.db", Uuid::new_v4()));
    let mut config = test_config();
    config.database.path = path.clone();
    config.store.timeout_ms = 10_000;

    let backend = Backend::connect(&config).await.unwrap();
    (backend, TempDb { path })
}

pub(crate) async fn seed_product(backend: &Backend, branch_id: &str, id: &str, stock: i64) -> Product {
    let now = Utc::now();
    let product = Product {
        id: id.to_string(),
        branch_id: branch_id.to_string(),
        code: id.to_uppercase(),
        name: format!("Product {id}"),
        category: None,
        stock_quantity: stock,
        cost_price_cents: 100,
        sale_price_cents: 250,
        tax_rate_bps: 0,
        created_at: now,
        updated_at: now,
    };
    backend.database().products().insert(&product).await.unwrap();
    product
}

pub(crate) async fn stock_of(backend: &Backend, branch_id: &str, id: &str) -> i64 {
    backend
        .database()
        .products()
        .stock_quantity(branch_id, id)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("{id} not stocked at {branch_id}"))
}

/// Product store that fails or hangs for selected products.
pub(crate) struct FlakyProducts {
    inner: ProductRepository,
    failing_increments: HashSet<String>,
    stalling_decrements: HashSet<String>,
}

impl FlakyProducts {
    pub(crate) fn new(inner: ProductRepository) -> Self {
        FlakyProducts {
            inner,
            failing_increments: HashSet::new(),
            stalling_decrements: HashSet::new(),
        }
    }

    /// Increments of these products fail with `StorageUnavailable`.
    pub(crate) fn failing_increments<'a>(mut self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        self.failing_increments
            .extend(ids.into_iter().map(str::to_string));
        self
    }

    /// Decrements of these products never answer.
    pub(crate) fn stalling_decrements<'a>(mut self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        self.stalling_decrements
            .extend(ids.into_iter().map(str::to_string));
        self
    }
}

#[async_trait]
impl ProductStore for FlakyProducts {
    async fn get(&self, branch_id: &str, id: &str) -> LedgerResult<Option<Product>> {
        ProductStore::get(&self.inner, branch_id, id).await
    }

    async fn list_by_branch(&self, branch_id: &str) -> LedgerResult<Vec<Product>> {
        ProductStore::list_by_branch(&self.inner, branch_id).await
    }

    async fn try_decrement_stock(
        &self,
        branch_id: &str,
        id: &str,
        quantity: i64,
    ) -> LedgerResult<StockUpdate> {
        if self.stalling_decrements.contains(id) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        ProductStore::try_decrement_stock(&self.inner, branch_id, id, quantity).await
    }

    async fn increment_stock(&self, branch_id: &str, id: &str, quantity: i64) -> LedgerResult<i64> {
        if self.failing_increments.contains(id) {
            return Err(LedgerError::StorageUnavailable(format!(
                "injected failure incrementing {id}"
            )));
        }
        ProductStore::increment_stock(&self.inner, branch_id, id, quantity).await
    }
}

fn reply_lost() -> LedgerError {
    LedgerError::StorageUnavailable("reply lost".to_string())
}

/// Pauses the first order delete until the test opens it.
pub(crate) struct DeleteGate {
    armed: AtomicBool,
    /// Notified when the paused delete arrives.
    pub(crate) reached: Notify,
    /// Lets the paused delete continue.
    pub(crate) open: Notify,
}

impl Default for DeleteGate {
    fn default() -> Self {
        DeleteGate {
            armed: AtomicBool::new(true),
            reached: Notify::new(),
            open: Notify::new(),
        }
    }
}

/// Order store that commits writes but can lose their replies, fail reads,
/// or hold a delete at a gate.
pub(crate) struct UnreliableOrders {
    inner: OrderRepository,
    lose_insert_reply: bool,
    lose_delete_reply: bool,
    fail_reads: bool,
    gate: Option<Arc<DeleteGate>>,
}

impl UnreliableOrders {
    pub(crate) fn new(inner: OrderRepository) -> Self {
        UnreliableOrders {
            inner,
            lose_insert_reply: false,
            lose_delete_reply: false,
            fail_reads: false,
            gate: None,
        }
    }

    pub(crate) fn losing_insert_reply(mut self) -> Self {
        self.lose_insert_reply = true;
        self
    }

    pub(crate) fn losing_delete_reply(mut self) -> Self {
        self.lose_delete_reply = true;
        self
    }

    pub(crate) fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub(crate) fn gated_delete(mut self, gate: Arc<DeleteGate>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl OrderStore for UnreliableOrders {
    async fn insert(&self, order: &Order) -> LedgerResult<()> {
        OrderStore::insert(&self.inner, order).await?;
        if self.lose_insert_reply {
            return Err(reply_lost());
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> LedgerResult<Option<Order>> {
        if self.fail_reads {
            return Err(LedgerError::StorageUnavailable("read failed".to_string()));
        }
        OrderStore::get(&self.inner, id).await
    }

    async fn delete(&self, id: &str, expected_item_ids: &[String]) -> LedgerResult<OrderDeletion> {
        if let Some(gate) = &self.gate {
            if gate.armed.swap(false, Ordering::SeqCst) {
                gate.reached.notify_one();
                gate.open.notified().await;
            }
        }
        let deletion = OrderStore::delete(&self.inner, id, expected_item_ids).await?;
        if self.lose_delete_reply {
            return Err(reply_lost());
        }
        Ok(deletion)
    }

    async fn remove_item(
        &self,
        order_id: &str,
        item_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<Order> {
        OrderStore::remove_item(&self.inner, order_id, item_id, actor, now).await
    }

    async fn update_customer_code(
        &self,
        id: &str,
        customer_code: Option<&str>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        OrderStore::update_customer_code(&self.inner, id, customer_code, actor, now).await
    }

    async fn list_by_branch(&self, branch_id: &str) -> LedgerResult<Vec<Order>> {
        OrderStore::list_by_branch(&self.inner, branch_id).await
    }

    async fn list_by_customer(&self, customer_code: &str) -> LedgerResult<Vec<Order>> {
        OrderStore::list_by_customer(&self.inner, customer_code).await
    }
}
