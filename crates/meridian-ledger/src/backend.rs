//! # Backend
//!
//! Composition root: wires the SQLite stores into the orchestrators.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Backend::connect                               │
//! │                                                                         │
//! │  LedgerConfig ──► Database (pool + migrations)                          │
//! │                        │                                                │
//! │                        ▼                                                │
//! │                  Stores (Arc<dyn …Store>)                               │
//! │                        │                                                │
//! │        ┌───────────────┼──────────────────┐                             │
//! │        ▼               ▼                  ▼                             │
//! │  InventoryLedger  SequenceGenerator  (shared by both managers)          │
//! │        │               │                                                │
//! │        └──────┬────────┘                                                │
//! │               ▼                                                         │
//! │     OrderManager   TransferManager                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers hold one `Backend` (or clones of the `Arc`s it hands out). No
//! other in-process state is shared between requests.

use std::sync::Arc;

use tracing::info;

use meridian_db::{Database, DbConfig};

use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::inventory::InventoryLedger;
use crate::orders::OrderManager;
use crate::sequence::SequenceGenerator;
use crate::store::{
    OrderStore, ProductStore, PromotionStore, ReconciliationStore, SequenceStore, TransferStore,
};
use crate::transfers::TransferManager;

/// The store implementations the orchestrators run against.
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn ProductStore>,
    pub sequences: Arc<dyn SequenceStore>,
    pub orders: Arc<dyn OrderStore>,
    pub transfers: Arc<dyn TransferStore>,
    pub promotions: Arc<dyn PromotionStore>,
    pub reconciliation: Arc<dyn ReconciliationStore>,
}

impl Stores {
    /// The SQLite repositories of `db`.
    pub fn sqlite(db: &Database) -> Self {
        Stores {
            products: Arc::new(db.products()),
            sequences: Arc::new(db.sequences()),
            orders: Arc::new(db.orders()),
            transfers: Arc::new(db.transfers()),
            promotions: Arc::new(db.promotions()),
            reconciliation: Arc::new(db.reconciliation()),
        }
    }
}

pub struct Backend {
    database: Database,
    inventory: Arc<InventoryLedger>,
    sequences: Arc<SequenceGenerator>,
    orders: Arc<OrderManager>,
    transfers: Arc<TransferManager>,
}

impl Backend {
    /// Opens the configured database (running migrations) and wires the
    /// orchestrators.
    pub async fn connect(config: &LedgerConfig) -> LedgerResult<Self> {
        let database = Database::new(config.db_config()).await?;
        Ok(Self::with_database(database, config))
    }

    /// Same as [`Backend::connect`] against a private in-memory database.
    pub async fn in_memory(config: &LedgerConfig) -> LedgerResult<Self> {
        let database = Database::new(DbConfig::in_memory()).await?;
        Ok(Self::with_database(database, config))
    }

    pub fn with_database(database: Database, config: &LedgerConfig) -> Self {
        let stores = Stores::sqlite(&database);
        Self::assemble(database, stores, config)
    }

    /// Wires orchestrators over arbitrary stores.
    pub fn assemble(database: Database, stores: Stores, config: &LedgerConfig) -> Self {
        let timeout = config.store_timeout();

        let inventory = Arc::new(InventoryLedger::new(
            Arc::clone(&stores.products),
            Arc::clone(&stores.reconciliation),
            timeout,
        ));

        let sequences = Arc::new(SequenceGenerator::new(
            Arc::clone(&stores.sequences),
            timeout,
            config.order_format(),
            config.transfer_format(),
        ));

        let orders = Arc::new(OrderManager::new(
            Arc::clone(&stores.products),
            Arc::clone(&stores.orders),
            Arc::clone(&stores.promotions),
            Arc::clone(&inventory),
            Arc::clone(&sequences),
            timeout,
            config.promotions.tie_break,
        ));

        let transfers = Arc::new(TransferManager::new(
            Arc::clone(&stores.products),
            Arc::clone(&stores.transfers),
            Arc::clone(&inventory),
            Arc::clone(&sequences),
            timeout,
        ));

        info!(
            store_timeout_ms = timeout.as_millis() as u64,
            tie_break = ?config.promotions.tie_break,
            "Ledger backend ready"
        );

        Backend {
            database,
            inventory,
            sequences,
            orders,
            transfers,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn inventory(&self) -> Arc<InventoryLedger> {
        Arc::clone(&self.inventory)
    }

    pub fn sequences(&self) -> Arc<SequenceGenerator> {
        Arc::clone(&self.sequences)
    }

    pub fn orders(&self) -> Arc<OrderManager> {
        Arc::clone(&self.orders)
    }

    pub fn transfers(&self) -> Arc<TransferManager> {
        Arc::clone(&self.transfers)
    }

    /// Closes the connection pool.
    pub async fn shutdown(&self) {
        self.database.close().await;
    }
}
