//! # Product Repository
//!
//! Catalog reads plus the two atomic stock primitives.
//!
//! ## Stock Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Update Strategy                                │
//! │                                                                         │
//! │  ❌ WRONG: read, check, write (two clerks both see 10, both sell 8)    │
//! │     SELECT stock_quantity ...        → 10                              │
//! │     UPDATE products SET stock_quantity = 2                             │
//! │                                                                         │
//! │  ✅ CORRECT: one conditional statement                                 │
//! │     UPDATE products                                                    │
//! │        SET stock_quantity = stock_quantity - 8                         │
//! │      WHERE branch_id = ? AND id = ? AND stock_quantity >= 8            │
//! │     RETURNING stock_quantity                                           │
//! │                                                                         │
//! │  The check happens at commit time; the second clerk gets no row back.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is deliberately no method that overwrites `stock_quantity`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{Product, StockUpdate};

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product as stocked by one branch.
    pub async fn get(&self, branch_id: &str, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, branch_id, code, name, category, stock_quantity,
                cost_price_cents, sale_price_cents, tax_rate_bps,
                created_at, updated_at
            FROM products
            WHERE branch_id = ?1 AND id = ?2
            "#,
        )
        .bind(branch_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists every product of a branch, by code.
    pub async fn list_by_branch(&self, branch_id: &str) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, branch_id, code, name, category, stock_quantity,
                cost_price_cents, sale_price_cents, tax_rate_bps,
                created_at, updated_at
            FROM products
            WHERE branch_id = ?1
            ORDER BY code
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(branch_id = %branch_id, count = products.len(), "Listed products");
        Ok(products)
    }

    /// Inserts a catalog row (seeding and tests; catalog CRUD is external).
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - id or code already used in the branch
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(branch_id = %product.branch_id, code = %product.code, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, branch_id, code, name, category, stock_quantity,
                cost_price_cents, sale_price_cents, tax_rate_bps,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.branch_id)
        .bind(&product.code)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.stock_quantity)
        .bind(product.cost_price_cents)
        .bind(product.sale_price_cents)
        .bind(product.tax_rate_bps)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes a product from a branch catalog.
    pub async fn delete(&self, branch_id: &str, id: &str) -> DbResult<()> {
        debug!(branch_id = %branch_id, id = %id, "Deleting product");

        let result = sqlx::query("DELETE FROM products WHERE branch_id = ?1 AND id = ?2")
            .bind(branch_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Current stock, or `None` if the product is not stocked by the branch.
    pub async fn stock_quantity(&self, branch_id: &str, id: &str) -> DbResult<Option<i64>> {
        let stock = sqlx::query_scalar::<_, i64>(
            "SELECT stock_quantity FROM products WHERE branch_id = ?1 AND id = ?2",
        )
        .bind(branch_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stock)
    }

    /// Decrements stock by `quantity` only if at least that much is available.
    ///
    /// Check and decrement are one statement. When no row is updated, a
    /// follow-up read distinguishes "too little stock" from "no such
    /// product"; the reported `available` is informational only.
    pub async fn try_decrement_stock(
        &self,
        branch_id: &str,
        id: &str,
        quantity: i64,
    ) -> DbResult<StockUpdate> {
        debug!(branch_id = %branch_id, id = %id, quantity, "Reserving stock");

        let new_quantity = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE products
            SET
                stock_quantity = stock_quantity - ?3,
                updated_at = ?4
            WHERE branch_id = ?1 AND id = ?2 AND stock_quantity >= ?3
            RETURNING stock_quantity
            "#,
        )
        .bind(branch_id)
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(new_quantity) = new_quantity {
            return Ok(StockUpdate::Applied { new_quantity });
        }

        Ok(match self.stock_quantity(branch_id, id).await? {
            Some(available) => StockUpdate::Insufficient { available },
            None => StockUpdate::Missing,
        })
    }

    /// Increments stock by `quantity` and returns the new level.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - product not stocked by the branch
    pub async fn increment_stock(&self, branch_id: &str, id: &str, quantity: i64) -> DbResult<i64> {
        debug!(branch_id = %branch_id, id = %id, quantity, "Releasing stock");

        let new_quantity = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE products
            SET
                stock_quantity = stock_quantity + ?3,
                updated_at = ?4
            WHERE branch_id = ?1 AND id = ?2
            RETURNING stock_quantity
            "#,
        )
        .bind(branch_id)
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        new_quantity.ok_or_else(|| DbError::not_found("Product", id))
    }
}
