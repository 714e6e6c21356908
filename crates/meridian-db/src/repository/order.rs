//! # Order Repository
//!
//! Orders and their items are written as one aggregate.
//!
//! ## Aggregate Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert(order)                    remove_item(order, item)             │
//! │  ─────────────                    ────────────────────────             │
//! │  BEGIN                            BEGIN                                │
//! │    INSERT orders                    DELETE order_items (one row)       │
//! │    INSERT order_items × N           SELECT remaining items             │
//! │  COMMIT                             UPDATE orders SET totals = Σ items │
//! │                                   COMMIT                               │
//! │                                                                         │
//! │  delete(order, expected items)                                          │
//! │  ─────────────────────────────                                          │
//! │  BEGIN                                                                  │
//! │    DELETE order_items RETURNING id ── set ≠ expected? ROLLBACK, Changed │
//! │    DELETE orders                   ── no row?         ROLLBACK, Missing │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Stock is NOT touched here; the order manager reserves and releases    │
//! │  through the inventory ledger before/after these calls.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::pricing::OrderTotals;
use meridian_core::{Order, OrderDeletion, OrderItem};

const ORDER_COLUMNS: &str = r#"
    SELECT
        id, document_number, sequence_value, branch_id, customer_code,
        subtotal_cents, discount_cents, tax_cents, grand_total_cents,
        status, created_by, created_at, updated_by, updated_at
    FROM orders
"#;

/// Repository for orders and order items.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Inserts an order and all of its items in one transaction.
    pub async fn insert(&self, order: &Order) -> DbResult<()> {
        debug!(
            id = %order.id,
            document_number = %order.document_number,
            items = order.items.len(),
            "Inserting order"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, document_number, sequence_value, branch_id, customer_code,
                subtotal_cents, discount_cents, tax_cents, grand_total_cents,
                status, created_by, created_at, updated_by, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&order.id)
        .bind(&order.document_number)
        .bind(order.sequence_value)
        .bind(&order.branch_id)
        .bind(&order.customer_code)
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(order.tax_cents)
        .bind(order.grand_total_cents)
        .bind(order.status)
        .bind(&order.created_by)
        .bind(order.created_at)
        .bind(&order.updated_by)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, line_no, product_id, product_code, product_name,
                    quantity, unit_price_cents, line_subtotal_cents,
                    discount_cents, tax_cents, line_total_cents,
                    promotion_id, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
            )
            .bind(&item.id)
            .bind(&order.id)
            .bind(item.line_no)
            .bind(&item.product_id)
            .bind(&item.product_code)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.line_subtotal_cents)
            .bind(item.discount_cents)
            .bind(item.tax_cents)
            .bind(item.line_total_cents)
            .bind(&item.promotion_id)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    /// Gets an order with its items (ordered by line number).
    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let Some(mut order) = fetch_order(&self.pool, id).await? else {
            return Ok(None);
        };
        order.items = fetch_items(&self.pool, id).await?;
        Ok(Some(order))
    }

    /// Deletes an order and its items, provided the items are exactly
    /// `expected_item_ids`.
    ///
    /// The item rows are removed first, inside the transaction, so a
    /// concurrent `remove_item` either lands before (and the sets differ) or
    /// waits until this commits (and then finds nothing to remove).
    ///
    /// ## Returns
    /// * `Ok(Deleted)` - order and exactly the expected items removed
    /// * `Ok(Changed)` - item set differs; rolled back, nothing removed
    /// * `Ok(Missing)` - no such order
    pub async fn delete(&self, id: &str, expected_item_ids: &[String]) -> DbResult<OrderDeletion> {
        debug!(id = %id, items = expected_item_ids.len(), "Deleting order");

        let mut tx = self.pool.begin().await?;

        let mut removed: Vec<String> =
            sqlx::query_scalar("DELETE FROM order_items WHERE order_id = ?1 RETURNING id")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let result = sqlx::query("DELETE FROM orders WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(OrderDeletion::Missing);
        }

        let mut expected = expected_item_ids.to_vec();
        expected.sort();
        removed.sort();
        if removed != expected {
            tx.rollback().await?;
            debug!(id = %id, expected = expected.len(), found = removed.len(), "Order items changed, delete rolled back");
            return Ok(OrderDeletion::Changed);
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(OrderDeletion::Deleted)
    }

    /// Removes one item and rewrites the order totals from what remains.
    ///
    /// Removing the last item leaves an empty order with zero totals.
    ///
    /// ## Returns
    /// * `Ok(Order)` - the order after removal, with its remaining items
    /// * `Err(DbError::NotFound)` - no such item on this order
    pub async fn remove_item(
        &self,
        order_id: &str,
        item_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Order> {
        debug!(order_id = %order_id, item_id = %item_id, "Removing order item");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM order_items WHERE id = ?1 AND order_id = ?2")
            .bind(item_id)
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OrderItem", item_id));
        }

        let items = fetch_items(&mut *tx, order_id).await?;
        let totals = OrderTotals::from_items(&items);

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                subtotal_cents = ?2,
                discount_cents = ?3,
                tax_cents = ?4,
                grand_total_cents = ?5,
                updated_by = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(order_id)
        .bind(totals.subtotal.cents())
        .bind(totals.discount.cents())
        .bind(totals.tax.cents())
        .bind(totals.grand_total.cents())
        .bind(actor)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order_id));
        }

        let mut order = fetch_order(&mut *tx, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        order.items = items;
        Ok(order)
    }

    /// Sets or clears the customer code. Totals and items are untouched.
    pub async fn update_customer_code(
        &self,
        id: &str,
        customer_code: Option<&str>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = %id, "Updating order customer code");

        let result = sqlx::query(
            "UPDATE orders SET customer_code = ?2, updated_by = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(id)
        .bind(customer_code)
        .bind(actor)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", id));
        }

        Ok(())
    }

    /// Orders of a branch, oldest first.
    pub async fn list_by_branch(&self, branch_id: &str) -> DbResult<Vec<Order>> {
        let sql = format!("{ORDER_COLUMNS} WHERE branch_id = ?1 ORDER BY created_at, sequence_value");
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(branch_id)
            .fetch_all(&self.pool)
            .await?;

        self.attach_items(orders).await
    }

    /// Orders placed for a customer across all branches, oldest first.
    pub async fn list_by_customer(&self, customer_code: &str) -> DbResult<Vec<Order>> {
        let sql = format!("{ORDER_COLUMNS} WHERE customer_code = ?1 ORDER BY created_at, id");
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(customer_code)
            .fetch_all(&self.pool)
            .await?;

        self.attach_items(orders).await
    }

    async fn attach_items(&self, mut orders: Vec<Order>) -> DbResult<Vec<Order>> {
        for order in &mut orders {
            order.items = fetch_items(&self.pool, &order.id).await?;
        }
        Ok(orders)
    }
}

async fn fetch_order<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> DbResult<Option<Order>> {
    let sql = format!("{ORDER_COLUMNS} WHERE id = ?1");
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(order)
}

async fn fetch_items<'e, E: SqliteExecutor<'e>>(
    executor: E,
    order_id: &str,
) -> DbResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT
            id, order_id, line_no, product_id, product_code, product_name,
            quantity, unit_price_cents, line_subtotal_cents,
            discount_cents, tax_cents, line_total_cents,
            promotion_id, created_at
        FROM order_items
        WHERE order_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(order_id)
    .fetch_all(executor)
    .await?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::generate_id;
    use crate::repository::test_support::memory_db;
    use meridian_core::OrderStatus;

    fn item(order_id: &str, line_no: i64, qty: i64, unit: i64) -> OrderItem {
        OrderItem {
            id: generate_id(),
            order_id: order_id.to_string(),
            line_no,
            product_id: format!("p-{line_no}"),
            product_code: format!("P-{line_no}"),
            product_name: format!("Product {line_no}"),
            quantity: qty,
            unit_price_cents: unit,
            line_subtotal_cents: unit * qty,
            discount_cents: 0,
            tax_cents: 0,
            line_total_cents: unit * qty,
            promotion_id: None,
            created_at: Utc::now(),
        }
    }

    fn order(number: i64, customer: Option<&str>) -> Order {
        let id = generate_id();
        let now = Utc::now();
        let items = vec![item(&id, 1, 2, 500), item(&id, 2, 1, 300)];
        let mut order = Order {
            id,
            document_number: format!("ORD-a-{number:06}"),
            sequence_value: number,
            branch_id: "a".to_string(),
            customer_code: customer.map(str::to_string),
            subtotal_cents: 0,
            discount_cents: 0,
            tax_cents: 0,
            grand_total_cents: 0,
            status: OrderStatus::Open,
            created_by: "clerk".to_string(),
            created_at: now,
            updated_by: "clerk".to_string(),
            updated_at: now,
            items,
        };
        OrderTotals::from_items(&order.items).apply_to(&mut order);
        order
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let db = memory_db().await;
        let repo = db.orders();
        let order = order(1, Some("CUST-1"));
        repo.insert(&order).await.unwrap();

        let loaded = repo.get(&order.id).await.unwrap().unwrap();
        assert_eq!(loaded.document_number, "ORD-a-000001");
        assert_eq!(loaded.grand_total_cents, 1300);
        assert_eq!(loaded.items.len(), 2);
        assert_eq!(loaded.items[0].line_no, 1);
        assert_eq!(loaded.status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn test_duplicate_document_number_rolls_back() {
        let db = memory_db().await;
        let repo = db.orders();
        repo.insert(&order(1, None)).await.unwrap();

        let dup = order(1, None);
        assert!(matches!(
            repo.insert(&dup).await,
            Err(DbError::UniqueViolation { .. })
        ));
        assert!(repo.get(&dup.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_item_recomputes_totals() {
        let db = memory_db().await;
        let repo = db.orders();
        let order = order(1, None);
        repo.insert(&order).await.unwrap();

        let updated = repo
            .remove_item(&order.id, &order.items[0].id, "manager", Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.items.len(), 1);
        assert_eq!(updated.subtotal_cents, 300);
        assert_eq!(updated.grand_total_cents, 300);
        assert_eq!(updated.updated_by, "manager");

        let emptied = repo
            .remove_item(&order.id, &order.items[1].id, "manager", Utc::now())
            .await
            .unwrap();
        assert!(emptied.items.is_empty());
        assert_eq!(emptied.grand_total_cents, 0);
        assert!(repo.get(&order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_unknown_item() {
        let db = memory_db().await;
        let repo = db.orders();
        let order = order(1, None);
        repo.insert(&order).await.unwrap();

        let err = repo
            .remove_item(&order.id, "nope", "manager", Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(repo.get(&order.id).await.unwrap().unwrap().items.len(), 2);
    }

    fn item_ids(order: &Order) -> Vec<String> {
        order.items.iter().map(|item| item.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_delete_removes_order_and_items() {
        let db = memory_db().await;
        let repo = db.orders();
        let order = order(1, None);
        repo.insert(&order).await.unwrap();

        let mut expected = item_ids(&order);
        expected.reverse();
        assert_eq!(repo.delete(&order.id, &expected).await.unwrap(), OrderDeletion::Deleted);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_items")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
        assert!(repo.get(&order.id).await.unwrap().is_none());
        assert_eq!(repo.delete(&order.id, &[]).await.unwrap(), OrderDeletion::Missing);
    }

    #[tokio::test]
    async fn test_delete_refuses_changed_items() {
        let db = memory_db().await;
        let repo = db.orders();
        let order = order(1, None);
        repo.insert(&order).await.unwrap();
        let stale = item_ids(&order);

        repo.remove_item(&order.id, &order.items[0].id, "manager", Utc::now())
            .await
            .unwrap();

        assert_eq!(repo.delete(&order.id, &stale).await.unwrap(), OrderDeletion::Changed);
        let kept = repo.get(&order.id).await.unwrap().unwrap();
        assert_eq!(kept.items.len(), 1);

        let current = item_ids(&kept);
        assert_eq!(repo.delete(&order.id, &current).await.unwrap(), OrderDeletion::Deleted);
    }

    #[tokio::test]
    async fn test_delete_empty_order() {
        let db = memory_db().await;
        let repo = db.orders();
        let order = order(1, None);
        repo.insert(&order).await.unwrap();
        for item in &order.items {
            repo.remove_item(&order.id, &item.id, "manager", Utc::now())
                .await
                .unwrap();
        }

        assert_eq!(repo.delete(&order.id, &[]).await.unwrap(), OrderDeletion::Deleted);
    }

    #[tokio::test]
    async fn test_customer_code_and_lists() {
        let db = memory_db().await;
        let repo = db.orders();
        let first = order(1, Some("CUST-1"));
        let second = order(2, None);
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();

        repo.update_customer_code(&second.id, Some("CUST-1"), "clerk", Utc::now())
            .await
            .unwrap();

        assert_eq!(repo.list_by_branch("a").await.unwrap().len(), 2);
        let for_customer = repo.list_by_customer("CUST-1").await.unwrap();
        assert_eq!(for_customer.len(), 2);
        assert!(for_customer.iter().all(|o| o.items.len() == 2));
        assert!(repo
            .update_customer_code("missing", None, "clerk", Utc::now())
            .await
            .unwrap_err()
            .is_not_found());
    }
}
