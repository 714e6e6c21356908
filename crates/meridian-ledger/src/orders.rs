//! # Order Lifecycle Manager
//!
//! Creates and removes orders while keeping product stock in step.
//!
//! ## Create Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_order(NewOrder, actor)                                          │
//! │                                                                         │
//! │  1. validate shape ─────────────── Validation  (nothing touched)        │
//! │  2. load products in branch ────── Validation  (unknown product)        │
//! │  3. price lines + promotions                                            │
//! │  4. reserve_batch ──────────────── InsufficientStock (no number used)   │
//! │  5. allocate ORDER:<branch> ─┐                                          │
//! │  6. insert order + items ────┴──── on failure: undo reservation,        │
//! │                                    then surface the error               │
//! │                                                                         │
//! │  An insert whose outcome cannot be read back is neither kept nor        │
//! │  undone: its lines go to the reconciliation log and the caller gets     │
//! │  ReconciliationRequired.                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! States: Draft (never stored) → Open → Deleted. Deleting the last item
//! leaves an empty Open order in place.

use std::slice;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use meridian_core::pricing::{price_lines, OrderTotals, PricedLine};
use meridian_core::promotion::TieBreak;
use meridian_core::validation::{
    validate_customer_code, validate_identifier, validate_new_order, validate_record_id,
};
use meridian_core::{
    DocumentNumber, NewOrder, Order, OrderDeletion, OrderItem, OrderLineRequest, OrderStatus,
    Product, ScopeKey, StockLine, ValidationError,
};

use crate::error::{LedgerError, LedgerResult};
use crate::inventory::{Correction, InventoryLedger, MissingProductPolicy};
use crate::sequence::SequenceGenerator;
use crate::store::{bounded, OrderStore, ProductStore, PromotionStore};

/// Passes `delete_order` makes before giving up on an order whose items
/// keep changing.
const DELETE_ATTEMPTS: u32 = 3;

pub struct OrderManager {
    products: Arc<dyn ProductStore>,
    orders: Arc<dyn OrderStore>,
    promotions: Arc<dyn PromotionStore>,
    inventory: Arc<InventoryLedger>,
    sequences: Arc<SequenceGenerator>,
    timeout: Duration,
    tie_break: TieBreak,
}

impl OrderManager {
    pub fn new(
        products: Arc<dyn ProductStore>,
        orders: Arc<dyn OrderStore>,
        promotions: Arc<dyn PromotionStore>,
        inventory: Arc<InventoryLedger>,
        sequences: Arc<SequenceGenerator>,
        timeout: Duration,
        tie_break: TieBreak,
    ) -> Self {
        OrderManager {
            products,
            orders,
            promotions,
            inventory,
            sequences,
            timeout,
            tie_break,
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Creates an order, reserving stock for every line.
    ///
    /// ## Returns
    /// * `Ok(Order)` - persisted, numbered, stock reserved
    /// * `Err(Validation)` - malformed input or unknown product
    /// * `Err(InsufficientStock)` - no stock changed, no number consumed
    /// * `Err(ReconciliationRequired)` - persisting failed and the
    ///   reservation could not be fully undone
    pub async fn create_order(&self, request: NewOrder, actor: &str) -> LedgerResult<Order> {
        validate_identifier("actor", actor)?;
        let customer_code = validate_new_order(&request)?;
        let branch_id = request.branch_id.as_str();
        let now = Utc::now();

        let products = self.load_products(branch_id, &request.items).await?;
        let promotions = bounded(
            self.timeout,
            "promotion lookup",
            self.promotions.list_active(now),
        )
        .await?;

        let requested: Vec<(&Product, i64)> = products
            .iter()
            .zip(&request.items)
            .map(|(product, item)| (product, item.quantity))
            .collect();
        let priced = price_lines(&requested, &promotions, now, self.tie_break);

        let lines: Vec<StockLine> = request
            .items
            .iter()
            .map(|item| StockLine::new(item.product_id.clone(), item.quantity))
            .collect();

        let order_id = Uuid::new_v4().to_string();
        self.inventory
            .reserve_batch(branch_id, &lines, &order_id)
            .await?;

        let number = match self.sequences.allocate(&ScopeKey::order(branch_id)).await {
            Ok(number) => number,
            Err(err) => return Err(self.abandon(branch_id, &lines, &order_id, err).await),
        };

        let order = build_order(order_id, number, branch_id, customer_code, &priced, actor, now);

        if let Err(err) = bounded(self.timeout, "order insert", self.orders.insert(&order)).await {
            match bounded(self.timeout, "order lookup", self.orders.get(&order.id)).await {
                Ok(Some(_)) => {
                    warn!(order_id = %order.id, error = %err, "Order insert reported failure but the order exists");
                }
                Ok(None) => return Err(self.abandon(branch_id, &lines, &order.id, err).await),
                Err(lookup) => {
                    warn!(order_id = %order.id, error = %err, lookup_error = %lookup, "Order insert outcome unknown");
                    let movements = self
                        .inventory
                        .flag_unconfirmed(
                            branch_id,
                            &lines,
                            Correction::Restock,
                            &order.id,
                            "order insert unconfirmed; release only if the order was not stored",
                        )
                        .await;
                    return Err(LedgerError::after_compensation(err, movements));
                }
            }
        }

        info!(
            order_id = %order.id,
            document_number = %order.document_number,
            branch_id = %order.branch_id,
            items = order.items.len(),
            grand_total = %order.grand_total(),
            "Order created"
        );
        Ok(order)
    }

    /// Deletes an order and returns its stock.
    ///
    /// Lines whose product has left the catalog are skipped and logged for
    /// reconciliation. The returned snapshot carries status `Deleted`.
    ///
    /// The delete only commits if the order still holds exactly the items
    /// that were released. If an item was removed in between, the release
    /// is undone and the delete starts over from a fresh read.
    pub async fn delete_order(&self, order_id: &str, actor: &str) -> LedgerResult<Order> {
        validate_record_id("order_id", order_id)?;
        validate_identifier("actor", actor)?;

        for attempt in 1..=DELETE_ATTEMPTS {
            if let Some(mut order) = self.try_delete_order(order_id).await? {
                order.status = OrderStatus::Deleted;
                order.updated_by = actor.to_string();
                order.updated_at = Utc::now();

                info!(
                    order_id = %order.id,
                    document_number = %order.document_number,
                    attempt,
                    "Order deleted"
                );
                return Ok(order);
            }
            debug!(order_id = %order_id, attempt, "Order changed during delete, retrying");
        }

        Err(LedgerError::StorageUnavailable(format!(
            "order {order_id} kept changing during delete"
        )))
    }

    /// Removes one line, returns its stock and recomputes the totals.
    pub async fn delete_order_item(
        &self,
        order_id: &str,
        item_id: &str,
        actor: &str,
    ) -> LedgerResult<Order> {
        validate_record_id("order_id", order_id)?;
        validate_record_id("item_id", item_id)?;
        validate_identifier("actor", actor)?;

        let order = self.get_order(order_id).await?;
        let line = order
            .items
            .iter()
            .find(|item| item.id == item_id)
            .map(OrderItem::stock_line)
            .ok_or_else(|| LedgerError::not_found("OrderItem", item_id))?;

        let skipped = self
            .inventory
            .release_batch(
                &order.branch_id,
                slice::from_ref(&line),
                MissingProductPolicy::Skip,
                &order.id,
            )
            .await?;
        let released: &[StockLine] = if skipped.is_empty() {
            slice::from_ref(&line)
        } else {
            &[]
        };

        let removal = self.orders.remove_item(order_id, item_id, actor, Utc::now());
        let err = match bounded(self.timeout, "order item removal", removal).await {
            Ok(updated) => return Ok(item_removed(updated, item_id)),
            Err(err) => err,
        };

        if !matches!(err, LedgerError::NotFound { .. }) {
            // The removal may have committed before the error surfaced.
            match bounded(self.timeout, "order lookup", self.orders.get(order_id)).await {
                Ok(Some(current)) if !current.items.iter().any(|item| item.id == item_id) => {
                    warn!(order_id = %order_id, item_id = %item_id, error = %err, "Item removal reported failure but was recorded");
                    return Ok(item_removed(current, item_id));
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => {
                    let movements = self
                        .inventory
                        .flag_unconfirmed(
                            &order.branch_id,
                            released,
                            Correction::Withdraw,
                            &order.id,
                            "order item removal unconfirmed; take back only if the item is still on the order",
                        )
                        .await;
                    return Err(LedgerError::after_compensation(err, movements));
                }
            }
        }

        warn!(order_id = %order_id, item_id = %item_id, error = %err, "Item removal failed, taking released stock back");
        let outstanding = self
            .inventory
            .undo_release(&order.branch_id, released, &order.id)
            .await;
        Err(LedgerError::after_compensation(err, outstanding))
    }

    /// Sets or clears the customer code. Stock and totals are untouched.
    pub async fn update_customer_code(
        &self,
        order_id: &str,
        customer_code: Option<&str>,
        actor: &str,
    ) -> LedgerResult<Order> {
        validate_record_id("order_id", order_id)?;
        validate_identifier("actor", actor)?;
        let customer_code = validate_customer_code(customer_code)?;

        let update = self.orders.update_customer_code(
            order_id,
            customer_code.as_deref(),
            actor,
            Utc::now(),
        );
        bounded(self.timeout, "customer code update", update).await?;

        self.get_order(order_id).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_order(&self, order_id: &str) -> LedgerResult<Order> {
        validate_record_id("order_id", order_id)?;

        bounded(self.timeout, "order lookup", self.orders.get(order_id))
            .await?
            .ok_or_else(|| LedgerError::not_found("Order", order_id))
    }

    pub async fn list_orders_by_branch(&self, branch_id: &str) -> LedgerResult<Vec<Order>> {
        validate_identifier("branch_id", branch_id)?;
        bounded(self.timeout, "order listing", self.orders.list_by_branch(branch_id)).await
    }

    pub async fn list_orders_by_customer(&self, customer_code: &str) -> LedgerResult<Vec<Order>> {
        let customer_code = validate_customer_code(Some(customer_code))?
            .ok_or_else(|| ValidationError::required("customer_code"))?;
        bounded(
            self.timeout,
            "order listing",
            self.orders.list_by_customer(&customer_code),
        )
        .await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load_products(
        &self,
        branch_id: &str,
        items: &[OrderLineRequest],
    ) -> LedgerResult<Vec<Product>> {
        let mut products = Vec::with_capacity(items.len());

        for (idx, item) in items.iter().enumerate() {
            let lookup = self.products.get(branch_id, &item.product_id);
            let product = bounded(self.timeout, "product lookup", lookup)
                .await?
                .ok_or_else(|| ValidationError::UnknownReference {
                    field: format!("items[{idx}].product_id"),
                    entity: "Product".to_string(),
                    id: item.product_id.clone(),
                })?;
            products.push(product);
        }

        Ok(products)
    }

    /// Undoes a reservation after a later step failed.
    async fn abandon(
        &self,
        branch_id: &str,
        lines: &[StockLine],
        document_ref: &str,
        original: LedgerError,
    ) -> LedgerError {
        warn!(
            branch_id = %branch_id,
            document_ref = %document_ref,
            error = %original,
            "Order creation failed after reserving stock, releasing"
        );
        let outstanding = self
            .inventory
            .undo_reservation(branch_id, lines, document_ref)
            .await;
        LedgerError::after_compensation(original, outstanding)
    }

    /// One release-then-delete pass. `Ok(None)` means the items changed
    /// underneath and the release was undone; the caller starts over.
    async fn try_delete_order(&self, order_id: &str) -> LedgerResult<Option<Order>> {
        let order = self.get_order(order_id).await?;
        let lines = order.stock_lines();
        let item_ids: Vec<String> = order.items.iter().map(|item| item.id.clone()).collect();

        let skipped = self
            .inventory
            .release_batch(&order.branch_id, &lines, MissingProductPolicy::Skip, &order.id)
            .await?;
        let released: Vec<StockLine> = lines
            .into_iter()
            .filter(|line| !skipped.iter().any(|s| s.product_id == line.product_id))
            .collect();

        let deletion = self.orders.delete(order_id, &item_ids);
        let original = match bounded(self.timeout, "order delete", deletion).await {
            Ok(OrderDeletion::Deleted) => {
                if !skipped.is_empty() {
                    info!(order_id = %order_id, skipped = skipped.len(), "Order deleted with lines left for reconciliation");
                }
                return Ok(Some(order));
            }
            Ok(OrderDeletion::Changed) => None,
            Ok(OrderDeletion::Missing) => Some(LedgerError::not_found("Order", order_id)),
            Err(err) => {
                // The delete may have committed before the error surfaced.
                match bounded(self.timeout, "order lookup", self.orders.get(order_id)).await {
                    Ok(None) => {
                        warn!(order_id = %order_id, error = %err, "Order delete reported failure but was recorded");
                        return Ok(Some(order));
                    }
                    Ok(Some(_)) => Some(err),
                    Err(lookup) => {
                        warn!(order_id = %order_id, error = %err, lookup_error = %lookup, "Order delete outcome unknown");
                        let movements = self
                            .inventory
                            .flag_unconfirmed(
                                &order.branch_id,
                                &released,
                                Correction::Withdraw,
                                &order.id,
                                "order delete unconfirmed; take back only if the order still exists",
                            )
                            .await;
                        return Err(LedgerError::after_compensation(err, movements));
                    }
                }
            }
        };

        let outstanding = self
            .inventory
            .undo_release(&order.branch_id, &released, &order.id)
            .await;
        match original {
            Some(err) => {
                warn!(order_id = %order_id, error = %err, "Order delete failed, taking released stock back");
                Err(LedgerError::after_compensation(err, outstanding))
            }
            None if outstanding.is_empty() => Ok(None),
            None => Err(LedgerError::after_compensation(
                LedgerError::StorageUnavailable(format!("order {order_id} changed during delete")),
                outstanding,
            )),
        }
    }
}

fn item_removed(order: Order, item_id: &str) -> Order {
    info!(
        order_id = %order.id,
        item_id = %item_id,
        remaining = order.items.len(),
        grand_total = %order.grand_total(),
        "Order item removed"
    );
    order
}

fn build_order(
    order_id: String,
    number: DocumentNumber,
    branch_id: &str,
    customer_code: Option<String>,
    priced: &[PricedLine],
    actor: &str,
    now: DateTime<Utc>,
) -> Order {
    let items = priced
        .iter()
        .enumerate()
        .map(|(idx, line)| OrderItem {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.clone(),
            line_no: idx as i64 + 1,
            product_id: line.product_id.clone(),
            product_code: line.product_code.clone(),
            product_name: line.product_name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price.cents(),
            line_subtotal_cents: line.amounts.subtotal.cents(),
            discount_cents: line.amounts.discount.cents(),
            tax_cents: line.amounts.tax.cents(),
            line_total_cents: line.amounts.total.cents(),
            promotion_id: line.promotion_id.clone(),
            created_at: now,
        })
        .collect();

    let mut order = Order {
        id: order_id,
        document_number: number.code,
        sequence_value: number.value,
        branch_id: branch_id.to_string(),
        customer_code,
        subtotal_cents: 0,
        discount_cents: 0,
        tax_cents: 0,
        grand_total_cents: 0,
        status: OrderStatus::Open,
        created_by: actor.to_string(),
        created_at: now,
        updated_by: actor.to_string(),
        updated_at: now,
        items,
    };
    OrderTotals::from_priced(priced).apply_to(&mut order);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Outcome;
    use crate::store::SequenceStore;
    use crate::test_support::{
        backend_with_stores, memory_backend, seed_product, stock_of, DeleteGate, FlakyProducts,
        UnreliableOrders,
    };
    use async_trait::async_trait;
    use meridian_core::{Promotion, PromotionCondition, PromotionEffect, StockMovement};

    fn new_order(branch_id: &str, items: &[(&str, i64)]) -> NewOrder {
        NewOrder {
            branch_id: branch_id.to_string(),
            customer_code: None,
            items: items
                .iter()
                .map(|(id, qty)| OrderLineRequest {
                    product_id: id.to_string(),
                    quantity: *qty,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_create_then_delete_restores_stock() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        let orders = backend.orders();

        let order = orders
            .create_order(new_order("a", &[("p-1", 3)]), "clerk-1")
            .await
            .unwrap();

        assert_eq!(stock_of(&backend, "a", "p-1").await, 7);
        assert_eq!(order.sequence_value, 1);
        assert_eq!(order.document_number, "ORD-a-000001");
        assert_eq!(order.grand_total_cents, 3 * 250);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].line_no, 1);
        let stored = orders.get_order(&order.id).await.unwrap();
        assert_eq!(stored.document_number, order.document_number);
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.grand_total_cents, order.grand_total_cents);

        let deleted = orders.delete_order(&order.id, "clerk-2").await.unwrap();
        assert_eq!(deleted.status, OrderStatus::Deleted);
        assert_eq!(deleted.updated_by, "clerk-2");
        assert_eq!(stock_of(&backend, "a", "p-1").await, 10);
        assert_eq!(
            orders.get_order(&order.id).await.unwrap_err(),
            LedgerError::not_found("Order", &order.id)
        );
    }

    #[tokio::test]
    async fn test_insufficient_stock_creates_nothing() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 2).await;
        let orders = backend.orders();

        let err = orders
            .create_order(new_order("a", &[("p-1", 5)]), "clerk-1")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                branch_id: "a".to_string(),
                product_id: "p-1".to_string(),
                requested: 5,
                available: 2,
            }
        );
        assert_eq!(stock_of(&backend, "a", "p-1").await, 2);
        assert!(orders.list_orders_by_branch("a").await.unwrap().is_empty());

        // no number was consumed by the failed attempt
        let next = backend
            .sequences()
            .allocate(&ScopeKey::order("a"))
            .await
            .unwrap();
        assert_eq!(next.value, 1);
    }

    #[tokio::test]
    async fn test_one_short_line_changes_nothing() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        seed_product(&backend, "a", "p-2", 10).await;
        seed_product(&backend, "a", "p-3", 1).await;
        let orders = backend.orders();

        let err = orders
            .create_order(new_order("a", &[("p-1", 2), ("p-2", 2), ("p-3", 3)]), "clerk-1")
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientStock { .. }));
        for id in ["p-1", "p-2"] {
            assert_eq!(stock_of(&backend, "a", id).await, 10);
        }
        assert_eq!(stock_of(&backend, "a", "p-3").await, 1);
        assert!(orders.list_orders_by_branch("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        let orders = backend.orders();

        let cases = [
            (new_order("a", &[]), "clerk-1"),
            (new_order("a", &[("p-1", 0)]), "clerk-1"),
            (new_order("", &[("p-1", 1)]), "clerk-1"),
            (new_order("a", &[("p-1", 1)]), ""),
            (new_order("a", &[("ghost", 1)]), "clerk-1"),
        ];

        for (request, actor) in cases {
            let err = orders.create_order(request, actor).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)), "got {err:?}");
        }
        assert_eq!(stock_of(&backend, "a", "p-1").await, 10);
    }

    #[tokio::test]
    async fn test_best_promotion_priced_in() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        seed_product(&backend, "a", "p-2", 10).await;

        let now = Utc::now();
        let promotions = backend.database().promotions();
        for (id, effect) in [
            ("ten-percent", PromotionEffect::PercentageBps(1000)),
            ("fifty-off", PromotionEffect::FixedCents(50)),
        ] {
            promotions
                .insert(&Promotion {
                    id: id.to_string(),
                    name: id.to_string(),
                    effect,
                    condition: PromotionCondition::Product("p-1".to_string()),
                    active: true,
                    starts_at: None,
                    ends_at: None,
                    created_at: now,
                })
                .await
                .unwrap();
        }

        let order = backend
            .orders()
            .create_order(new_order("a", &[("p-1", 4), ("p-2", 1)]), "clerk-1")
            .await
            .unwrap();

        // 4 × 250 = 1000 → 10% = 100 beats 50
        assert_eq!(order.items[0].discount_cents, 100);
        assert_eq!(order.items[0].promotion_id.as_deref(), Some("ten-percent"));
        assert_eq!(order.items[1].discount_cents, 0);
        assert_eq!(order.items[1].promotion_id, None);

        assert_eq!(order.subtotal_cents, 1250);
        assert_eq!(order.discount_cents, 100);
        assert_eq!(
            order.grand_total_cents,
            order.subtotal_cents - order.discount_cents + order.tax_cents
        );
        assert_eq!(
            order.items.iter().map(|i| i.line_subtotal_cents).sum::<i64>(),
            order.subtotal_cents
        );
    }

    #[tokio::test]
    async fn test_delete_item_recomputes_and_keeps_empty_order() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        seed_product(&backend, "a", "p-2", 10).await;
        let orders = backend.orders();

        let order = orders
            .create_order(new_order("a", &[("p-1", 2), ("p-2", 3)]), "clerk-1")
            .await
            .unwrap();
        let first = order.items[0].id.clone();
        let second = order.items[1].id.clone();

        let updated = orders
            .delete_order_item(&order.id, &first, "clerk-2")
            .await
            .unwrap();
        assert_eq!(stock_of(&backend, "a", "p-1").await, 10);
        assert_eq!(stock_of(&backend, "a", "p-2").await, 7);
        assert_eq!(updated.items.len(), 1);
        assert_eq!(updated.subtotal_cents, 3 * 250);
        assert_eq!(updated.grand_total_cents, 3 * 250);

        let emptied = orders
            .delete_order_item(&order.id, &second, "clerk-2")
            .await
            .unwrap();
        assert!(emptied.items.is_empty());
        assert_eq!(emptied.grand_total_cents, 0);
        assert_eq!(emptied.status, OrderStatus::Open);
        assert_eq!(stock_of(&backend, "a", "p-2").await, 10);

        let err = orders
            .delete_order_item(&order.id, &second, "clerk-2")
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::not_found("OrderItem", &second));
    }

    #[tokio::test]
    async fn test_delete_order_with_retired_product() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        seed_product(&backend, "a", "p-2", 10).await;
        let orders = backend.orders();

        let order = orders
            .create_order(new_order("a", &[("p-1", 2), ("p-2", 3)]), "clerk-1")
            .await
            .unwrap();
        backend.database().products().delete("a", "p-2").await.unwrap();

        orders.delete_order(&order.id, "clerk-1").await.unwrap();
        assert_eq!(stock_of(&backend, "a", "p-1").await, 10);

        let open = backend.database().reconciliation().list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].product_id, "p-2");
        assert_eq!(open[0].quantity_delta, 3);
        assert_eq!(open[0].document_ref, order.id);
    }

    #[tokio::test]
    async fn test_customer_code_and_listings() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        seed_product(&backend, "b", "p-1", 10).await;
        let orders = backend.orders();

        let mut request = new_order("a", &[("p-1", 1)]);
        request.customer_code = Some("CUST-1".to_string());
        let first = orders.create_order(request, "clerk-1").await.unwrap();
        let second = orders
            .create_order(new_order("b", &[("p-1", 1)]), "clerk-1")
            .await
            .unwrap();

        let updated = orders
            .update_customer_code(&second.id, Some("CUST-1"), "clerk-2")
            .await
            .unwrap();
        assert_eq!(updated.customer_code.as_deref(), Some("CUST-1"));
        assert_eq!(updated.grand_total_cents, second.grand_total_cents);
        assert_eq!(stock_of(&backend, "b", "p-1").await, 9);

        let by_customer = orders.list_orders_by_customer("CUST-1").await.unwrap();
        assert_eq!(by_customer.len(), 2);
        let in_branch = orders.list_orders_by_branch("a").await.unwrap();
        assert_eq!(in_branch.len(), 1);
        assert_eq!(in_branch[0].id, first.id);

        let cleared = orders
            .update_customer_code(&first.id, None, "clerk-2")
            .await
            .unwrap();
        assert_eq!(cleared.customer_code, None);

        assert!(matches!(
            orders.list_orders_by_customer("  ").await.unwrap_err(),
            LedgerError::Validation(_)
        ));
    }

    struct BrokenCounter;

    #[async_trait]
    impl SequenceStore for BrokenCounter {
        async fn next_value(&self, _scope_key: &str) -> LedgerResult<i64> {
            Err(LedgerError::StorageUnavailable("counter store offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_allocation_failure_releases_reservation() {
        let backend = backend_with_stores(|_, stores| {
            stores.sequences = Arc::new(BrokenCounter);
        })
        .await;
        seed_product(&backend, "a", "p-1", 10).await;

        let err = backend
            .orders()
            .create_order(new_order("a", &[("p-1", 4)]), "clerk-1")
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::StorageUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(stock_of(&backend, "a", "p-1").await, 10);
    }

    #[tokio::test]
    async fn test_allocation_failure_with_broken_release() {
        let backend = backend_with_stores(|db, stores| {
            stores.sequences = Arc::new(BrokenCounter);
            stores.products = Arc::new(FlakyProducts::new(db.products()).failing_increments(["p-1"]));
        })
        .await;
        seed_product(&backend, "a", "p-1", 10).await;

        let err = backend
            .orders()
            .create_order(new_order("a", &[("p-1", 4)]), "clerk-1")
            .await
            .unwrap_err();

        match err {
            LedgerError::ReconciliationRequired { original, movements } => {
                assert!(matches!(*original, LedgerError::StorageUnavailable(_)));
                assert_eq!(
                    movements,
                    vec![StockMovement {
                        branch_id: "a".to_string(),
                        product_id: "p-1".to_string(),
                        quantity_delta: 4,
                    }]
                );
            }
            other => panic!("expected reconciliation, got {other:?}"),
        }
        assert_eq!(stock_of(&backend, "a", "p-1").await, 6);
        assert_eq!(
            backend.database().reconciliation().list_open().await.unwrap().len(),
            1
        );
    }

    // =========================================================================
    // Interleavings and Unknown Outcomes
    // =========================================================================

    #[tokio::test]
    async fn test_item_removed_during_order_delete_is_released_once() {
        let gate = Arc::new(DeleteGate::default());
        let backend = backend_with_stores({
            let gate = Arc::clone(&gate);
            move |db, stores| {
                stores.orders = Arc::new(UnreliableOrders::new(db.orders()).gated_delete(gate));
            }
        })
        .await;
        seed_product(&backend, "a", "p-1", 10).await;
        seed_product(&backend, "a", "p-2", 10).await;
        let orders = backend.orders();

        let order = orders
            .create_order(new_order("a", &[("p-1", 3), ("p-2", 2)]), "clerk-1")
            .await
            .unwrap();
        let first_item = order.items[0].id.clone();

        let deleting = tokio::spawn({
            let orders = Arc::clone(&orders);
            let order_id = order.id.clone();
            async move { orders.delete_order(&order_id, "clerk-1").await }
        });

        // delete_order has released both lines and waits before deleting
        gate.reached.notified().await;
        let updated = orders
            .delete_order_item(&order.id, &first_item, "clerk-2")
            .await
            .unwrap();
        assert_eq!(updated.items.len(), 1);
        gate.open.notify_one();

        let deleted = deleting.await.unwrap().unwrap();
        assert_eq!(deleted.status, OrderStatus::Deleted);
        assert_eq!(deleted.items.len(), 1);
        assert_eq!(deleted.items[0].product_id, "p-2");

        assert_eq!(stock_of(&backend, "a", "p-1").await, 10);
        assert_eq!(stock_of(&backend, "a", "p-2").await, 10);
        assert!(backend.database().orders().get(&order.id).await.unwrap().is_none());
        assert!(backend.database().reconciliation().list_open().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_deletes_release_once() {
        let gate = Arc::new(DeleteGate::default());
        let backend = backend_with_stores({
            let gate = Arc::clone(&gate);
            move |db, stores| {
                stores.orders = Arc::new(UnreliableOrders::new(db.orders()).gated_delete(gate));
            }
        })
        .await;
        seed_product(&backend, "a", "p-1", 10).await;
        let orders = backend.orders();

        let order = orders
            .create_order(new_order("a", &[("p-1", 4)]), "clerk-1")
            .await
            .unwrap();

        let deleting = tokio::spawn({
            let orders = Arc::clone(&orders);
            let order_id = order.id.clone();
            async move { orders.delete_order(&order_id, "clerk-1").await }
        });

        gate.reached.notified().await;
        orders.delete_order(&order.id, "clerk-2").await.unwrap();
        gate.open.notify_one();

        let err = deleting.await.unwrap().unwrap_err();
        assert_eq!(err, LedgerError::not_found("Order", &order.id));
        assert_eq!(stock_of(&backend, "a", "p-1").await, 10);
    }

    #[tokio::test]
    async fn test_insert_with_lost_reply_and_failed_read_back() {
        let backend = backend_with_stores(|db, stores| {
            stores.orders = Arc::new(
                UnreliableOrders::new(db.orders())
                    .losing_insert_reply()
                    .failing_reads(),
            );
        })
        .await;
        seed_product(&backend, "a", "p-1", 10).await;

        let err = backend
            .orders()
            .create_order(new_order("a", &[("p-1", 3)]), "clerk-1")
            .await
            .unwrap_err();

        assert_eq!(err.outcome(), Outcome::PartiallyApplied);
        assert!(!err.is_retryable());
        let LedgerError::ReconciliationRequired { original, movements } = err else {
            panic!("expected reconciliation");
        };
        assert!(matches!(*original, LedgerError::StorageUnavailable(_)));
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].quantity_delta, 3);

        // the order did commit, so its stock stays reserved
        let stored = backend.database().orders().list_by_branch("a").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stock_of(&backend, "a", "p-1").await, 7);

        let open = backend.database().reconciliation().list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].document_ref, stored[0].id);
    }

    #[tokio::test]
    async fn test_insert_with_lost_reply_is_confirmed_by_read_back() {
        let backend = backend_with_stores(|db, stores| {
            stores.orders = Arc::new(UnreliableOrders::new(db.orders()).losing_insert_reply());
        })
        .await;
        seed_product(&backend, "a", "p-1", 10).await;

        let order = backend
            .orders()
            .create_order(new_order("a", &[("p-1", 3)]), "clerk-1")
            .await
            .unwrap();

        assert_eq!(stock_of(&backend, "a", "p-1").await, 7);
        assert!(backend.database().orders().get(&order.id).await.unwrap().is_some());
        assert!(backend.database().reconciliation().list_open().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_lost_reply_releases_once() {
        let backend = backend_with_stores(|db, stores| {
            stores.orders = Arc::new(UnreliableOrders::new(db.orders()).losing_delete_reply());
        })
        .await;
        seed_product(&backend, "a", "p-1", 10).await;
        let orders = backend.orders();

        let order = orders
            .create_order(new_order("a", &[("p-1", 3)]), "clerk-1")
            .await
            .unwrap();
        let deleted = orders.delete_order(&order.id, "clerk-2").await.unwrap();

        assert_eq!(deleted.status, OrderStatus::Deleted);
        assert_eq!(stock_of(&backend, "a", "p-1").await, 10);
    }
}
