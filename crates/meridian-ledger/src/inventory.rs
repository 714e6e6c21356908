//! # Inventory Ledger
//!
//! The only path through which product stock changes.
//!
//! ## Batch Saga
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reserve_batch(branch, [l0, l1, l2, l3])                                │
//! │                                                                         │
//! │   l0 ✓ ──► l1 ✓ ──► l2 ✗ InsufficientStock                              │
//! │                      │                                                  │
//! │                      ▼  compensate in reverse                           │
//! │             release l1 ──► release l0                                   │
//! │                      │                                                  │
//! │          all undone? ├── yes ──► Err(InsufficientStock)                 │
//! │                      └── no  ──► Err(ReconciliationRequired {           │
//! │                                     original, movements })              │
//! │                                  + one reconciliation entry per         │
//! │                                    movement left outstanding            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each line is one conditional statement (`stock >= qty` check and
//! decrement together), so concurrent reservations can never drive stock
//! negative. Every call runs under the store timeout. A timed-out call has
//! an unknown outcome: the line is written to the reconciliation log and the
//! lines before it are compensated.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use meridian_core::validation::{validate_identifier, validate_quantity, validate_stock_lines};
use meridian_core::{Product, ReconciliationEntry, StockLine, StockMovement, StockUpdate};

use crate::error::{LedgerError, LedgerResult};
use crate::store::{bounded, timed_out, ProductStore, ReconciliationStore};

/// Document reference used for single-line adjustments made outside a
/// document.
pub const ADJUSTMENT_REF: &str = "stock-adjustment";

/// What `release_batch` does with a line whose product no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingProductPolicy {
    /// Abort and compensate (transfer destination must stock the product).
    #[default]
    Fail,
    /// Skip the line and log it as a reconciliation gap (order deletion).
    Skip,
}

/// Which way an unconfirmed movement has to be corrected if the write it
/// depended on turns out not to have committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Put the quantity back into stock.
    Restock,
    /// Take the quantity out of stock again.
    Withdraw,
}

/// Failure of a single stock call.
enum StepError {
    /// The store answered and nothing changed.
    Refused(LedgerError),
    /// The call timed out; the change may or may not have been applied.
    Unknown(LedgerError),
}

pub struct InventoryLedger {
    products: Arc<dyn ProductStore>,
    reconciliation: Arc<dyn ReconciliationStore>,
    timeout: Duration,
}

impl InventoryLedger {
    pub fn new(
        products: Arc<dyn ProductStore>,
        reconciliation: Arc<dyn ReconciliationStore>,
        timeout: Duration,
    ) -> Self {
        InventoryLedger {
            products,
            reconciliation,
            timeout,
        }
    }

    /// Products stocked by a branch with their current levels.
    pub async fn stock_levels(&self, branch_id: &str) -> LedgerResult<Vec<Product>> {
        validate_identifier("branch_id", branch_id)?;
        bounded(
            self.timeout,
            "product listing",
            self.products.list_by_branch(branch_id),
        )
        .await
    }

    // =========================================================================
    // Single Lines
    // =========================================================================

    /// Takes `quantity` out of stock. Returns the new stock level.
    ///
    /// ## Returns
    /// * `Err(InsufficientStock)` - less than `quantity` on hand at commit time
    /// * `Err(NotFound)` - the branch does not stock the product
    pub async fn reserve(&self, branch_id: &str, product_id: &str, quantity: i64) -> LedgerResult<i64> {
        validate_identifier("branch_id", branch_id)?;
        validate_identifier("product_id", product_id)?;
        validate_quantity("quantity", quantity)?;

        let line = StockLine::new(product_id, quantity);
        match self.decrement(branch_id, &line).await {
            Ok(level) => Ok(level),
            Err(StepError::Refused(err)) => Err(err),
            Err(StepError::Unknown(err)) => {
                self.record_unknown(branch_id, &line, line.quantity, ADJUSTMENT_REF, "reservation")
                    .await;
                Err(err)
            }
        }
    }

    /// Puts `quantity` back into stock. Returns the new stock level.
    pub async fn release(&self, branch_id: &str, product_id: &str, quantity: i64) -> LedgerResult<i64> {
        validate_identifier("branch_id", branch_id)?;
        validate_identifier("product_id", product_id)?;
        validate_quantity("quantity", quantity)?;

        let line = StockLine::new(product_id, quantity);
        match self.increment(branch_id, &line).await {
            Ok(level) => Ok(level),
            Err(StepError::Refused(err)) => Err(err),
            Err(StepError::Unknown(err)) => {
                self.record_unknown(branch_id, &line, -line.quantity, ADJUSTMENT_REF, "release")
                    .await;
                Err(err)
            }
        }
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Reserves every line or none.
    ///
    /// `document_ref` identifies the order or transfer in log output and
    /// reconciliation entries.
    pub async fn reserve_batch(
        &self,
        branch_id: &str,
        lines: &[StockLine],
        document_ref: &str,
    ) -> LedgerResult<()> {
        validate_identifier("branch_id", branch_id)?;
        validate_stock_lines(lines)?;

        for (idx, line) in lines.iter().enumerate() {
            let failure = match self.decrement(branch_id, line).await {
                Ok(_) => continue,
                Err(failure) => failure,
            };

            let original = match failure {
                StepError::Refused(err) => err,
                StepError::Unknown(err) => {
                    self.record_unknown(branch_id, line, line.quantity, document_ref, "reservation")
                        .await;
                    err
                }
            };

            warn!(
                branch_id = %branch_id,
                document_ref = %document_ref,
                failed_line = idx,
                error = %original,
                "Reservation failed, releasing {} applied line(s)",
                idx
            );
            let outstanding = self
                .undo_reservation(branch_id, &lines[..idx], document_ref)
                .await;
            return Err(LedgerError::after_compensation(original, outstanding));
        }

        debug!(branch_id = %branch_id, document_ref = %document_ref, lines = lines.len(), "Stock reserved");
        Ok(())
    }

    /// Releases every line or none.
    ///
    /// With [`MissingProductPolicy::Skip`], lines whose product no longer
    /// exists are skipped, logged as reconciliation gaps and returned.
    pub async fn release_batch(
        &self,
        branch_id: &str,
        lines: &[StockLine],
        policy: MissingProductPolicy,
        document_ref: &str,
    ) -> LedgerResult<Vec<StockLine>> {
        validate_identifier("branch_id", branch_id)?;
        validate_stock_lines(lines)?;

        let mut released: Vec<StockLine> = Vec::with_capacity(lines.len());
        let mut skipped = Vec::new();

        for line in lines {
            let failure = match self.increment(branch_id, line).await {
                Ok(_) => {
                    released.push(line.clone());
                    continue;
                }
                Err(failure) => failure,
            };

            let original = match failure {
                StepError::Refused(LedgerError::NotFound { .. })
                    if policy == MissingProductPolicy::Skip =>
                {
                    warn!(
                        branch_id = %branch_id,
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        document_ref = %document_ref,
                        "Product missing at release, skipping line"
                    );
                    let movement = movement(branch_id, line, line.quantity);
                    self.record(&movement, document_ref, "product missing at release".to_string())
                        .await;
                    skipped.push(line.clone());
                    continue;
                }
                StepError::Refused(err) => err,
                StepError::Unknown(err) => {
                    self.record_unknown(branch_id, line, -line.quantity, document_ref, "release")
                        .await;
                    err
                }
            };

            warn!(
                branch_id = %branch_id,
                document_ref = %document_ref,
                error = %original,
                "Release failed, re-reserving {} applied line(s)",
                released.len()
            );
            let outstanding = self.undo_release(branch_id, &released, document_ref).await;
            return Err(LedgerError::after_compensation(original, outstanding));
        }

        debug!(
            branch_id = %branch_id,
            document_ref = %document_ref,
            released = released.len(),
            skipped = skipped.len(),
            "Stock released"
        );
        Ok(skipped)
    }

    // =========================================================================
    // Compensation
    // =========================================================================

    /// Releases previously reserved `lines` in reverse order.
    ///
    /// Returns the movements that could not be undone; each of them has
    /// been written to the reconciliation log.
    pub async fn undo_reservation(
        &self,
        branch_id: &str,
        lines: &[StockLine],
        document_ref: &str,
    ) -> Vec<StockMovement> {
        let mut outstanding = Vec::new();

        for line in lines.iter().rev() {
            let err = match self.increment(branch_id, line).await {
                Ok(_) => continue,
                Err(StepError::Refused(err)) | Err(StepError::Unknown(err)) => err,
            };

            let movement = movement(branch_id, line, line.quantity);
            error!(%movement, document_ref = %document_ref, error = %err, "Compensating release failed");
            self.record(&movement, document_ref, format!("compensating release failed: {err}"))
                .await;
            outstanding.push(movement);
        }

        if outstanding.is_empty() && !lines.is_empty() {
            info!(branch_id = %branch_id, document_ref = %document_ref, lines = lines.len(), "Reservation undone");
        }
        outstanding
    }

    /// Re-reserves previously released `lines` in reverse order.
    ///
    /// A line that can no longer be taken back (stock already sold, product
    /// removed) is left outstanding and logged.
    pub async fn undo_release(
        &self,
        branch_id: &str,
        lines: &[StockLine],
        document_ref: &str,
    ) -> Vec<StockMovement> {
        let mut outstanding = Vec::new();

        for line in lines.iter().rev() {
            let err = match self.decrement(branch_id, line).await {
                Ok(_) => continue,
                Err(StepError::Refused(err)) | Err(StepError::Unknown(err)) => err,
            };

            let movement = movement(branch_id, line, -line.quantity);
            error!(%movement, document_ref = %document_ref, error = %err, "Compensating reservation failed");
            self.record(&movement, document_ref, format!("compensating reservation failed: {err}"))
                .await;
            outstanding.push(movement);
        }

        if outstanding.is_empty() && !lines.is_empty() {
            info!(branch_id = %branch_id, document_ref = %document_ref, lines = lines.len(), "Release undone");
        }
        outstanding
    }

    /// Records `lines` in the reconciliation log without touching stock.
    ///
    /// For stock already moved on behalf of a write whose outcome could not
    /// be confirmed: undoing it could be just as wrong as keeping it.
    /// Returns the recorded movements.
    pub async fn flag_unconfirmed(
        &self,
        branch_id: &str,
        lines: &[StockLine],
        correction: Correction,
        document_ref: &str,
        reason: &str,
    ) -> Vec<StockMovement> {
        let mut flagged = Vec::with_capacity(lines.len());

        for line in lines {
            let delta = match correction {
                Correction::Restock => line.quantity,
                Correction::Withdraw => -line.quantity,
            };
            let movement = movement(branch_id, line, delta);
            error!(%movement, document_ref = %document_ref, "Stock movement left for reconciliation: {reason}");
            self.record(&movement, document_ref, reason.to_string()).await;
            flagged.push(movement);
        }

        flagged
    }

    // =========================================================================
    // Store Calls
    // =========================================================================

    async fn decrement(&self, branch_id: &str, line: &StockLine) -> Result<i64, StepError> {
        let call = self
            .products
            .try_decrement_stock(branch_id, &line.product_id, line.quantity);

        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(StepError::Unknown(timed_out("stock reservation", self.timeout))),
            Ok(Err(err)) => Err(StepError::Refused(err)),
            Ok(Ok(StockUpdate::Applied { new_quantity })) => Ok(new_quantity),
            Ok(Ok(StockUpdate::Insufficient { available })) => {
                Err(StepError::Refused(LedgerError::InsufficientStock {
                    branch_id: branch_id.to_string(),
                    product_id: line.product_id.clone(),
                    requested: line.quantity,
                    available,
                }))
            }
            Ok(Ok(StockUpdate::Missing)) => Err(StepError::Refused(LedgerError::not_found(
                "Product",
                &line.product_id,
            ))),
        }
    }

    async fn increment(&self, branch_id: &str, line: &StockLine) -> Result<i64, StepError> {
        let call = self
            .products
            .increment_stock(branch_id, &line.product_id, line.quantity);

        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(StepError::Unknown(timed_out("stock release", self.timeout))),
            Ok(result) => result.map_err(StepError::Refused),
        }
    }

    // =========================================================================
    // Reconciliation Log
    // =========================================================================

    async fn record_unknown(
        &self,
        branch_id: &str,
        line: &StockLine,
        delta_if_applied: i64,
        document_ref: &str,
        operation: &str,
    ) {
        let movement = movement(branch_id, line, delta_if_applied);
        error!(%movement, document_ref = %document_ref, "Stock {operation} timed out, outcome unknown");
        self.record(
            &movement,
            document_ref,
            format!("{operation} timed out; outcome unknown, apply only if the {operation} committed"),
        )
        .await;
    }

    /// Writes one reconciliation entry. A failure here is logged; the
    /// movement is still reported to the caller through the error.
    async fn record(&self, movement: &StockMovement, document_ref: &str, reason: String) {
        let entry = ReconciliationEntry {
            id: Uuid::new_v4().to_string(),
            branch_id: movement.branch_id.clone(),
            product_id: movement.product_id.clone(),
            quantity_delta: movement.quantity_delta,
            document_ref: document_ref.to_string(),
            reason,
            created_at: Utc::now(),
            resolved_at: None,
        };

        let call = self.reconciliation.record(&entry);
        if let Err(err) = bounded(self.timeout, "reconciliation record", call).await {
            error!(%movement, document_ref = %document_ref, error = %err, "Failed to write reconciliation entry");
        }
    }
}

fn movement(branch_id: &str, line: &StockLine, quantity_delta: i64) -> StockMovement {
    StockMovement {
        branch_id: branch_id.to_string(),
        product_id: line.product_id.clone(),
        quantity_delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        backend_with_products, file_backend, memory_backend, seed_product, stock_of, FlakyProducts,
    };

    fn lines(items: &[(&str, i64)]) -> Vec<StockLine> {
        items.iter().map(|(id, qty)| StockLine::new(*id, *qty)).collect()
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        let ledger = backend.inventory();

        assert_eq!(ledger.reserve("a", "p-1", 3).await.unwrap(), 7);
        assert_eq!(ledger.release("a", "p-1", 2).await.unwrap(), 9);

        let err = ledger.reserve("a", "p-1", 10).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                branch_id: "a".to_string(),
                product_id: "p-1".to_string(),
                requested: 10,
                available: 9,
            }
        );
        assert_eq!(stock_of(&backend, "a", "p-1").await, 9);
    }

    #[tokio::test]
    async fn test_stock_levels_per_branch() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        seed_product(&backend, "a", "p-2", 4).await;
        seed_product(&backend, "b", "p-1", 7).await;

        let levels = backend.inventory().stock_levels("a").await.unwrap();
        let mut pairs: Vec<(String, i64)> = levels
            .into_iter()
            .map(|p| (p.id, p.stock_quantity))
            .collect();
        pairs.sort();
        assert_eq!(pairs, vec![("p-1".to_string(), 10), ("p-2".to_string(), 4)]);
    }

    #[tokio::test]
    async fn test_missing_product() {
        let backend = memory_backend().await;
        let ledger = backend.inventory();

        let err = ledger.reserve("a", "ghost", 1).await.unwrap_err();
        assert_eq!(err, LedgerError::not_found("Product", "ghost"));

        let err = ledger.release("a", "ghost", 1).await.unwrap_err();
        assert_eq!(err, LedgerError::not_found("Product", "ghost"));
    }

    #[tokio::test]
    async fn test_validation_before_store() {
        let backend = memory_backend().await;
        let ledger = backend.inventory();

        let err = ledger.reserve("a", "p-1", 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = ledger
            .reserve_batch("a", &lines(&[("p-1", 1), ("p-2", -4)]), "doc")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reserve_batch_short_line_changes_nothing() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        seed_product(&backend, "a", "p-2", 10).await;
        seed_product(&backend, "a", "p-3", 1).await;
        let ledger = backend.inventory();

        let err = ledger
            .reserve_batch("a", &lines(&[("p-1", 4), ("p-2", 5), ("p-3", 2)]), "doc")
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientStock { ref product_id, .. } if product_id == "p-3"));
        assert_eq!(stock_of(&backend, "a", "p-1").await, 10);
        assert_eq!(stock_of(&backend, "a", "p-2").await, 10);
        assert_eq!(stock_of(&backend, "a", "p-3").await, 1);
    }

    #[tokio::test]
    async fn test_release_batch_policies() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 0).await;
        let ledger = backend.inventory();
        let batch = lines(&[("p-1", 3), ("gone", 2)]);

        let err = ledger
            .release_batch("a", &batch, MissingProductPolicy::Fail, "doc")
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::not_found("Product", "gone"));
        assert_eq!(stock_of(&backend, "a", "p-1").await, 0);

        let skipped = ledger
            .release_batch("a", &batch, MissingProductPolicy::Skip, "ORD-a-000001")
            .await
            .unwrap();
        assert_eq!(skipped, lines(&[("gone", 2)]));
        assert_eq!(stock_of(&backend, "a", "p-1").await, 3);

        let open = backend.database().reconciliation().list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].product_id, "gone");
        assert_eq!(open[0].quantity_delta, 2);
        assert_eq!(open[0].document_ref, "ORD-a-000001");
    }

    #[tokio::test]
    async fn test_failed_compensation_requires_reconciliation() {
        let backend =
            backend_with_products(|repo| FlakyProducts::new(repo).failing_increments(["p-1"])).await;
        seed_product(&backend, "a", "p-1", 10).await;
        seed_product(&backend, "a", "p-2", 1).await;
        let ledger = backend.inventory();

        let err = ledger
            .reserve_batch("a", &lines(&[("p-1", 4), ("p-2", 5)]), "doc-9")
            .await
            .unwrap_err();

        match err {
            LedgerError::ReconciliationRequired { original, movements } => {
                assert!(matches!(*original, LedgerError::InsufficientStock { .. }));
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

        // p-1 stays decremented until an operator applies the entry
        assert_eq!(stock_of(&backend, "a", "p-1").await, 6);
        let open = backend.database().reconciliation().list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].quantity_delta, 4);
        assert_eq!(open[0].document_ref, "doc-9");
    }

    #[tokio::test]
    async fn test_timed_out_line_is_logged_and_rest_compensated() {
        let backend =
            backend_with_products(|repo| FlakyProducts::new(repo).stalling_decrements(["p-2"])).await;
        seed_product(&backend, "a", "p-1", 10).await;
        seed_product(&backend, "a", "p-2", 10).await;
        let ledger = backend.inventory();

        let err = ledger
            .reserve_batch("a", &lines(&[("p-1", 4), ("p-2", 5)]), "doc-3")
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::StorageUnavailable(_)));
        assert_eq!(stock_of(&backend, "a", "p-1").await, 10);

        let open = backend.database().reconciliation().list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].product_id, "p-2");
        assert_eq!(open[0].quantity_delta, 5);
    }

    #[tokio::test]
    async fn test_undo_release_reports_sold_stock() {
        let backend = memory_backend().await;
        seed_product(&backend, "b", "p-1", 0).await;
        let ledger = backend.inventory();

        ledger
            .release_batch("b", &lines(&[("p-1", 4)]), MissingProductPolicy::Fail, "doc")
            .await
            .unwrap();
        ledger.reserve("b", "p-1", 3).await.unwrap();

        let outstanding = ledger.undo_release("b", &lines(&[("p-1", 4)]), "doc").await;
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].quantity_delta, -4);
        assert_eq!(stock_of(&backend, "b", "p-1").await, 1);
    }

    #[tokio::test]
    async fn test_flag_unconfirmed_leaves_stock_alone() {
        let backend = memory_backend().await;
        seed_product(&backend, "a", "p-1", 7).await;
        let ledger = backend.inventory();

        let restock = ledger
            .flag_unconfirmed("a", &lines(&[("p-1", 3)]), Correction::Restock, "doc-1", "insert unconfirmed")
            .await;
        let withdraw = ledger
            .flag_unconfirmed("b", &lines(&[("p-1", 2)]), Correction::Withdraw, "doc-1", "delete unconfirmed")
            .await;

        assert_eq!(restock[0].quantity_delta, 3);
        assert_eq!(withdraw[0].quantity_delta, -2);
        assert_eq!(withdraw[0].branch_id, "b");
        assert_eq!(stock_of(&backend, "a", "p-1").await, 7);

        let open = backend.database().reconciliation().list_open().await.unwrap();
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|entry| entry.document_ref == "doc-1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_oversell() {
        let (backend, _guard) = file_backend().await;
        seed_product(&backend, "a", "p-1", 10).await;
        let ledger = backend.inventory();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move { ledger.reserve("a", "p-1", 1).await }));
        }

        let mut granted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(level) => {
                    assert!(level >= 0);
                    granted += 1;
                }
                Err(LedgerError::InsufficientStock { .. }) => {}
                Err(other) => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(granted, 10);
        assert_eq!(stock_of(&backend, "a", "p-1").await, 0);
    }
}
