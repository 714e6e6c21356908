//! # Stock Transfer Manager
//!
//! Moves stock between branches through a two-step document.
//!
//! ## State Machine
//! ```text
//!                 approve: reserve at source,
//!                          release at destination,
//!                          CAS Pending → Approved
//!            ┌──────────────────────────────────► Approved (terminal)
//!  Pending ──┤
//!            └──────────────────────────────────► Rejected (terminal)
//!                 reject:  CAS Pending → Rejected, no stock moves
//! ```
//!
//! The status change is a compare-and-set, so two clerks deciding the same
//! transfer at once cannot both win. The loser of an approve race undoes
//! both stock movements before reporting `InvalidTransition`. If the
//! compare-and-set fails and the status cannot be read back either, the
//! movements stay in place and go to the reconciliation log.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use meridian_core::transfer::ensure_can;
use meridian_core::validation::{validate_identifier, validate_new_transfer, validate_record_id};
use meridian_core::{
    NewTransfer, ScopeKey, StockLine, StockMovement, StockTransfer, TransferAction,
    TransferStatus, ValidationError,
};

use crate::error::{LedgerError, LedgerResult};
use crate::inventory::{Correction, InventoryLedger, MissingProductPolicy};
use crate::sequence::SequenceGenerator;
use crate::store::{bounded, ProductStore, TransferStore};

pub struct TransferManager {
    products: Arc<dyn ProductStore>,
    transfers: Arc<dyn TransferStore>,
    inventory: Arc<InventoryLedger>,
    sequences: Arc<SequenceGenerator>,
    timeout: Duration,
}

impl TransferManager {
    pub fn new(
        products: Arc<dyn ProductStore>,
        transfers: Arc<dyn TransferStore>,
        inventory: Arc<InventoryLedger>,
        sequences: Arc<SequenceGenerator>,
        timeout: Duration,
    ) -> Self {
        TransferManager {
            products,
            transfers,
            inventory,
            sequences,
            timeout,
        }
    }

    /// Records a Pending transfer. No stock moves until approval.
    pub async fn create_transfer(
        &self,
        request: NewTransfer,
        actor: &str,
    ) -> LedgerResult<StockTransfer> {
        validate_identifier("actor", actor)?;
        validate_new_transfer(&request)?;

        for (idx, item) in request.items.iter().enumerate() {
            let lookup = self.products.get(&request.source_branch_id, &item.product_id);
            if bounded(self.timeout, "product lookup", lookup).await?.is_none() {
                return Err(ValidationError::UnknownReference {
                    field: format!("items[{idx}].product_id"),
                    entity: "Product".to_string(),
                    id: item.product_id.clone(),
                }
                .into());
            }
        }

        let number = self
            .sequences
            .allocate(&ScopeKey::transfer(&request.source_branch_id))
            .await?;

        let now = Utc::now();
        let transfer = StockTransfer {
            id: Uuid::new_v4().to_string(),
            document_number: number.code,
            sequence_value: number.value,
            source_branch_id: request.source_branch_id,
            destination_branch_id: request.destination_branch_id,
            status: TransferStatus::Pending,
            created_by: actor.to_string(),
            created_at: now,
            decided_by: None,
            decided_at: None,
            items: request.items,
        };

        bounded(self.timeout, "transfer insert", self.transfers.insert(&transfer)).await?;

        info!(
            transfer_id = %transfer.id,
            document_number = %transfer.document_number,
            source = %transfer.source_branch_id,
            destination = %transfer.destination_branch_id,
            items = transfer.items.len(),
            "Stock transfer created"
        );
        Ok(transfer)
    }

    /// Moves the transfer quantities from source to destination and marks
    /// the transfer Approved. Either all of it happens or none of it.
    ///
    /// ## Returns
    /// * `Err(InsufficientStock)` - source is short; transfer stays Pending
    /// * `Err(NotFound)` - destination does not stock a product; source
    ///   reservation undone, transfer stays Pending
    /// * `Err(InvalidTransition)` - already decided (possibly concurrently)
    pub async fn approve(&self, transfer_id: &str, actor: &str) -> LedgerResult<StockTransfer> {
        validate_record_id("transfer_id", transfer_id)?;
        validate_identifier("actor", actor)?;

        let mut transfer = self.get_transfer(transfer_id).await?;
        ensure_can(transfer.status, TransferAction::Approve)?;

        let lines = transfer.stock_lines();
        let source = transfer.source_branch_id.clone();
        let destination = transfer.destination_branch_id.clone();
        let doc = transfer.document_number.clone();

        self.inventory.reserve_batch(&source, &lines, &doc).await?;

        if let Err(err) = self
            .inventory
            .release_batch(&destination, &lines, MissingProductPolicy::Fail, &doc)
            .await
        {
            warn!(transfer_id = %transfer_id, error = %err, "Destination release failed, undoing source reservation");
            let outstanding = self.inventory.undo_reservation(&source, &lines, &doc).await;
            return Err(LedgerError::after_compensation(err, outstanding));
        }

        let now = Utc::now();
        let decision = self.transfers.mark_decided(
            transfer_id,
            TransferStatus::Pending,
            TransferStatus::Approved,
            actor,
            now,
        );

        let failure = match bounded(self.timeout, "transfer decision", decision).await {
            Ok(true) => None,
            Ok(false) => Some(match self.current_status(transfer_id).await {
                Ok(status) => LedgerError::InvalidTransition {
                    status,
                    action: TransferAction::Approve,
                },
                Err(err) => err,
            }),
            // The update may have committed before the error surfaced.
            Err(err) => match self.current_status(transfer_id).await {
                Ok(TransferStatus::Approved) => {
                    warn!(transfer_id = %transfer_id, error = %err, "Approval reported failure but was recorded");
                    None
                }
                Ok(_) => Some(err),
                Err(lookup) => {
                    warn!(transfer_id = %transfer_id, error = %err, lookup_error = %lookup, "Approval outcome unknown");
                    let reason = "transfer approval unconfirmed; apply only if the transfer is not Approved";
                    let mut movements = self
                        .inventory
                        .flag_unconfirmed(&destination, &lines, Correction::Withdraw, &doc, reason)
                        .await;
                    movements.extend(
                        self.inventory
                            .flag_unconfirmed(&source, &lines, Correction::Restock, &doc, reason)
                            .await,
                    );
                    return Err(LedgerError::after_compensation(err, movements));
                }
            },
        };

        if let Some(err) = failure {
            warn!(transfer_id = %transfer_id, error = %err, "Approval not recorded, undoing stock movements");
            let outstanding = self.undo_moves(&source, &destination, &lines, &doc).await;
            return Err(LedgerError::after_compensation(err, outstanding));
        }

        transfer.status = TransferStatus::Approved;
        transfer.decided_by = Some(actor.to_string());
        transfer.decided_at = Some(now);

        info!(
            transfer_id = %transfer.id,
            document_number = %transfer.document_number,
            source = %source,
            destination = %destination,
            "Stock transfer approved"
        );
        Ok(transfer)
    }

    /// Marks a Pending transfer Rejected. No stock interaction.
    pub async fn reject(&self, transfer_id: &str, actor: &str) -> LedgerResult<StockTransfer> {
        validate_record_id("transfer_id", transfer_id)?;
        validate_identifier("actor", actor)?;

        let decision = self.transfers.mark_decided(
            transfer_id,
            TransferStatus::Pending,
            TransferStatus::Rejected,
            actor,
            Utc::now(),
        );

        if !bounded(self.timeout, "transfer decision", decision).await? {
            let status = self.current_status(transfer_id).await?;
            return Err(LedgerError::InvalidTransition {
                status,
                action: TransferAction::Reject,
            });
        }

        let transfer = self.get_transfer(transfer_id).await?;
        info!(
            transfer_id = %transfer.id,
            document_number = %transfer.document_number,
            "Stock transfer rejected"
        );
        Ok(transfer)
    }

    pub async fn get_transfer(&self, transfer_id: &str) -> LedgerResult<StockTransfer> {
        validate_record_id("transfer_id", transfer_id)?;

        bounded(self.timeout, "transfer lookup", self.transfers.get(transfer_id))
            .await?
            .ok_or_else(|| LedgerError::not_found("StockTransfer", transfer_id))
    }

    /// Transfers where `branch_id` is the source or the destination.
    pub async fn list_transfers(
        &self,
        branch_id: &str,
        status: Option<TransferStatus>,
    ) -> LedgerResult<Vec<StockTransfer>> {
        validate_identifier("branch_id", branch_id)?;
        bounded(
            self.timeout,
            "transfer listing",
            self.transfers.list(branch_id, status),
        )
        .await
    }

    async fn current_status(&self, transfer_id: &str) -> LedgerResult<TransferStatus> {
        Ok(self.get_transfer(transfer_id).await?.status)
    }

    /// Takes released stock back from the destination, then returns the
    /// reservation to the source.
    async fn undo_moves(
        &self,
        source: &str,
        destination: &str,
        lines: &[StockLine],
        doc: &str,
    ) -> Vec<StockMovement> {
        let mut outstanding = self.inventory.undo_release(destination, lines, doc).await;
        outstanding.extend(self.inventory.undo_reservation(source, lines, doc).await);
        outstanding
    }
}
