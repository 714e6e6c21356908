//! # Transfer Repository
//!
//! Stock transfers and their items. The status column only ever moves
//! through [`TransferRepository::mark_decided`], a compare-and-set:
//!
//! ```text
//!   UPDATE stock_transfers
//!      SET status = 'approved', decided_by = ?, decided_at = ?
//!    WHERE id = ? AND status = 'pending'
//!
//!   rows_affected = 1  → this caller won the decision
//!   rows_affected = 0  → already decided (or gone); caller must undo
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{StockTransfer, TransferItem, TransferStatus};

const TRANSFER_COLUMNS: &str = r#"
    SELECT
        id, document_number, sequence_value, source_branch_id,
        destination_branch_id, status, created_by, created_at,
        decided_by, decided_at
    FROM stock_transfers
"#;

#[derive(Debug, Clone)]
pub struct TransferRepository {
    pool: SqlitePool,
}

impl TransferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransferRepository { pool }
    }

    /// Inserts a transfer and its items in one transaction.
    pub async fn insert(&self, transfer: &StockTransfer) -> DbResult<()> {
        debug!(
            id = %transfer.id,
            document_number = %transfer.document_number,
            items = transfer.items.len(),
            "Inserting stock transfer"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO stock_transfers (
                id, document_number, sequence_value, source_branch_id,
                destination_branch_id, status, created_by, created_at,
                decided_by, decided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&transfer.id)
        .bind(&transfer.document_number)
        .bind(transfer.sequence_value)
        .bind(&transfer.source_branch_id)
        .bind(&transfer.destination_branch_id)
        .bind(transfer.status)
        .bind(&transfer.created_by)
        .bind(transfer.created_at)
        .bind(&transfer.decided_by)
        .bind(transfer.decided_at)
        .execute(&mut *tx)
        .await?;

        for (idx, item) in transfer.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO stock_transfer_items (transfer_id, line_no, product_id, quantity)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&transfer.id)
            .bind(idx as i64 + 1)
            .bind(&item.product_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    /// Gets a transfer with its items in line order.
    pub async fn get(&self, id: &str) -> DbResult<Option<StockTransfer>> {
        let sql = format!("{TRANSFER_COLUMNS} WHERE id = ?1");
        let Some(mut transfer) = sqlx::query_as::<_, StockTransfer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        transfer.items = fetch_items(&self.pool, id).await?;
        Ok(Some(transfer))
    }

    /// Moves a transfer from `from` to `to` if it is still in `from`.
    ///
    /// ## Returns
    /// * `Ok(true)` - the status was changed by this call
    /// * `Ok(false)` - the transfer is missing or no longer in `from`
    pub async fn mark_decided(
        &self,
        id: &str,
        from: TransferStatus,
        to: TransferStatus,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(id = %id, %from, %to, "Deciding stock transfer");

        let result = sqlx::query(
            r#"
            UPDATE stock_transfers
            SET status = ?3, decided_by = ?4, decided_at = ?5
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(actor)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Transfers touching a branch (as source or destination), newest first,
    /// optionally filtered by status.
    pub async fn list(
        &self,
        branch_id: &str,
        status: Option<TransferStatus>,
    ) -> DbResult<Vec<StockTransfer>> {
        let sql = format!(
            "{TRANSFER_COLUMNS} \
             WHERE (source_branch_id = ?1 OR destination_branch_id = ?1) \
               AND (?2 IS NULL OR status = ?2) \
             ORDER BY created_at DESC, id"
        );
        let mut transfers = sqlx::query_as::<_, StockTransfer>(&sql)
            .bind(branch_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        for transfer in &mut transfers {
            transfer.items = fetch_items(&self.pool, &transfer.id).await?;
        }

        Ok(transfers)
    }
}

async fn fetch_items<'e, E: SqliteExecutor<'e>>(
    executor: E,
    transfer_id: &str,
) -> DbResult<Vec<TransferItem>> {
    let items = sqlx::query_as::<_, TransferItem>(
        r#"
        SELECT product_id, quantity
        FROM stock_transfer_items
        WHERE transfer_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(transfer_id)
    .fetch_all(executor)
    .await?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::generate_id;
    use crate::repository::test_support::memory_db;

    fn transfer(number: i64, source: &str, destination: &str) -> StockTransfer {
        StockTransfer {
            id: generate_id(),
            document_number: format!("TRF-{source}-{number:06}"),
            sequence_value: number,
            source_branch_id: source.to_string(),
            destination_branch_id: destination.to_string(),
            status: TransferStatus::Pending,
            created_by: "clerk".to_string(),
            created_at: Utc::now(),
            decided_by: None,
            decided_at: None,
            items: vec![
                TransferItem {
                    product_id: "p-1".to_string(),
                    quantity: 4,
                },
                TransferItem {
                    product_id: "p-2".to_string(),
                    quantity: 1,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = memory_db().await;
        let repo = db.transfers();
        let t = transfer(1, "a", "b");
        repo.insert(&t).await.unwrap();

        let loaded = repo.get(&t.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TransferStatus::Pending);
        assert_eq!(loaded.items, t.items);
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_branch_rejected_by_schema() {
        let db = memory_db().await;
        let err = db.transfers().insert(&transfer(1, "a", "a")).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[tokio::test]
    async fn test_compare_and_set_decides_once() {
        let db = memory_db().await;
        let repo = db.transfers();
        let t = transfer(1, "a", "b");
        repo.insert(&t).await.unwrap();

        let won = repo
            .mark_decided(&t.id, TransferStatus::Pending, TransferStatus::Rejected, "m", Utc::now())
            .await
            .unwrap();
        assert!(won);

        let again = repo
            .mark_decided(&t.id, TransferStatus::Pending, TransferStatus::Approved, "m", Utc::now())
            .await
            .unwrap();
        assert!(!again);

        let loaded = repo.get(&t.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TransferStatus::Rejected);
        assert_eq!(loaded.decided_by.as_deref(), Some("m"));
        assert!(loaded.decided_at.is_some());
    }

    #[tokio::test]
    async fn test_list_by_branch_and_status() {
        let db = memory_db().await;
        let repo = db.transfers();
        let t1 = transfer(1, "a", "b");
        let t2 = transfer(1, "c", "a");
        let t3 = transfer(2, "c", "d");
        for t in [&t1, &t2, &t3] {
            repo.insert(t).await.unwrap();
        }
        repo.mark_decided(&t1.id, TransferStatus::Pending, TransferStatus::Approved, "m", Utc::now())
            .await
            .unwrap();

        assert_eq!(repo.list("a", None).await.unwrap().len(), 2);
        let pending = repo.list("a", Some(TransferStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, t2.id);
        assert_eq!(pending[0].items.len(), 2);
    }
}
