//! # Reconciliation Repository
//!
//! Append-only log of stock movements that could not be applied or undone
//! automatically. Entries stay open until an operator resolves them.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use meridian_core::ReconciliationEntry;

#[derive(Debug, Clone)]
pub struct ReconciliationRepository {
    pool: SqlitePool,
}

impl ReconciliationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReconciliationRepository { pool }
    }

    pub async fn record(&self, entry: &ReconciliationEntry) -> DbResult<()> {
        warn!(
            branch_id = %entry.branch_id,
            product_id = %entry.product_id,
            quantity_delta = entry.quantity_delta,
            document_ref = %entry.document_ref,
            reason = %entry.reason,
            "Recording stock reconciliation entry"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_reconciliation (
                id, branch_id, product_id, quantity_delta,
                document_ref, reason, created_at, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.branch_id)
        .bind(&entry.product_id)
        .bind(entry.quantity_delta)
        .bind(&entry.document_ref)
        .bind(&entry.reason)
        .bind(entry.created_at)
        .bind(entry.resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Unresolved entries, oldest first.
    pub async fn list_open(&self) -> DbResult<Vec<ReconciliationEntry>> {
        let entries = sqlx::query_as::<_, ReconciliationEntry>(
            r#"
            SELECT
                id, branch_id, product_id, quantity_delta,
                document_ref, reason, created_at, resolved_at
            FROM stock_reconciliation
            WHERE resolved_at IS NULL
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Marks an entry as handled.
    pub async fn resolve(&self, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        debug!(id = %id, "Resolving reconciliation entry");

        let result = sqlx::query(
            "UPDATE stock_reconciliation SET resolved_at = ?2 WHERE id = ?1 AND resolved_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ReconciliationEntry", id));
        }

        Ok(())
    }
}
