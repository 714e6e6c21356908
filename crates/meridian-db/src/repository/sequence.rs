//! # Sequence Repository
//!
//! Durable per-scope counters.
//!
//! ```text
//!   INSERT INTO sequence_counters (scope_key, current_value, updated_at)
//!   VALUES ('ORDER:branch-7', 1, now)
//!   ON CONFLICT (scope_key) DO UPDATE
//!       SET current_value = current_value + 1
//!   RETURNING current_value
//! ```
//!
//! The row is created on first use and the increment plus read-back happen
//! in one statement, so two callers can never observe the same value.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Increments the counter for `scope_key` and returns the new value.
    ///
    /// The first call for a scope returns 1.
    pub async fn next_value(&self, scope_key: &str) -> DbResult<i64> {
        let value = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sequence_counters (scope_key, current_value, updated_at)
            VALUES (?1, 1, ?2)
            ON CONFLICT (scope_key) DO UPDATE SET
                current_value = current_value + 1,
                updated_at = excluded.updated_at
            RETURNING current_value
            "#,
        )
        .bind(scope_key)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        debug!(scope_key = %scope_key, value, "Allocated sequence value");
        Ok(value)
    }

    /// Last allocated value, or `None` if the scope was never used.
    pub async fn current_value(&self, scope_key: &str) -> DbResult<Option<i64>> {
        let value = sqlx::query_scalar::<_, i64>(
            "SELECT current_value FROM sequence_counters WHERE scope_key = ?1",
        )
        .bind(scope_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }
}
