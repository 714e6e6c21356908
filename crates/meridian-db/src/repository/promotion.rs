//! # Promotion Repository
//!
//! Promotions are read-only input to pricing. The effect and condition are
//! stored as tagged JSON so new rule kinds need no schema change.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::Promotion;

/// Raw `promotions` row.
#[derive(Debug, sqlx::FromRow)]
struct PromotionRow {
    id: String,
    name: String,
    effect_json: String,
    condition_json: String,
    active: bool,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PromotionRow> for Promotion {
    type Error = DbError;

    fn try_from(row: PromotionRow) -> Result<Self, Self::Error> {
        let corrupt = |e: serde_json::Error| DbError::Corrupt {
            entity: "Promotion".to_string(),
            message: format!("{}: {e}", row.id),
        };

        Ok(Promotion {
            effect: serde_json::from_str(&row.effect_json).map_err(corrupt)?,
            condition: serde_json::from_str(&row.condition_json).map_err(corrupt)?,
            id: row.id,
            name: row.name,
            active: row.active,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    /// Inserts a promotion (seeding and tests; authoring is external).
    pub async fn insert(&self, promotion: &Promotion) -> DbResult<()> {
        debug!(id = %promotion.id, name = %promotion.name, "Inserting promotion");

        let effect_json = serde_json::to_string(&promotion.effect)
            .map_err(|e| DbError::Internal(e.to_string()))?;
        let condition_json = serde_json::to_string(&promotion.condition)
            .map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO promotions (
                id, name, effect_json, condition_json, active,
                starts_at, ends_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.name)
        .bind(effect_json)
        .bind(condition_json)
        .bind(promotion.active)
        .bind(promotion.starts_at)
        .bind(promotion.ends_at)
        .bind(promotion.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Active promotions whose validity window contains `now`, in creation
    /// order.
    pub async fn list_active(&self, now: DateTime<Utc>) -> DbResult<Vec<Promotion>> {
        let rows = sqlx::query_as::<_, PromotionRow>(
            r#"
            SELECT
                id, name, effect_json, condition_json, active,
                starts_at, ends_at, created_at
            FROM promotions
            WHERE active = 1
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let promotions = rows
            .into_iter()
            .map(Promotion::try_from)
            .collect::<DbResult<Vec<_>>>()?
            .into_iter()
            .filter(|p| p.is_live(now))
            .collect::<Vec<_>>();

        debug!(count = promotions.len(), "Loaded live promotions");
        Ok(promotions)
    }
}
