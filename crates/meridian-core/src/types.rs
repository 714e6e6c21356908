//! # Domain Types
//!
//! Records shared by every layer of the ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Order      │   │  StockTransfer  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  (branch, id)   │   │  document no.   │   │  document no.   │       │
//! │  │  stock_quantity │   │  items ──────┐  │   │  source → dest  │       │
//! │  │  sale_price     │   │  totals      │  │   │  items          │       │
//! │  └─────────────────┘   └──────────────┼──┘   │  status         │       │
//! │                                       ▼      └─────────────────┘       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Promotion     │   │   OrderItem     │   │ TransferStatus  │       │
//! │  │  effect         │   │  snapshot of    │   │  Pending        │       │
//! │  │  condition      │   │  product + price│   │  Approved  ■    │       │
//! │  │  validity window│   │  discount, tax  │   │  Rejected  ■    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                 ■ = terminal            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Product Identity
//! A product id is shared across branches; each branch holds its own row
//! (and its own stock). Stock is always addressed by `(branch_id, product_id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (825 = 8.25%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product as stocked by one branch.
///
/// `stock_quantity` is never written directly by order or transfer code; it
/// only changes through the inventory ledger's reserve/release primitives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub branch_id: String,
    /// Business code printed on shelf labels.
    pub code: String,
    pub name: String,
    /// Used by category-scoped promotions.
    pub category: Option<String>,
    pub stock_quantity: i64,
    pub cost_price_cents: i64,
    pub sale_price_cents: i64,
    pub tax_rate_bps: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn sale_price(&self) -> Money {
        Money::from_cents(self.sale_price_cents)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

// =============================================================================
// Stock Lines
// =============================================================================

/// A `(product, quantity)` pair handed to the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: String,
    pub quantity: i64,
}

impl StockLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        StockLine {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Outcome of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockUpdate {
    /// The decrement was committed.
    Applied { new_quantity: i64 },
    /// Stock was below the requested quantity at commit time; nothing changed.
    Insufficient { available: i64 },
    /// The product does not exist in that branch.
    Missing,
}

/// Outcome of deleting an order whose items are expected to be exactly a
/// known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDeletion {
    /// The order and exactly the expected items were removed.
    Deleted,
    /// The items differ from the expected set; nothing was removed.
    Changed,
    /// The order no longer exists.
    Missing,
}

/// A stock change addressed to a specific branch.
///
/// Carried by reconciliation errors so an operator can see exactly which
/// movement is outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub branch_id: String,
    pub product_id: String,
    /// Positive = stock that must be added back, negative = stock that must
    /// be removed.
    pub quantity_delta: i64,
}

impl fmt::Display for StockMovement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} {:+}",
            self.product_id, self.branch_id, self.quantity_delta
        )
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Lifecycle of an order.
///
/// Draft is implicit (an order being validated is never persisted), so the
/// only stored state is `Open`. `Deleted` is reported on the snapshot
/// returned by a delete; the rows themselves are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Open,
    Deleted,
}

/// A customer order and its ordered line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    /// Display code from the sequence generator, e.g. `ORD-branch-7-000042`.
    pub document_number: String,
    /// Numeric component of the document number (durable counter value).
    pub sequence_value: i64,
    pub branch_id: String,
    pub customer_code: Option<String>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub grand_total_cents: i64,
    pub status: OrderStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<OrderItem>,
}

impl Order {
    #[inline]
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }

    /// Stock lines reserved by this order, one per item.
    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items.iter().map(OrderItem::stock_line).collect()
    }
}

/// A line on an order.
///
/// Product code, name and price are snapshotted so the order keeps its
/// history even if the catalog changes later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    /// Position within the order, starting at 1.
    pub line_no: i64,
    pub product_id: String,
    pub product_code: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// `unit_price × quantity`.
    pub line_subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    /// `line_subtotal - discount + tax`.
    pub line_total_cents: i64,
    pub promotion_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn stock_line(&self) -> StockLine {
        StockLine::new(self.product_id.clone(), self.quantity)
    }
}

/// One requested line of a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: i64,
}

/// Input to order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub branch_id: String,
    pub customer_code: Option<String>,
    pub items: Vec<OrderLineRequest>,
}

// =============================================================================
// Stock Transfers
// =============================================================================

/// Status of an inter-branch stock transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl TransferStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Approved => "approved",
            TransferStatus::Rejected => "rejected",
        }
    }

    /// Approved and Rejected admit no further transition.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision that can be taken on a pending transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferAction {
    Approve,
    Reject,
}

impl fmt::Display for TransferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferAction::Approve => f.write_str("approve"),
            TransferAction::Reject => f.write_str("reject"),
        }
    }
}

/// An inter-branch stock transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockTransfer {
    pub id: String,
    pub document_number: String,
    pub sequence_value: i64,
    pub source_branch_id: String,
    pub destination_branch_id: String,
    pub status: TransferStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<TransferItem>,
}

impl StockTransfer {
    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items
            .iter()
            .map(|item| StockLine::new(item.product_id.clone(), item.quantity))
            .collect()
    }
}

/// A line of a transfer. Immutable once the transfer leaves Pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TransferItem {
    pub product_id: String,
    pub quantity: i64,
}

/// Input to transfer creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub source_branch_id: String,
    pub destination_branch_id: String,
    pub items: Vec<TransferItem>,
}

// =============================================================================
// Promotions
// =============================================================================

/// What a promotion takes off a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PromotionEffect {
    /// Percentage of the line subtotal, in basis points (1000 = 10%).
    PercentageBps(u32),
    /// Fixed amount per line, capped at the line subtotal.
    FixedCents(i64),
}

/// Which lines a promotion applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PromotionCondition {
    Always,
    /// Line quantity must be at least this value.
    MinQuantity(i64),
    /// Product category must match (case-insensitive).
    Category(String),
    /// Product id must match.
    Product(String),
}

/// A discount rule. Read-only input to order pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    pub name: String,
    pub effect: PromotionEffect,
    pub condition: PromotionCondition,
    pub active: bool,
    /// Inclusive start of the validity window; `None` = open.
    pub starts_at: Option<DateTime<Utc>>,
    /// Exclusive end of the validity window; `None` = open.
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Promotion {
    /// Whether the promotion is switched on and `now` is inside its window.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.starts_at.map_or(true, |start| start <= now)
            && self.ends_at.map_or(true, |end| now < end)
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// A stock movement the system could not apply or undo automatically.
///
/// Written when compensation fails or when a release targets a product that
/// has since been removed from the catalog. Operators resolve these by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReconciliationEntry {
    pub id: String,
    pub branch_id: String,
    pub product_id: String,
    pub quantity_delta: i64,
    /// Order id, transfer id or document number the movement belongs to.
    pub document_ref: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn promotion(active: bool) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: "promo-1".to_string(),
            name: "Ten off".to_string(),
            effect: PromotionEffect::PercentageBps(1000),
            condition: PromotionCondition::Always,
            active,
            starts_at: Some(now - Duration::days(1)),
            ends_at: Some(now + Duration::days(1)),
            created_at: now - Duration::days(2),
        }
    }

    #[test]
    fn test_promotion_window() {
        let promo = promotion(true);
        let now = Utc::now();
        assert!(promo.is_live(now));
        assert!(!promo.is_live(now + Duration::days(2)));
        assert!(!promo.is_live(now - Duration::days(2)));
        assert!(!promotion(false).is_live(now));
    }

    #[test]
    fn test_window_end_is_exclusive() {
        let mut promo = promotion(true);
        let end = Utc::now();
        promo.ends_at = Some(end);
        assert!(!promo.is_live(end));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(TransferStatus::Approved.is_terminal());
        assert!(TransferStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_movement_display() {
        let movement = StockMovement {
            branch_id: "branch-1".to_string(),
            product_id: "p-1".to_string(),
            quantity_delta: 3,
        };
        assert_eq!(movement.to_string(), "p-1@branch-1 +3");
    }

    #[test]
    fn test_effect_serialization() {
        let json = serde_json::to_string(&PromotionEffect::FixedCents(250)).unwrap();
        assert_eq!(json, r#"{"kind":"fixed_cents","value":250}"#);
    }
}
