//! # Order Pricing
//!
//! Prices order lines and recomputes order totals.
//!
//! ## Line Math
//! ```text
//!   subtotal = unit_price × quantity
//!   discount = best promotion (see promotion.rs), 0 <= discount <= subtotal
//!   tax      = (subtotal - discount) × tax_rate, rounded half up
//!   total    = subtotal - discount + tax
//!
//!   order.subtotal    = Σ line.subtotal
//!   order.discount    = Σ line.discount
//!   order.tax         = Σ line.tax
//!   order.grand_total = order.subtotal - order.discount + order.tax
//! ```
//!
//! Totals are always derived from the stored lines, never adjusted
//! incrementally, so an item removal cannot drift them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::promotion::{evaluate, PromotionLine, TieBreak};
use crate::types::{Order, OrderItem, Product, Promotion, TaxRate};

/// Monetary amounts of one priced line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineAmounts {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

impl LineAmounts {
    pub fn compute(unit_price: Money, quantity: i64, discount: Money, tax_rate: TaxRate) -> Self {
        let subtotal = unit_price.multiply_quantity(quantity);
        let discount = discount.min(subtotal);
        let tax = (subtotal - discount).calculate_tax(tax_rate);
        LineAmounts {
            subtotal,
            discount,
            tax,
            total: subtotal - discount + tax,
        }
    }
}

/// A line ready to become an `OrderItem`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: String,
    pub product_code: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub amounts: LineAmounts,
    pub promotion_id: Option<String>,
}

/// Prices requested lines against their products and the live promotions.
///
/// `lines` pairs each product with the requested quantity; the result keeps
/// the input order.
pub fn price_lines(
    lines: &[(&Product, i64)],
    promotions: &[Promotion],
    now: DateTime<Utc>,
    tie_break: TieBreak,
) -> Vec<PricedLine> {
    let promo_lines: Vec<PromotionLine<'_>> = lines
        .iter()
        .map(|(product, quantity)| PromotionLine {
            product_id: &product.id,
            category: product.category.as_deref(),
            quantity: *quantity,
            subtotal: product.sale_price().multiply_quantity(*quantity),
        })
        .collect();

    let discounts = evaluate(&promo_lines, promotions, now, tie_break);

    lines
        .iter()
        .zip(discounts)
        .map(|((product, quantity), discount)| PricedLine {
            product_id: product.id.clone(),
            product_code: product.code.clone(),
            product_name: product.name.clone(),
            quantity: *quantity,
            unit_price: product.sale_price(),
            amounts: LineAmounts::compute(
                product.sale_price(),
                *quantity,
                discount.amount,
                product.tax_rate(),
            ),
            promotion_id: discount.promotion_id,
        })
        .collect()
}

/// Aggregate amounts of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub grand_total: Money,
}

impl OrderTotals {
    fn from_amounts(amounts: impl Iterator<Item = LineAmounts>) -> Self {
        let mut totals = OrderTotals::default();
        for line in amounts {
            totals.subtotal += line.subtotal;
            totals.discount += line.discount;
            totals.tax += line.tax;
        }
        totals.grand_total = totals.subtotal - totals.discount + totals.tax;
        totals
    }

    pub fn from_priced(lines: &[PricedLine]) -> Self {
        Self::from_amounts(lines.iter().map(|l| l.amounts))
    }

    /// Totals of stored items. An empty slice yields all zeros.
    pub fn from_items(items: &[OrderItem]) -> Self {
        Self::from_amounts(items.iter().map(|item| LineAmounts {
            subtotal: Money::from_cents(item.line_subtotal_cents),
            discount: Money::from_cents(item.discount_cents),
            tax: Money::from_cents(item.tax_cents),
            total: Money::from_cents(item.line_total_cents),
        }))
    }

    /// Writes these totals onto an order.
    pub fn apply_to(&self, order: &mut Order) {
        order.subtotal_cents = self.subtotal.cents();
        order.discount_cents = self.discount.cents();
        order.tax_cents = self.tax.cents();
        order.grand_total_cents = self.grand_total.cents();
    }
}
