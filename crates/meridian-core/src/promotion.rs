//! # Promotion Evaluator
//!
//! Computes the discount for each order line from the live promotions.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each line:                                                         │
//! │    candidates = promotions where                                        │
//! │        active  AND  starts_at <= now < ends_at  AND  condition(line)    │
//! │                                                                         │
//! │    discount(p) = PercentageBps(b) → round(subtotal × b / 10000)         │
//! │                  FixedCents(c)    → c                                   │
//! │                  (both capped to [0, subtotal])                         │
//! │                                                                         │
//! │    winner = max discount; equal discounts resolved by TieBreak          │
//! │    ONE promotion per line, never stacked                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pure: no stock, no promotion records are touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::money::Money;
use crate::types::{Promotion, PromotionCondition, PromotionEffect};

/// How to choose between promotions that give the same discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Earliest `created_at` wins, then lowest id.
    #[default]
    EarliestCreated,
    /// Latest `created_at` wins, then lowest id.
    LatestCreated,
}

impl TieBreak {
    /// Returns `true` if `candidate` should replace `current` on a tie.
    fn prefers(&self, candidate: &Promotion, current: &Promotion) -> bool {
        let by_created = match self {
            TieBreak::EarliestCreated => candidate.created_at.cmp(&current.created_at),
            TieBreak::LatestCreated => current.created_at.cmp(&candidate.created_at),
        };
        by_created.then_with(|| candidate.id.cmp(&current.id)) == Ordering::Less
    }
}

/// What the evaluator needs to know about a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionLine<'a> {
    pub product_id: &'a str,
    pub category: Option<&'a str>,
    pub quantity: i64,
    pub subtotal: Money,
}

/// The discount chosen for one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDiscount {
    /// Index of the line in the evaluator input.
    pub line_index: usize,
    /// `None` when no promotion gives a positive discount.
    pub promotion_id: Option<String>,
    pub amount: Money,
}

impl PromotionCondition {
    pub fn matches(&self, line: &PromotionLine<'_>) -> bool {
        match self {
            PromotionCondition::Always => true,
            PromotionCondition::MinQuantity(min) => line.quantity >= *min,
            PromotionCondition::Category(category) => line
                .category
                .is_some_and(|c| c.eq_ignore_ascii_case(category)),
            PromotionCondition::Product(product_id) => line.product_id == product_id,
        }
    }
}

impl PromotionEffect {
    /// Discount on a line subtotal, never negative and never above it.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        if subtotal.cents() <= 0 {
            return Money::zero();
        }
        let raw = match self {
            PromotionEffect::PercentageBps(bps) => subtotal.portion_bps(*bps),
            PromotionEffect::FixedCents(cents) => Money::from_cents((*cents).max(0)),
        };
        raw.min(subtotal)
    }
}

/// Chooses the best single promotion for every line.
///
/// Returns one entry per input line, in input order.
pub fn evaluate(
    lines: &[PromotionLine<'_>],
    promotions: &[Promotion],
    now: DateTime<Utc>,
    tie_break: TieBreak,
) -> Vec<LineDiscount> {
    let live: Vec<&Promotion> = promotions.iter().filter(|p| p.is_live(now)).collect();

    lines
        .iter()
        .enumerate()
        .map(|(line_index, line)| {
            let mut best: Option<(&Promotion, Money)> = None;

            for promo in live.iter().copied().filter(|p| p.condition.matches(line)) {
                let amount = promo.effect.discount_for(line.subtotal);
                if amount.is_zero() {
                    continue;
                }
                best = match best {
                    None => Some((promo, amount)),
                    Some((current, current_amount)) => {
                        let replace = amount > current_amount
                            || (amount == current_amount && tie_break.prefers(promo, current));
                        if replace {
                            Some((promo, amount))
                        } else {
                            Some((current, current_amount))
                        }
                    }
                };
            }

            match best {
                Some((promo, amount)) => LineDiscount {
                    line_index,
                    promotion_id: Some(promo.id.clone()),
                    amount,
                },
                None => LineDiscount {
                    line_index,
                    promotion_id: None,
                    amount: Money::zero(),
                },
            }
        })
        .collect()
}
