// 📊 Aggregation & Ranking - Totals rolled up from line items
// All functions here are pure and recomputed on every read. Nothing is
// cached, so registry mutations never have to invalidate anything.

use crate::document::{Category, Document, Item};
use crate::formula::evaluate_item;
use std::cmp::Ordering;

// ============================================================================
// TOTALS
// ============================================================================

/// Line total for one item (formula over its row, 0 on any failure)
pub fn item_total(item: &Item, category: &Category) -> f64 {
    evaluate_item(item, category)
}

/// Sum of line totals; 0 for an empty category
pub fn category_total(category: &Category) -> f64 {
    category
        .items
        .iter()
        .map(|item| item_total(item, category))
        .sum()
}

/// Sum of category totals across the whole document side
pub fn grand_total(categories: &[Category]) -> f64 {
    categories.iter().map(category_total).sum()
}

impl Document {
    pub fn grand_total(&self) -> f64 {
        grand_total(&self.categories)
    }
}

// ============================================================================
// RANKING
// ============================================================================

/// One entry in a top-N list
#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem {
    pub name: String,
    pub total: f64,
    pub category_name: String,
}

/// Top `n` items across every category, by line total descending
///
/// Ties keep their flatten order (categories in document order, items
/// in category order), which a stable sort preserves.
pub fn top_n(categories: &[Category], n: usize) -> Vec<RankedItem> {
    let mut ranked: Vec<RankedItem> = categories
        .iter()
        .flat_map(|category| {
            category.items.iter().map(move |item| RankedItem {
                name: item.name.clone(),
                total: item_total(item, category),
                category_name: category.name.clone(),
            })
        })
        .collect();

    // Totals are never NaN (evaluate_item clamps), so the comparison is total
    ranked.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(Ordering::Equal));
    ranked.truncate(n);
    ranked
}

// ============================================================================
// TESTS
// ============================================================================
