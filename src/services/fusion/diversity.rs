//! Layer-diversity rescoring.

use crate::models::{LayerId, ScoredItem};
use std::collections::HashMap;

/// Penalizes layers that dominate the ranking.
///
/// Walking items in descending score order, each score is multiplied by
/// `max(0, 1 - penalty * ln(1 + n))` where `n` is the number of items from the
/// same layer already seen. The first item of each layer is untouched.
/// Returns the items re-sorted by the adjusted score.
#[must_use]
pub fn apply_diversity(mut items: Vec<ScoredItem>, penalty: f32) -> Vec<ScoredItem> {
    items.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen: HashMap<LayerId, u32> = HashMap::new();
    for item in &mut items {
        let prior = seen.entry(item.item.layer).or_insert(0);
        #[allow(clippy::cast_precision_loss)]
        let factor = penalty.mul_add(-(*prior as f32).ln_1p(), 1.0).max(0.0);
        item.score *= factor;
        *prior += 1;
    }

    items.sort_by(|a, b| b.score.total_cmp(&a.score));
    items
}
