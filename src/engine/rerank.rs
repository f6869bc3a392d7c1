use crate::models::{AttributeFilters, RankedResult};
use crate::services::catalog::CatalogSnapshot;
use crate::services::index::IndexSnapshot;
use std::collections::{BTreeMap, HashSet};

/// Filters, orders, and optionally diversifies fused scores into the final
/// ranking. Never pads and never errors on an empty survivor set.
#[allow(clippy::too_many_arguments)]
pub fn rerank(
    fused: &BTreeMap<String, f32>,
    catalog: &CatalogSnapshot,
    filters: &AttributeFilters,
    exclude: &HashSet<String>,
    top_k: usize,
    diversify: bool,
    mmr_lambda: f32,
    index: Option<&IndexSnapshot>,
) -> Vec<RankedResult> {
    let mut survivors: Vec<(&String, f32)> = fused
        .iter()
        .filter(|(product_id, _)| !exclude.contains(*product_id))
        .filter(|(product_id, _)| filters.matches(catalog.product(product_id)))
        .map(|(product_id, score)| (product_id, *score))
        .collect();

    // Total order: score descending, product key ascending on ties.
    survivors.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let selected = if diversify {
        mmr_select(survivors, top_k, mmr_lambda, index)
    } else {
        survivors.truncate(top_k);
        survivors
            .into_iter()
            .map(|(id, score)| (id.clone(), score))
            .collect()
    };

    selected
        .into_iter()
        .enumerate()
        .map(|(i, (product_id, score))| RankedResult {
            product_id,
            score,
            rank: i + 1,
        })
        .collect()
}

struct MmrEntry<'a> {
    product_id: &'a String,
    relevance: f32,
    /// Running max similarity to the already-selected set, updated in place
    /// after each pick instead of recomputed from scratch.
    max_similarity: f32,
}

/// Maximal Marginal Relevance: greedily pick the candidate maximizing
/// `lambda * relevance - (1 - lambda) * max_similarity(candidate, selected)`.
fn mmr_select(
    survivors: Vec<(&String, f32)>,
    top_k: usize,
    lambda: f32,
    index: Option<&IndexSnapshot>,
) -> Vec<(String, f32)> {
    let mut remaining: Vec<MmrEntry> = survivors
        .into_iter()
        .map(|(product_id, relevance)| MmrEntry {
            product_id,
            relevance,
            max_similarity: 0.0,
        })
        .collect();

    let mut selected = Vec::with_capacity(top_k.min(remaining.len()));
    while selected.len() < top_k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (i, entry) in remaining.iter().enumerate() {
            let score = lambda * entry.relevance - (1.0 - lambda) * entry.max_similarity;
            // strict comparison: earlier entries (already in relevance order)
            // win ties, keeping selection deterministic
            if score > best_score {
                best_score = score;
                best_idx = i;
            }
        }

        let chosen = remaining.remove(best_idx);

        // Only the newly selected item can raise a running max.
        if let Some(index) = index {
            for entry in &mut remaining {
                if let Some(similarity) = index.similarity(entry.product_id, chosen.product_id) {
                    entry.max_similarity = entry.max_similarity.max(similarity);
                }
            }
        }

        selected.push((chosen.product_id.clone(), chosen.relevance));
    }

    selected
}
