use crate::models::{Candidate, FusionConfig, FusionStrategy, Normalization};
use std::collections::{BTreeMap, HashMap};

/// Combine per-source raw scores into one fused score per product. Pure: the
/// same candidates and config always produce bit-identical output.
pub fn fuse(
    candidates: &BTreeMap<String, Candidate>,
    config: &FusionConfig,
) -> BTreeMap<String, f32> {
    match config.strategy {
        FusionStrategy::WeightedSum => weighted_sum(candidates, config),
        FusionStrategy::ReciprocalRankFusion => reciprocal_rank_fusion(candidates, config),
    }
}

fn weighted_sum(
    candidates: &BTreeMap<String, Candidate>,
    config: &FusionConfig,
) -> BTreeMap<String, f32> {
    let collaborative = normalize_source(
        candidates
            .values()
            .filter_map(|c| c.collaborative.map(|s| (c.product_id.clone(), s)))
            .collect(),
        config.normalization,
    );
    let semantic = normalize_source(
        candidates
            .values()
            .filter_map(|c| c.semantic.map(|s| (c.product_id.clone(), s)))
            .collect(),
        config.normalization,
    );

    let mut fused = BTreeMap::new();
    for (product_id, candidate) in candidates {
        let mut acc = 0.0f32;
        let mut applied_weight = 0.0f32;

        // A missing source contributes no weight; the sum is re-normalized
        // over the sources actually present for this candidate.
        if candidate.collaborative.is_some() {
            acc += config.weight_collaborative * collaborative[product_id];
            applied_weight += config.weight_collaborative;
        }
        if candidate.semantic.is_some() {
            acc += config.weight_semantic * semantic[product_id];
            applied_weight += config.weight_semantic;
        }

        let score = if applied_weight > 0.0 {
            acc / applied_weight
        } else {
            0.0
        };
        fused.insert(product_id.clone(), score);
    }

    fused
}

fn reciprocal_rank_fusion(
    candidates: &BTreeMap<String, Candidate>,
    config: &FusionConfig,
) -> BTreeMap<String, f32> {
    let collaborative_ranks = source_ranks(
        candidates
            .values()
            .filter_map(|c| c.collaborative.map(|s| (c.product_id.clone(), s)))
            .collect(),
    );
    let semantic_ranks = source_ranks(
        candidates
            .values()
            .filter_map(|c| c.semantic.map(|s| (c.product_id.clone(), s)))
            .collect(),
    );

    let k = config.rrf_k as f32;
    let mut fused = BTreeMap::new();
    for product_id in candidates.keys() {
        let mut score = 0.0f32;
        if let Some(rank) = collaborative_ranks.get(product_id) {
            score += 1.0 / (k + *rank as f32);
        }
        if let Some(rank) = semantic_ranks.get(product_id) {
            score += 1.0 / (k + *rank as f32);
        }
        fused.insert(product_id.clone(), score);
    }

    fused
}

/// 1-based rank per source, score descending, ties broken by product key
/// ascending.
fn source_ranks(mut scored: Vec<(String, f32)>) -> HashMap<String, usize> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored
        .into_iter()
        .enumerate()
        .map(|(i, (product_id, _))| (product_id, i + 1))
        .collect()
}

/// Normalizes one source's raw scores across the candidate set. A source
/// with zero variance (including a single candidate) maps everything to the
/// 0.5 midpoint instead of dividing by zero.
fn normalize_source(scored: Vec<(String, f32)>, method: Normalization) -> HashMap<String, f32> {
    if scored.is_empty() {
        return HashMap::new();
    }

    match method {
        Normalization::MinMax => {
            let min = scored.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
            let max = scored
                .iter()
                .map(|(_, s)| *s)
                .fold(f32::NEG_INFINITY, f32::max);

            if max == min {
                return scored.into_iter().map(|(id, _)| (id, 0.5)).collect();
            }
            scored
                .into_iter()
                .map(|(id, s)| (id, (s - min) / (max - min)))
                .collect()
        }
        Normalization::ZScore => {
            let n = scored.len() as f32;
            let mean: f32 = scored.iter().map(|(_, s)| *s).sum::<f32>() / n;
            let variance: f32 = scored.iter().map(|(_, s)| (s - mean).powi(2)).sum::<f32>() / n;
            let std_dev = variance.sqrt();

            if std_dev == 0.0 {
                return scored.into_iter().map(|(id, _)| (id, 0.5)).collect();
            }
            scored
                .into_iter()
                .map(|(id, s)| (id, (s - mean) / std_dev))
                .collect()
        }
    }
}
