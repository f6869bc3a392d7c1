use crate::engine::{candidates::CandidateGenerator, fusion, rerank};
use crate::error::EngineError;
use crate::models::{
    AttributeFilters, FusionConfig, FusionStrategy, Interaction, Normalization, RequestKind,
};
use crate::services::catalog::CatalogSnapshot;
use crate::services::factors::FactorSnapshot;
use crate::services::index::IndexSnapshot;
use crate::utils::metrics::RankingMetrics;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationGrid {
    pub weights: Vec<(f32, f32)>,
    pub strategies: Vec<FusionStrategy>,
    pub normalization: Normalization,
    pub rrf_k: u32,
}

impl CalibrationGrid {
    /// `steps` evenly spaced values in [0, 1] per axis; the all-zero weight
    /// pair is skipped because it can never validate.
    pub fn evenly_spaced(steps: usize, strategies: Vec<FusionStrategy>) -> Self {
        let steps = steps.max(2);
        let values: Vec<f32> = (0..steps)
            .map(|i| i as f32 / (steps - 1) as f32)
            .collect();

        let mut weights = Vec::new();
        for &w_collab in &values {
            for &w_sem in &values {
                if w_collab == 0.0 && w_sem == 0.0 {
                    continue;
                }
                weights.push((w_collab, w_sem));
            }
        }

        Self {
            weights,
            strategies,
            normalization: Normalization::MinMax,
            rrf_k: 60,
        }
    }

    /// Grid points in declaration order; the order is the winner tie-break.
    pub fn configs(&self) -> Vec<FusionConfig> {
        let mut configs = Vec::with_capacity(self.strategies.len() * self.weights.len());
        for &strategy in &self.strategies {
            for &(weight_collaborative, weight_semantic) in &self.weights {
                configs.push(FusionConfig {
                    strategy,
                    weight_collaborative,
                    weight_semantic,
                    rrf_k: self.rrf_k,
                    normalization: self.normalization,
                    ..FusionConfig::default()
                });
            }
        }
        configs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridPointScore {
    pub config: FusionConfig,
    pub mean_ndcg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub k: usize,
    pub users_evaluated: usize,
    pub winner: FusionConfig,
    /// Every grid point's score, not just the winner's.
    pub grid: Vec<GridPointScore>,
}

/// Offline parameter search: runs the full generate → fuse → re-rank
/// pipeline per held-out user for every grid point and keeps the config with
/// the highest mean NDCG@k. Deterministic across runs: users are evaluated
/// in sorted key order and rayon only parallelizes an order-stable map.
#[allow(clippy::too_many_arguments)]
pub fn calibrate(
    factors: &FactorSnapshot,
    index: Option<&IndexSnapshot>,
    catalog: &CatalogSnapshot,
    eval_set: &[Interaction],
    grid: &CalibrationGrid,
    k: usize,
    candidate_pool: usize,
    history_profile_len: usize,
    relevance_threshold: f32,
) -> Result<CalibrationReport, EngineError> {
    let ground_truth = build_ground_truth(eval_set, relevance_threshold);
    if ground_truth.is_empty() {
        return Err(EngineError::InvalidFusionConfig(
            "calibration requires a non-empty evaluation set".to_string(),
        ));
    }

    let users: Vec<&String> = ground_truth.keys().collect();
    let metrics = RankingMetrics::new(k);
    let configs = grid.configs();

    info!(
        grid_points = configs.len(),
        users = users.len(),
        k,
        "Starting fusion calibration sweep"
    );

    let mut scored_grid = Vec::with_capacity(configs.len());
    for config in configs {
        config.validate()?;

        let ndcg_sum: f64 = users
            .par_iter()
            .map(|user_id| {
                evaluate_user(
                    factors,
                    index,
                    catalog,
                    user_id.as_str(),
                    &ground_truth[*user_id],
                    &config,
                    &metrics,
                    k,
                    candidate_pool,
                    history_profile_len,
                )
            })
            .sum();

        let mean_ndcg = ndcg_sum / users.len() as f64;
        info!(
            strategy = ?config.strategy,
            w_collab = config.weight_collaborative,
            w_sem = config.weight_semantic,
            mean_ndcg,
            "Evaluated grid point"
        );
        scored_grid.push(GridPointScore { config, mean_ndcg });
    }

    // strictly-greater keeps the earliest grid point on ties
    let mut winner = &scored_grid[0];
    for point in &scored_grid[1..] {
        if point.mean_ndcg > winner.mean_ndcg {
            winner = point;
        }
    }

    info!(
        strategy = ?winner.config.strategy,
        w_collab = winner.config.weight_collaborative,
        w_sem = winner.config.weight_semantic,
        mean_ndcg = winner.mean_ndcg,
        "Calibration winner selected"
    );

    Ok(CalibrationReport {
        k,
        users_evaluated: users.len(),
        winner: winner.config.clone(),
        grid: scored_grid,
    })
}

/// Relevant = held-out interactions at or above the rating threshold.
fn build_ground_truth(
    eval_set: &[Interaction],
    relevance_threshold: f32,
) -> BTreeMap<String, Vec<String>> {
    let mut ground_truth: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for interaction in eval_set {
        if interaction.rating >= relevance_threshold {
            let relevant = ground_truth.entry(interaction.user_id.clone()).or_default();
            if !relevant.contains(&interaction.product_id) {
                relevant.push(interaction.product_id.clone());
            }
        }
    }
    ground_truth
}

#[allow(clippy::too_many_arguments)]
fn evaluate_user(
    factors: &FactorSnapshot,
    index: Option<&IndexSnapshot>,
    catalog: &CatalogSnapshot,
    user_id: &str,
    relevant: &[String],
    config: &FusionConfig,
    metrics: &RankingMetrics,
    k: usize,
    candidate_pool: usize,
    history_profile_len: usize,
) -> f64 {
    let generator =
        CandidateGenerator::new(factors, index, catalog, candidate_pool, history_profile_len);

    let candidates = match generator.generate(&RequestKind::Recommendation {
        user_id: user_id.to_string(),
    }) {
        Ok(candidates) => candidates,
        // users missing from the factor snapshot simply score zero
        Err(_) => return 0.0,
    };

    let fused = fusion::fuse(&candidates, config);
    let exclude = catalog.seen_products(user_id);
    let results = rerank::rerank(
        &fused,
        catalog,
        &AttributeFilters::default(),
        &exclude,
        k,
        false,
        1.0,
        index,
    );

    let recommended: Vec<String> = results.into_iter().map(|r| r.product_id).collect();
    metrics.ndcg_at_k(&recommended, relevant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FactorArtifact;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn factors() -> FactorSnapshot {
        // U1 prefers the first axis, U2 the second; P1/P2 sit on opposite axes
        let mut user_factors = HashMap::new();
        user_factors.insert("U1".to_string(), vec![1.0, 0.0]);
        user_factors.insert("U2".to_string(), vec![0.0, 1.0]);

        let mut product_factors = HashMap::new();
        product_factors.insert("P1".to_string(), vec![1.0, 0.0]);
        product_factors.insert("P2".to_string(), vec![0.0, 1.0]);
        product_factors.insert("P3".to_string(), vec![0.5, 0.5]);

        FactorSnapshot::from_artifact(FactorArtifact {
            version: Uuid::new_v4(),
            dimension: 2,
            user_factors,
            product_factors,
            popularity: HashMap::new(),
            trained_at: Utc::now(),
        })
        .unwrap()
    }

    fn eval_set() -> Vec<Interaction> {
        let interaction = |user: &str, product: &str, rating: f32| Interaction {
            user_id: user.to_string(),
            product_id: product.to_string(),
            rating,
            timestamp: Utc::now(),
        };
        vec![
            interaction("U1", "P1", 5.0),
            interaction("U2", "P2", 5.0),
            interaction("U2", "P3", 2.0), // below threshold, not relevant
        ]
    }

    #[test]
    fn test_ground_truth_threshold() {
        let truth = build_ground_truth(&eval_set(), 4.0);
        assert_eq!(truth.len(), 2);
        assert_eq!(truth["U2"], vec!["P2".to_string()]);
    }

    #[test]
    fn test_grid_skips_all_zero_pair() {
        let grid = CalibrationGrid::evenly_spaced(3, vec![FusionStrategy::WeightedSum]);
        assert_eq!(grid.weights.len(), 8);
        assert!(grid.weights.iter().all(|&(a, b)| a > 0.0 || b > 0.0));
    }

    #[test]
    fn test_calibration_is_repeatable() {
        let factors = factors();
        let catalog = CatalogSnapshot::empty();
        let grid = CalibrationGrid::evenly_spaced(3, vec![FusionStrategy::WeightedSum]);
        let eval = eval_set();

        let first = calibrate(&factors, None, &catalog, &eval, &grid, 10, 50, 10, 4.0).unwrap();
        for _ in 0..3 {
            let run = calibrate(&factors, None, &catalog, &eval, &grid, 10, 50, 10, 4.0).unwrap();
            assert_eq!(run.winner.weight_collaborative, first.winner.weight_collaborative);
            assert_eq!(run.winner.weight_semantic, first.winner.weight_semantic);
            for (a, b) in run.grid.iter().zip(first.grid.iter()) {
                assert_eq!(a.mean_ndcg, b.mean_ndcg);
            }
        }

        // collaborative-only data: any point with collaborative weight ranks
        // perfectly, and the earliest such point wins the tie
        assert_eq!(first.grid.len(), 8);
        assert!(first.winner.validate().is_ok());
        let winner_score = first
            .grid
            .iter()
            .find(|p| {
                p.config.weight_collaborative == first.winner.weight_collaborative
                    && p.config.weight_semantic == first.winner.weight_semantic
            })
            .unwrap()
            .mean_ndcg;
        assert!((winner_score - 1.0).abs() < 1e-9);
        assert_eq!(first.winner.weight_collaborative, 0.5);
        assert_eq!(first.winner.weight_semantic, 0.0);
    }

    #[test]
    fn test_empty_eval_set_rejected() {
        let factors = factors();
        let catalog = CatalogSnapshot::empty();
        let grid = CalibrationGrid::evenly_spaced(2, vec![FusionStrategy::WeightedSum]);

        assert!(calibrate(&factors, None, &catalog, &[], &grid, 10, 50, 10, 4.0).is_err());
    }
}
