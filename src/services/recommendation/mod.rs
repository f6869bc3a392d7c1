use crate::config::Config;
use crate::engine::calibration::{self, CalibrationGrid, CalibrationReport};
use crate::engine::{fusion, rerank, CandidateGenerator};
use crate::error::EngineError;
use crate::models::*;
use crate::services::catalog::ProductCatalog;
use crate::services::factors::FactorStore;
use crate::services::index::EmbeddingIndex;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Holds the active fusion configuration behind an atomic pointer swap.
/// Readers clone the `Arc`; a request fuses against exactly one config.
pub struct ConfigStore {
    active: RwLock<Arc<FusionConfig>>,
}

impl ConfigStore {
    pub fn new(initial: FusionConfig) -> Result<Self, EngineError> {
        initial.validate()?;
        Ok(Self {
            active: RwLock::new(Arc::new(initial)),
        })
    }

    pub fn active(&self) -> Arc<FusionConfig> {
        self.active.read().clone()
    }

    /// Rejects malformed configs before they can become active.
    pub fn swap(&self, config: FusionConfig) -> Result<(), EngineError> {
        config.validate()?;
        let version = config.version;
        *self.active.write() = Arc::new(config);
        info!(%version, "Swapped active fusion config");
        Ok(())
    }
}

pub struct RecommendationService {
    factors: Arc<FactorStore>,
    index: Arc<EmbeddingIndex>,
    catalog: Arc<ProductCatalog>,
    config_store: Arc<ConfigStore>,
    config: Arc<Config>,
    serving_stats: Arc<DashMap<String, u64>>,
}

impl RecommendationService {
    pub fn new(
        factors: Arc<FactorStore>,
        index: Arc<EmbeddingIndex>,
        catalog: Arc<ProductCatalog>,
        config: Arc<Config>,
    ) -> Result<Self, EngineError> {
        let config_store = Arc::new(ConfigStore::new(config.engine.default_fusion_config())?);

        Ok(Self {
            factors,
            index,
            catalog,
            config_store,
            config,
            serving_stats: Arc::new(DashMap::new()),
        })
    }

    pub fn config_store(&self) -> Arc<ConfigStore> {
        self.config_store.clone()
    }

    /// Personalized recommendations. Fails with `UnknownUser` when the user
    /// has no latent factors; callers fall back to `recommend_popular`.
    pub async fn recommend(
        &self,
        request: &RecommendRequest,
    ) -> Result<Vec<RankedResult>, EngineError> {
        self.increment_stat("recommend_requests");

        // One consistent view for the whole request, regardless of
        // concurrent artifact swaps.
        let factors = self.factors.snapshot();
        let index = self.index.try_snapshot();
        let catalog = self.catalog.snapshot();
        let fusion_config = self.config_store.active();

        let generator = CandidateGenerator::new(
            &factors,
            index.as_deref(),
            &catalog,
            self.config.engine.candidate_pool,
            self.config.engine.history_profile_len,
        );
        let candidates = generator.generate(&RequestKind::Recommendation {
            user_id: request.user_id.clone(),
        })?;

        let fused = fusion::fuse(&candidates, &fusion_config);

        let exclude = if request.exclude_seen {
            catalog.seen_products(&request.user_id)
        } else {
            HashSet::new()
        };

        let results = rerank::rerank(
            &fused,
            &catalog,
            &request.filters,
            &exclude,
            request.top_k,
            request.diversify,
            self.config.engine.mmr_lambda,
            index.as_deref(),
        );

        self.increment_stat("recommend_served");
        info!(
            user_id = %request.user_id,
            count = results.len(),
            diversify = request.diversify,
            "Recommendations generated"
        );
        Ok(results)
    }

    /// Free-text semantic search against a pre-embedded query.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filters: &AttributeFilters,
    ) -> Result<Vec<RankedResult>, EngineError> {
        self.increment_stat("search_requests");

        let factors = self.factors.snapshot();
        let index = self.index.snapshot()?;
        let catalog = self.catalog.snapshot();
        let fusion_config = self.config_store.active();

        let generator = CandidateGenerator::new(
            &factors,
            Some(&index),
            &catalog,
            self.config.index.top_m,
            self.config.engine.history_profile_len,
        );
        let candidates = generator.generate(&RequestKind::Search {
            query_embedding: query_embedding.to_vec(),
            with_popularity: false,
        })?;

        let fused = fusion::fuse(&candidates, &fusion_config);
        let results = rerank::rerank(
            &fused,
            &catalog,
            filters,
            &HashSet::new(),
            top_k,
            false,
            self.config.engine.mmr_lambda,
            Some(&index),
        );

        self.increment_stat("search_served");
        info!(count = results.len(), "Search completed");
        Ok(results)
    }

    /// Popularity-only ranking, the fallback path for unknown users.
    pub async fn recommend_popular(
        &self,
        top_k: usize,
        filters: &AttributeFilters,
    ) -> Result<Vec<RankedResult>, EngineError> {
        self.increment_stat("popularity_requests");

        let factors = self.factors.snapshot();
        let catalog = self.catalog.snapshot();
        let fusion_config = self.config_store.active();

        let generator = CandidateGenerator::new(
            &factors,
            None,
            &catalog,
            self.config.engine.candidate_pool,
            self.config.engine.history_profile_len,
        );
        let candidates = generator.generate(&RequestKind::Popularity)?;

        let fused = fusion::fuse(&candidates, &fusion_config);
        Ok(rerank::rerank(
            &fused,
            &catalog,
            filters,
            &HashSet::new(),
            top_k,
            false,
            self.config.engine.mmr_lambda,
            None,
        ))
    }

    /// Nearest neighbors of an existing product, the product itself removed.
    pub async fn similar_products(
        &self,
        product_id: &str,
        top_k: usize,
    ) -> Result<Vec<RankedResult>, EngineError> {
        let index = self.index.snapshot()?;

        let Some(embedding) = index.embedding(product_id) else {
            return Ok(Vec::new());
        };

        let neighbors = index.nearest(embedding.as_slice(), top_k + 1)?;
        Ok(neighbors
            .into_iter()
            .filter(|(id, _)| id != product_id)
            .take(top_k)
            .enumerate()
            .map(|(i, (id, score))| RankedResult {
                product_id: id,
                score,
                rank: i + 1,
            })
            .collect())
    }

    /// Offline calibration entry point: sweeps the grid against the held-out
    /// set, swaps the winner into the active config, and returns the full
    /// report for auditing.
    pub async fn calibrate(
        &self,
        eval_set: &[Interaction],
        grid: &CalibrationGrid,
    ) -> Result<CalibrationReport, EngineError> {
        let factors = self.factors.snapshot();
        let index = self.index.try_snapshot();
        let catalog = self.catalog.snapshot();

        let report = calibration::calibrate(
            &factors,
            index.as_deref(),
            &catalog,
            eval_set,
            grid,
            self.config.calibration.k,
            self.config.engine.candidate_pool,
            self.config.engine.history_profile_len,
            self.config.calibration.relevance_threshold,
        )?;

        self.config_store.swap(report.winner.clone())?;
        Ok(report)
    }

    pub fn swap_config(&self, config: FusionConfig) -> Result<(), EngineError> {
        self.config_store.swap(config)
    }

    pub fn enrich(&self, results: Vec<RankedResult>) -> Vec<RecommendedProduct> {
        let catalog = self.catalog.snapshot();
        results
            .into_iter()
            .map(|result| {
                let product = catalog.product(&result.product_id);
                RecommendedProduct {
                    name: product.map(|p| p.name.clone()).unwrap_or_default(),
                    category: product.map(|p| p.category.clone()).unwrap_or_default(),
                    avg_rating: product.map(|p| p.avg_rating).unwrap_or(0.0),
                    total_interactions: product.map(|p| p.total_interactions).unwrap_or(0),
                    product_id: result.product_id,
                    score: result.score,
                    rank: result.rank,
                }
            })
            .collect()
    }

    pub fn serving_stats(&self) -> std::collections::HashMap<String, u64> {
        self.serving_stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    fn increment_stat(&self, key: &str) {
        let mut counter = self.serving_stats.entry(key.to_string()).or_insert(0);
        *counter += 1;
    }
}
