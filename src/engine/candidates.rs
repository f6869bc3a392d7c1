use crate::error::EngineError;
use crate::models::{Candidate, RequestKind};
use crate::services::catalog::CatalogSnapshot;
use crate::services::factors::FactorSnapshot;
use crate::services::index::IndexSnapshot;
use crate::utils::take_top_by_score;
use std::collections::BTreeMap;

/// Merges collaborative and semantic candidates for one request. Pure
/// function of the snapshots it is handed; holds no state of its own.
pub struct CandidateGenerator<'a> {
    factors: &'a FactorSnapshot,
    index: Option<&'a IndexSnapshot>,
    catalog: &'a CatalogSnapshot,
    pool: usize,
    history_profile_len: usize,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(
        factors: &'a FactorSnapshot,
        index: Option<&'a IndexSnapshot>,
        catalog: &'a CatalogSnapshot,
        pool: usize,
        history_profile_len: usize,
    ) -> Self {
        Self {
            factors,
            index,
            catalog,
            pool,
            history_profile_len,
        }
    }

    /// The candidate mapping is a `BTreeMap` so downstream iteration order is
    /// deterministic. Every candidate carries at least one present score.
    pub fn generate(&self, kind: &RequestKind) -> Result<BTreeMap<String, Candidate>, EngineError> {
        match kind {
            RequestKind::Recommendation { user_id } => self.recommendation_candidates(user_id),
            RequestKind::Search {
                query_embedding,
                with_popularity,
            } => self.search_candidates(query_embedding, *with_popularity),
            RequestKind::Popularity => Ok(self.popularity_candidates()),
        }
    }

    fn recommendation_candidates(
        &self,
        user_id: &str,
    ) -> Result<BTreeMap<String, Candidate>, EngineError> {
        let user_factors = self
            .factors
            .user_factors(user_id)
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))?;

        let scored: Vec<(String, f32)> = self
            .factors
            .product_factors_iter()
            .map(|(product_id, product_factors)| {
                (product_id.clone(), user_factors.dot(product_factors))
            })
            .collect();

        let mut candidates = BTreeMap::new();
        for (product_id, score) in take_top_by_score(scored, self.pool) {
            candidates.insert(
                product_id.clone(),
                Candidate::from_collaborative(product_id, score),
            );
        }

        // Semantic channel only when the index is loaded and the user has
        // enough history to form a representative embedding.
        if let Some(index) = self.index {
            let history = self.catalog.recent_history(user_id, self.history_profile_len);
            if let Some(profile) = index.mean_embedding(history) {
                for (product_id, score) in index.nearest(&profile, self.pool)? {
                    candidates
                        .entry(product_id.clone())
                        .and_modify(|c| c.semantic = Some(score))
                        .or_insert_with(|| Candidate::from_semantic(product_id, score));
                }
            }
        }

        Ok(candidates)
    }

    fn search_candidates(
        &self,
        query_embedding: &[f32],
        with_popularity: bool,
    ) -> Result<BTreeMap<String, Candidate>, EngineError> {
        let index = self.index.ok_or(EngineError::IndexUnavailable)?;

        let mut candidates = BTreeMap::new();
        for (product_id, score) in index.nearest(query_embedding, self.pool)? {
            candidates.insert(
                product_id.clone(),
                Candidate::from_semantic(product_id, score),
            );
        }

        // Popularity fills the collaborative channel only for products the
        // semantic query already surfaced; it re-ranks, it does not expand.
        if with_popularity {
            for (product_id, score) in self.factors.popularity_iter() {
                if let Some(candidate) = candidates.get_mut(product_id) {
                    candidate.collaborative = Some(score);
                }
            }
        }

        Ok(candidates)
    }

    fn popularity_candidates(&self) -> BTreeMap<String, Candidate> {
        let scored: Vec<(String, f32)> = self
            .factors
            .popularity_iter()
            .map(|(product_id, score)| (product_id.clone(), score))
            .collect();

        take_top_by_score(scored, self.pool)
            .into_iter()
            .map(|(product_id, score)| {
                (
                    product_id.clone(),
                    Candidate::from_collaborative(product_id, score),
                )
            })
            .collect()
    }
}
