use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub avg_rating: f32,
    pub total_interactions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: String,
    pub product_id: String,
    pub rating: f32,
    pub timestamp: DateTime<Utc>,
}

/// Per-request candidate. A missing source score stays `None`; fusion must
/// never read it as zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub product_id: String,
    pub collaborative: Option<f32>,
    pub semantic: Option<f32>,
}

impl Candidate {
    pub fn from_collaborative(product_id: String, score: f32) -> Self {
        Self {
            product_id,
            collaborative: Some(score),
            semantic: None,
        }
    }

    pub fn from_semantic(product_id: String, score: f32) -> Self {
        Self {
            product_id,
            collaborative: None,
            semantic: Some(score),
        }
    }

    pub fn has_score(&self) -> bool {
        self.collaborative.is_some() || self.semantic.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    WeightedSum,
    ReciprocalRankFusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    MinMax,
    ZScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub version: Uuid,
    pub strategy: FusionStrategy,
    pub weight_collaborative: f32,
    pub weight_semantic: f32,
    pub rrf_k: u32,
    pub normalization: Normalization,
    pub created_at: DateTime<Utc>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            version: Uuid::new_v4(),
            strategy: FusionStrategy::WeightedSum,
            weight_collaborative: 0.5,
            weight_semantic: 0.5,
            rrf_k: 60,
            normalization: Normalization::MinMax,
            created_at: Utc::now(),
        }
    }
}

impl FusionConfig {
    /// Checked at load/swap time; a config that passes here is never
    /// re-validated per request.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.weight_collaborative < 0.0 || self.weight_semantic < 0.0 {
            return Err(EngineError::InvalidFusionConfig(format!(
                "weights must be non-negative, got ({}, {})",
                self.weight_collaborative, self.weight_semantic
            )));
        }
        if self.weight_collaborative == 0.0 && self.weight_semantic == 0.0 {
            return Err(EngineError::InvalidFusionConfig(
                "at least one weight must be positive".to_string(),
            ));
        }
        if !self.weight_collaborative.is_finite() || !self.weight_semantic.is_finite() {
            return Err(EngineError::InvalidFusionConfig(
                "weights must be finite".to_string(),
            ));
        }
        if self.rrf_k == 0 {
            return Err(EngineError::InvalidFusionConfig(
                "rrf_k must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub product_id: String,
    pub score: f32,
    pub rank: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedProduct {
    pub product_id: String,
    pub score: f32,
    pub rank: usize,
    pub name: String,
    pub category: String,
    pub avg_rating: f32,
    pub total_interactions: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeFilters {
    pub category: Option<String>,
    pub min_rating: Option<f32>,
    pub min_interactions: Option<u64>,
}

impl AttributeFilters {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.min_rating.is_none() && self.min_interactions.is_none()
    }

    /// A candidate with no catalog record passes only when no filters are set.
    pub fn matches(&self, product: Option<&Product>) -> bool {
        if self.is_empty() {
            return true;
        }
        let Some(product) = product else {
            return false;
        };
        if let Some(ref category) = self.category {
            if &product.category != category {
                return false;
            }
        }
        if let Some(min_rating) = self.min_rating {
            if product.avg_rating < min_rating {
                return false;
            }
        }
        if let Some(min_interactions) = self.min_interactions {
            if product.total_interactions < min_interactions {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendRequest {
    pub user_id: String,
    pub top_k: usize,
    pub exclude_seen: bool,
    pub diversify: bool,
    #[serde(default)]
    pub filters: AttributeFilters,
}

/// Dispatched once at the candidate generator boundary.
#[derive(Debug, Clone)]
pub enum RequestKind {
    Recommendation { user_id: String },
    Search { query_embedding: Vec<f32>, with_popularity: bool },
    Popularity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorArtifact {
    pub version: Uuid,
    pub dimension: usize,
    pub user_factors: HashMap<String, Vec<f32>>,
    pub product_factors: HashMap<String, Vec<f32>>,
    pub popularity: HashMap<String, f32>,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingArtifact {
    pub version: Uuid,
    pub model_id: String,
    pub dimension: usize,
    pub generated_at: DateTime<Utc>,
    pub embeddings: HashMap<String, Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogArtifact {
    pub products: Vec<Product>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}
