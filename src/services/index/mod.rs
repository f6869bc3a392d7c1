use crate::error::EngineError;
use crate::models::EmbeddingArtifact;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use nalgebra::DVector;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn nearest(&self, query: &[f32], top_m: usize) -> Result<Vec<(String, f32)>, EngineError>;
}

/// One embedding version. Vectors are L2-normalized at load so the inner
/// product below is cosine similarity.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub version: Uuid,
    pub model_id: String,
    pub dimension: usize,
    pub generated_at: DateTime<Utc>,
    embeddings: HashMap<String, DVector<f32>>,
}

impl IndexSnapshot {
    pub fn from_artifact(artifact: EmbeddingArtifact) -> Result<Self> {
        let dimension = artifact.dimension;

        let mut embeddings = HashMap::with_capacity(artifact.embeddings.len());
        for (product_id, vector) in artifact.embeddings {
            if vector.len() != dimension {
                anyhow::bail!(
                    "product {} embedding dimension mismatch: expected {}, got {}",
                    product_id,
                    dimension,
                    vector.len()
                );
            }
            let vector = DVector::from_vec(crate::utils::normalize_vector_copy(&vector));
            embeddings.insert(product_id, vector);
        }

        Ok(Self {
            version: artifact.version,
            model_id: artifact.model_id,
            dimension,
            generated_at: artifact.generated_at,
            embeddings,
        })
    }

    /// Exact scan, cosine similarity, score-descending with product-key
    /// tie-break for a reproducible ordering.
    pub fn nearest(&self, query: &[f32], top_m: usize) -> Result<Vec<(String, f32)>, EngineError> {
        if query.len() != self.dimension {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query = DVector::from_vec(crate::utils::normalize_vector_copy(query));

        let mut similarities: Vec<(String, f32)> = self
            .embeddings
            .iter()
            .map(|(id, vector)| (id.clone(), query.dot(vector)))
            .collect();

        similarities.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        similarities.truncate(top_m);
        Ok(similarities)
    }

    pub fn embedding(&self, product_id: &str) -> Option<&DVector<f32>> {
        self.embeddings.get(product_id)
    }

    pub fn similarity(&self, a: &str, b: &str) -> Option<f32> {
        let va = self.embeddings.get(a)?;
        let vb = self.embeddings.get(b)?;
        Some(crate::utils::cosine_similarity(va.as_slice(), vb.as_slice()))
    }

    /// Mean of the given products' embeddings; products without an embedding
    /// are skipped. Used for the user's representative profile.
    pub fn mean_embedding(&self, product_ids: &[String]) -> Option<Vec<f32>> {
        let vectors: Vec<&[f32]> = product_ids
            .iter()
            .filter_map(|id| self.embeddings.get(id))
            .map(|v| v.as_slice())
            .collect();

        crate::utils::mean_vector(&vectors)
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Versioned index with atomic snapshot swap. Until the first load every
/// query fails with `IndexUnavailable` rather than returning zeroed scores.
pub struct EmbeddingIndex {
    current: RwLock<Option<Arc<IndexSnapshot>>>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>, EngineError> {
        self.current
            .read()
            .clone()
            .ok_or(EngineError::IndexUnavailable)
    }

    pub fn try_snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current.read().clone()
    }

    pub fn swap(&self, snapshot: Arc<IndexSnapshot>) {
        let version = snapshot.version;
        let vectors = snapshot.len();
        *self.current.write() = Some(snapshot);
        info!(%version, vectors, "Swapped embedding index snapshot");
    }

    /// Called from startup and admin reload paths only, never mid-request.
    pub fn load_from_file(&self, path: &Path) -> Result<()> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading embedding artifact {}", path.display()))?;
        let artifact: EmbeddingArtifact = serde_json::from_str(&data)
            .with_context(|| format!("parsing embedding artifact {}", path.display()))?;
        let snapshot = IndexSnapshot::from_artifact(artifact)?;
        self.swap(Arc::new(snapshot));
        Ok(())
    }
}

impl Default for EmbeddingIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SimilaritySearch for EmbeddingIndex {
    async fn nearest(&self, query: &[f32], top_m: usize) -> Result<Vec<(String, f32)>, EngineError> {
        self.snapshot()?.nearest(query, top_m)
    }
}
