use crate::models::FactorArtifact;
use anyhow::{Context, Result};
use nalgebra::DVector;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One trained factor version. Immutable once built; retraining produces a
/// new snapshot which replaces this one wholesale.
#[derive(Debug)]
pub struct FactorSnapshot {
    pub version: Uuid,
    pub dimension: usize,
    user_factors: HashMap<String, DVector<f32>>,
    product_factors: HashMap<String, DVector<f32>>,
    popularity: HashMap<String, f32>,
}

impl FactorSnapshot {
    pub fn empty() -> Self {
        Self {
            version: Uuid::nil(),
            dimension: 0,
            user_factors: HashMap::new(),
            product_factors: HashMap::new(),
            popularity: HashMap::new(),
        }
    }

    pub fn from_artifact(artifact: FactorArtifact) -> Result<Self> {
        let dimension = artifact.dimension;

        let mut user_factors = HashMap::with_capacity(artifact.user_factors.len());
        for (user_id, factors) in artifact.user_factors {
            if factors.len() != dimension {
                anyhow::bail!(
                    "user {} factor dimension mismatch: expected {}, got {}",
                    user_id,
                    dimension,
                    factors.len()
                );
            }
            user_factors.insert(user_id, DVector::from_vec(factors));
        }

        let mut product_factors = HashMap::with_capacity(artifact.product_factors.len());
        for (product_id, factors) in artifact.product_factors {
            if factors.len() != dimension {
                anyhow::bail!(
                    "product {} factor dimension mismatch: expected {}, got {}",
                    product_id,
                    dimension,
                    factors.len()
                );
            }
            product_factors.insert(product_id, DVector::from_vec(factors));
        }

        Ok(Self {
            version: artifact.version,
            dimension,
            user_factors,
            product_factors,
            popularity: artifact.popularity,
        })
    }

    pub fn user_factors(&self, user_id: &str) -> Option<&DVector<f32>> {
        self.user_factors.get(user_id)
    }

    pub fn product_factors_iter(&self) -> impl Iterator<Item = (&String, &DVector<f32>)> {
        self.product_factors.iter()
    }

    pub fn popularity_iter(&self) -> impl Iterator<Item = (&String, f32)> {
        self.popularity.iter().map(|(id, score)| (id, *score))
    }

    pub fn user_count(&self) -> usize {
        self.user_factors.len()
    }

    pub fn product_count(&self) -> usize {
        self.product_factors.len()
    }
}

/// Versioned store with an atomic snapshot swap. Readers clone the `Arc`
/// under a momentary read lock; in-flight requests keep the snapshot they
/// started with.
pub struct FactorStore {
    current: RwLock<Arc<FactorSnapshot>>,
}

impl FactorStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(FactorSnapshot::empty())),
        }
    }

    pub fn snapshot(&self) -> Arc<FactorSnapshot> {
        self.current.read().clone()
    }

    pub fn swap(&self, snapshot: Arc<FactorSnapshot>) {
        let version = snapshot.version;
        let users = snapshot.user_count();
        let products = snapshot.product_count();
        *self.current.write() = snapshot;
        info!(%version, users, products, "Swapped latent factor snapshot");
    }

    /// Called from startup and admin reload paths only, never mid-request.
    pub fn load_from_file(&self, path: &Path) -> Result<()> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading factor artifact {}", path.display()))?;
        let artifact: FactorArtifact = serde_json::from_str(&data)
            .with_context(|| format!("parsing factor artifact {}", path.display()))?;
        let snapshot = FactorSnapshot::from_artifact(artifact)?;
        self.swap(Arc::new(snapshot));
        Ok(())
    }
}

impl Default for FactorStore {
    fn default() -> Self {
        Self::new()
    }
}
