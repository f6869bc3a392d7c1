use crate::models::{CatalogArtifact, Product};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Product attributes plus per-user interaction history, as supplied by the
/// ingestion collaborator. Read-only inside the engine.
#[derive(Debug)]
pub struct CatalogSnapshot {
    products: HashMap<String, Product>,
    /// Chronological (oldest first) product ids per user.
    user_history: HashMap<String, Vec<String>>,
}

impl CatalogSnapshot {
    pub fn empty() -> Self {
        Self {
            products: HashMap::new(),
            user_history: HashMap::new(),
        }
    }

    pub fn from_artifact(artifact: CatalogArtifact) -> Self {
        let products = artifact
            .products
            .into_iter()
            .map(|p| (p.product_id.clone(), p))
            .collect();

        let mut interactions = artifact.interactions;
        interactions.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });

        let mut user_history: HashMap<String, Vec<String>> = HashMap::new();
        for interaction in interactions {
            user_history
                .entry(interaction.user_id)
                .or_default()
                .push(interaction.product_id);
        }

        Self {
            products,
            user_history,
        }
    }

    pub fn product(&self, product_id: &str) -> Option<&Product> {
        self.products.get(product_id)
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn seen_products(&self, user_id: &str) -> HashSet<String> {
        self.user_history
            .get(user_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The user's most recent `n` interactions, newest last.
    pub fn recent_history(&self, user_id: &str, n: usize) -> &[String] {
        match self.user_history.get(user_id) {
            Some(history) => {
                let start = history.len().saturating_sub(n);
                &history[start..]
            }
            None => &[],
        }
    }
}

pub struct ProductCatalog {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CatalogSnapshot::empty())),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.read().clone()
    }

    pub fn swap(&self, snapshot: Arc<CatalogSnapshot>) {
        let products = snapshot.product_count();
        *self.current.write() = snapshot;
        info!(products, "Swapped catalog snapshot");
    }

    /// Called from startup and admin reload paths only, never mid-request.
    pub fn load_from_file(&self, path: &Path) -> Result<()> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog artifact {}", path.display()))?;
        let artifact: CatalogArtifact = serde_json::from_str(&data)
            .with_context(|| format!("parsing catalog artifact {}", path.display()))?;
        self.swap(Arc::new(CatalogSnapshot::from_artifact(artifact)));
        Ok(())
    }
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self::new()
    }
}
