pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::EngineError;
pub use models::*;

use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub factors: Arc<services::factors::FactorStore>,
    pub index: Arc<services::index::EmbeddingIndex>,
    pub catalog: Arc<services::catalog::ProductCatalog>,
    pub recommendation_service: Arc<services::recommendation::RecommendationService>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let factors = Arc::new(services::factors::FactorStore::new());
        let index = Arc::new(services::index::EmbeddingIndex::new());
        let catalog = Arc::new(services::catalog::ProductCatalog::new());

        let recommendation_service = Arc::new(
            services::recommendation::RecommendationService::new(
                factors.clone(),
                index.clone(),
                catalog.clone(),
                config.clone(),
            )?,
        );

        Ok(Self {
            config,
            factors,
            index,
            catalog,
            recommendation_service,
        })
    }

    /// Loads whatever artifacts are present on disk. Missing files are
    /// logged and skipped so the server can start ahead of the first
    /// training/embedding run.
    pub fn load_artifacts(&self) -> Result<()> {
        let artifacts = &self.config.artifacts;

        let factors_path = artifacts.factors_path();
        if factors_path.exists() {
            self.factors.load_from_file(&factors_path)?;
        } else {
            warn!(path = %factors_path.display(), "Factor artifact not found, starting empty");
        }

        let embeddings_path = artifacts.embeddings_path();
        if embeddings_path.exists() {
            self.index.load_from_file(&embeddings_path)?;
        } else {
            warn!(path = %embeddings_path.display(), "Embedding artifact not found, index unavailable");
        }

        let catalog_path = artifacts.catalog_path();
        if catalog_path.exists() {
            self.catalog.load_from_file(&catalog_path)?;
        } else {
            warn!(path = %catalog_path.display(), "Catalog artifact not found, starting empty");
        }

        let fusion_path = artifacts.fusion_path();
        if fusion_path.exists() {
            let data = std::fs::read_to_string(&fusion_path)?;
            let fusion_config: models::FusionConfig = serde_json::from_str(&data)?;
            self.recommendation_service.swap_config(fusion_config)?;
        }

        Ok(())
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
