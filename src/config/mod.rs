use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::models::{FusionConfig, FusionStrategy, Normalization};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub index: IndexConfig,
    pub calibration: CalibrationConfig,
    pub artifacts: ArtifactsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many candidates each source contributes before fusion.
    pub candidate_pool: usize,
    /// History items averaged into the user's representative embedding.
    pub history_profile_len: usize,
    pub mmr_lambda: f32,
    pub default_strategy: FusionStrategy,
    pub default_weight_collaborative: f32,
    pub default_weight_semantic: f32,
    pub default_rrf_k: u32,
    pub default_normalization: Normalization,
}

impl EngineConfig {
    pub fn default_fusion_config(&self) -> FusionConfig {
        FusionConfig {
            strategy: self.default_strategy,
            weight_collaborative: self.default_weight_collaborative,
            weight_semantic: self.default_weight_semantic,
            rrf_k: self.default_rrf_k,
            normalization: self.default_normalization,
            ..FusionConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub dimension: usize,
    /// Nearest neighbors pulled per semantic query.
    pub top_m: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub k: usize,
    pub relevance_threshold: f32,
    pub grid_steps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub dir: PathBuf,
    pub factors_file: String,
    pub embeddings_file: String,
    pub catalog_file: String,
    pub fusion_file: String,
}

impl ArtifactsConfig {
    pub fn factors_path(&self) -> PathBuf {
        self.dir.join(&self.factors_file)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.dir.join(&self.embeddings_file)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.dir.join(&self.catalog_file)
    }

    pub fn fusion_path(&self) -> PathBuf {
        self.dir.join(&self.fusion_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: num_cpus::get(),
            },
            engine: EngineConfig {
                candidate_pool: 50,
                history_profile_len: 10,
                mmr_lambda: 0.7,
                default_strategy: FusionStrategy::WeightedSum,
                default_weight_collaborative: 0.5,
                default_weight_semantic: 0.5,
                default_rrf_k: 60,
                default_normalization: Normalization::MinMax,
            },
            index: IndexConfig {
                dimension: 1536,
                top_m: 50,
            },
            calibration: CalibrationConfig {
                k: 10,
                relevance_threshold: 4.0,
                grid_steps: 3,
            },
            artifacts: ArtifactsConfig {
                dir: PathBuf::from("data/artifacts"),
                factors_file: "factors.json".to_string(),
                embeddings_file: "embeddings.json".to_string(),
                catalog_file: "catalog.json".to_string(),
                fusion_file: "fusion.json".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SHOPREC"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
