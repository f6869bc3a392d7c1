use shoprec::engine::calibration::CalibrationGrid;
use shoprec::services::catalog::{CatalogSnapshot, ProductCatalog};
use shoprec::services::factors::{FactorSnapshot, FactorStore};
use shoprec::services::index::{EmbeddingIndex, IndexSnapshot};
use shoprec::services::recommendation::RecommendationService;
use shoprec::*;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

fn product(id: &str, category: &str, rating: f32, interactions: u64) -> Product {
    Product {
        product_id: id.to_string(),
        name: format!("Product {id}"),
        category: category.to_string(),
        description: format!("Description of {id}"),
        avg_rating: rating,
        total_interactions: interactions,
    }
}

fn interaction(user: &str, product: &str, rating: f32, secs: i64) -> Interaction {
    Interaction {
        user_id: user.to_string(),
        product_id: product.to_string(),
        rating,
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
    }
}

fn factor_artifact() -> FactorArtifact {
    let mut user_factors = HashMap::new();
    user_factors.insert("alice".to_string(), vec![1.0, 0.0]);
    user_factors.insert("bob".to_string(), vec![0.0, 1.0]);

    let mut product_factors = HashMap::new();
    product_factors.insert("P1".to_string(), vec![0.9, 0.1]);
    product_factors.insert("P2".to_string(), vec![0.8, 0.2]);
    product_factors.insert("P3".to_string(), vec![0.1, 0.9]);
    product_factors.insert("P4".to_string(), vec![0.4, 0.6]);

    let mut popularity = HashMap::new();
    popularity.insert("P1".to_string(), 0.4);
    popularity.insert("P2".to_string(), 0.7);
    popularity.insert("P3".to_string(), 0.9);
    popularity.insert("P4".to_string(), 0.2);

    FactorArtifact {
        version: Uuid::new_v4(),
        dimension: 2,
        user_factors,
        product_factors,
        popularity,
        trained_at: Utc::now(),
    }
}

fn embedding_artifact() -> EmbeddingArtifact {
    let mut embeddings = HashMap::new();
    embeddings.insert("P1".to_string(), vec![1.0, 0.0]);
    embeddings.insert("P2".to_string(), vec![0.95, 0.31]);
    embeddings.insert("P3".to_string(), vec![0.0, 1.0]);
    embeddings.insert("P4".to_string(), vec![0.5, 0.87]);

    EmbeddingArtifact {
        version: Uuid::new_v4(),
        model_id: "test-embedding".to_string(),
        dimension: 2,
        generated_at: Utc::now(),
        embeddings,
    }
}

fn catalog_artifact() -> CatalogArtifact {
    CatalogArtifact {
        products: vec![
            product("P1", "electronics", 4.5, 120),
            product("P2", "electronics", 3.2, 40),
            product("P3", "books", 4.8, 200),
            product("P4", "books", 4.0, 15),
        ],
        interactions: vec![
            interaction("alice", "P2", 5.0, 100),
            interaction("bob", "P3", 4.0, 200),
        ],
    }
}

fn build_service(with_index: bool, mmr_lambda: f32) -> RecommendationService {
    let mut config = Config::default();
    config.engine.mmr_lambda = mmr_lambda;
    config.index.dimension = 2;

    let factors = Arc::new(FactorStore::new());
    factors.swap(Arc::new(
        FactorSnapshot::from_artifact(factor_artifact()).unwrap(),
    ));

    let index = Arc::new(EmbeddingIndex::new());
    if with_index {
        index.swap(Arc::new(
            IndexSnapshot::from_artifact(embedding_artifact()).unwrap(),
        ));
    }

    let catalog = Arc::new(ProductCatalog::new());
    catalog.swap(Arc::new(CatalogSnapshot::from_artifact(catalog_artifact())));

    RecommendationService::new(factors, index, catalog, Arc::new(config)).unwrap()
}

fn request(user: &str) -> RecommendRequest {
    RecommendRequest {
        user_id: user.to_string(),
        top_k: 10,
        exclude_seen: false,
        diversify: false,
        filters: AttributeFilters::default(),
    }
}

#[tokio::test]
async fn test_recommendation_flow() {
    let service = build_service(true, 0.7);

    let results = service.recommend(&request("alice")).await.unwrap();
    assert!(!results.is_empty());

    // ranks are contiguous from 1 and scores never increase
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.rank, i + 1);
        if i > 0 {
            assert!(results[i - 1].score >= result.score);
        }
    }

    // alice's factors point at the first axis, so P1 leads
    assert_eq!(results[0].product_id, "P1");
}

#[tokio::test]
async fn test_unknown_user_falls_back_to_popularity() {
    let service = build_service(true, 0.7);

    let err = service.recommend(&request("mallory")).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownUser(ref u) if u == "mallory"));

    let fallback = service
        .recommend_popular(2, &AttributeFilters::default())
        .await
        .unwrap();
    assert_eq!(fallback.len(), 2);
    assert_eq!(fallback[0].product_id, "P3");
    assert_eq!(fallback[1].product_id, "P2");
}

#[tokio::test]
async fn test_exclude_seen_and_top_k() {
    let service = build_service(true, 0.7);

    let mut req = request("alice");
    req.exclude_seen = true;
    req.top_k = 2;
    let results = service.recommend(&req).await.unwrap();

    assert!(results.len() <= 2);
    assert!(results.iter().all(|r| r.product_id != "P2"));
}

#[tokio::test]
async fn test_all_candidates_excluded_yields_empty() {
    let mut config = Config::default();
    config.index.dimension = 2;

    let factors = Arc::new(FactorStore::new());
    factors.swap(Arc::new(
        FactorSnapshot::from_artifact(factor_artifact()).unwrap(),
    ));
    let index = Arc::new(EmbeddingIndex::new());
    let catalog = Arc::new(ProductCatalog::new());
    // carol has seen the entire catalog
    catalog.swap(Arc::new(CatalogSnapshot::from_artifact(CatalogArtifact {
        products: catalog_artifact().products,
        interactions: (1..=4)
            .map(|i| interaction("carol", &format!("P{i}"), 5.0, i))
            .collect(),
    })));

    // carol needs factors to get past candidate generation
    let mut artifact = factor_artifact();
    artifact
        .user_factors
        .insert("carol".to_string(), vec![1.0, 0.0]);
    factors.swap(Arc::new(FactorSnapshot::from_artifact(artifact).unwrap()));

    let service =
        RecommendationService::new(factors, index, catalog, Arc::new(config)).unwrap();

    let mut req = request("carol");
    req.exclude_seen = true;
    let results = service.recommend(&req).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_search_unavailable_without_index() {
    let service = build_service(false, 0.7);

    let err = service
        .search(&[1.0, 0.0], 5, &AttributeFilters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::IndexUnavailable));
}

#[tokio::test]
async fn test_search_with_filters() {
    let service = build_service(true, 0.7);

    let all = service
        .search(&[1.0, 0.0], 10, &AttributeFilters::default())
        .await
        .unwrap();
    assert_eq!(all[0].product_id, "P1");

    let filters = AttributeFilters {
        category: Some("books".to_string()),
        min_rating: Some(4.5),
        min_interactions: None,
    };
    let filtered = service.search(&[1.0, 0.0], 10, &filters).await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].product_id, "P3");
}

#[tokio::test]
async fn test_recommendation_is_deterministic() {
    let service = build_service(true, 0.7);

    let first = service.recommend(&request("alice")).await.unwrap();
    for _ in 0..5 {
        let run = service.recommend(&request("alice")).await.unwrap();
        assert_eq!(run.len(), first.len());
        for (a, b) in run.iter().zip(first.iter()) {
            assert_eq!(a.product_id, b.product_id);
            assert_eq!(a.score, b.score);
        }
    }
}

#[tokio::test]
async fn test_collaborative_only_config_matches_collaborative_ranking() {
    let service = build_service(false, 0.7);

    let config = FusionConfig {
        strategy: FusionStrategy::WeightedSum,
        weight_collaborative: 1.0,
        weight_semantic: 0.0,
        ..FusionConfig::default()
    };
    service.swap_config(config).unwrap();

    let results = service.recommend(&request("alice")).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.product_id.as_str()).collect();
    // pure dot-product order for alice: P1 (0.9), P2 (0.8), P4 (0.4), P3 (0.1)
    assert_eq!(ids, vec!["P1", "P2", "P4", "P3"]);
}

#[tokio::test]
async fn test_diversify_with_full_lambda_matches_plain_ranking() {
    let service = build_service(true, 1.0);

    let plain = service.recommend(&request("alice")).await.unwrap();

    let mut req = request("alice");
    req.diversify = true;
    let diversified = service.recommend(&req).await.unwrap();

    let plain_ids: Vec<&str> = plain.iter().map(|r| r.product_id.as_str()).collect();
    let mmr_ids: Vec<&str> = diversified.iter().map(|r| r.product_id.as_str()).collect();
    assert_eq!(plain_ids, mmr_ids);
}

#[tokio::test]
async fn test_diversify_reorders_redundant_results() {
    let service = build_service(true, 0.3);

    let mut req = request("alice");
    req.diversify = true;
    req.top_k = 2;
    let results = service.recommend(&req).await.unwrap();

    // P2 is nearly collinear with P1 in embedding space; a low lambda must
    // pull something dissimilar into the second slot
    assert_eq!(results[0].product_id, "P1");
    assert_ne!(results[1].product_id, "P2");
}

#[tokio::test]
async fn test_invalid_fusion_config_rejected_at_swap() {
    let service = build_service(true, 0.7);

    let negative = FusionConfig {
        weight_collaborative: -0.1,
        ..FusionConfig::default()
    };
    assert!(matches!(
        service.swap_config(negative),
        Err(EngineError::InvalidFusionConfig(_))
    ));

    let zeroed = FusionConfig {
        weight_collaborative: 0.0,
        weight_semantic: 0.0,
        ..FusionConfig::default()
    };
    assert!(service.swap_config(zeroed).is_err());

    let zero_k = FusionConfig {
        rrf_k: 0,
        ..FusionConfig::default()
    };
    assert!(service.swap_config(zero_k).is_err());
}

#[tokio::test]
async fn test_calibration_grid_selects_stable_winner() {
    let service = build_service(true, 0.7);

    let eval_set = vec![
        interaction("alice", "P1", 5.0, 300),
        interaction("alice", "P3", 1.0, 301),
        interaction("bob", "P3", 5.0, 302),
        interaction("bob", "P4", 4.0, 303),
    ];
    let grid = CalibrationGrid::evenly_spaced(3, vec![FusionStrategy::WeightedSum]);

    let first = service.calibrate(&eval_set, &grid).await.unwrap();
    assert_eq!(first.grid.len(), 8);
    assert_eq!(first.users_evaluated, 2);

    for _ in 0..3 {
        let run = service.calibrate(&eval_set, &grid).await.unwrap();
        assert_eq!(
            run.winner.weight_collaborative,
            first.winner.weight_collaborative
        );
        assert_eq!(run.winner.weight_semantic, first.winner.weight_semantic);
        assert_eq!(run.winner.strategy, first.winner.strategy);
    }

    // the winner became the active config
    let active = service.config_store().active();
    assert_eq!(active.weight_collaborative, first.winner.weight_collaborative);
    assert_eq!(active.weight_semantic, first.winner.weight_semantic);
}

#[tokio::test]
async fn test_similar_products_excludes_self() {
    let service = build_service(true, 0.7);

    let similar = service.similar_products("P1", 2).await.unwrap();
    assert_eq!(similar.len(), 2);
    assert!(similar.iter().all(|r| r.product_id != "P1"));
    assert_eq!(similar[0].product_id, "P2");

    let unknown = service.similar_products("P9", 2).await.unwrap();
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn test_enrichment_joins_catalog_metadata() {
    let service = build_service(true, 0.7);

    let results = service.recommend(&request("alice")).await.unwrap();
    let enriched = service.enrich(results);

    let top = &enriched[0];
    assert_eq!(top.product_id, "P1");
    assert_eq!(top.name, "Product P1");
    assert_eq!(top.category, "electronics");
    assert!(top.avg_rating > 0.0);
}

#[tokio::test]
async fn test_similarity_search_trait() {
    use shoprec::services::index::SimilaritySearch;

    let index = EmbeddingIndex::new();
    let err = index.nearest(&[1.0, 0.0], 5).await.unwrap_err();
    assert!(matches!(err, EngineError::IndexUnavailable));

    index.swap(Arc::new(
        IndexSnapshot::from_artifact(embedding_artifact()).unwrap(),
    ));
    let results = index.nearest(&[1.0, 0.0], 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "P1");
}

#[tokio::test]
async fn test_config_swap_is_atomic_for_readers() {
    let service = build_service(true, 0.7);
    let store = service.config_store();

    let held = store.active();
    let replacement = FusionConfig {
        strategy: FusionStrategy::ReciprocalRankFusion,
        weight_collaborative: 0.8,
        weight_semantic: 0.2,
        ..FusionConfig::default()
    };
    store.swap(replacement.clone()).unwrap();

    // the old reference stays fully intact; new readers see the new config
    assert_eq!(held.strategy, FusionStrategy::WeightedSum);
    assert_eq!(store.active().strategy, FusionStrategy::ReciprocalRankFusion);
    assert_eq!(store.active().version, replacement.version);
}
