use shoprec::{init_tracing, AppState, Config, EngineError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    top_k: Option<usize>,
    exclude_seen: Option<bool>,
    diversify: Option<bool>,
    category: Option<String>,
    min_rating: Option<f32>,
    min_interactions: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    query_embedding: Vec<f32>,
    top_k: Option<usize>,
    #[serde(default)]
    filters: shoprec::AttributeFilters,
}

#[derive(Debug, Deserialize)]
struct SimilarQuery {
    top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }
}

fn error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::UnknownUser(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidFusionConfig(_) => StatusCode::BAD_REQUEST,
        EngineError::IndexUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::DimensionMismatch { .. } => StatusCode::BAD_REQUEST,
    }
}

async fn health_check(
    State(state): State<AppState>,
) -> Json<ApiResponse<HashMap<String, serde_json::Value>>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), serde_json::json!("healthy"));
    status.insert("service".to_string(), serde_json::json!("shoprec"));
    status.insert(
        "factor_version".to_string(),
        serde_json::json!(state.factors.snapshot().version.to_string()),
    );
    status.insert(
        "index_loaded".to_string(),
        serde_json::json!(state.index.try_snapshot().is_some()),
    );
    status.insert(
        "stats".to_string(),
        serde_json::json!(state.recommendation_service.serving_stats()),
    );

    Json(ApiResponse::success(status))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<RecommendationQuery>,
) -> Result<Json<ApiResponse<Vec<shoprec::RecommendedProduct>>>, StatusCode> {
    let request = shoprec::RecommendRequest {
        user_id,
        top_k: params.top_k.unwrap_or(10),
        exclude_seen: params.exclude_seen.unwrap_or(true),
        diversify: params.diversify.unwrap_or(false),
        filters: shoprec::AttributeFilters {
            category: params.category,
            min_rating: params.min_rating,
            min_interactions: params.min_interactions,
        },
    };

    if let Err(e) = shoprec::utils::validation::validate_recommend_request(&request) {
        warn!("Invalid recommendation request: {}", e);
        return Err(StatusCode::BAD_REQUEST);
    }

    let service = &state.recommendation_service;
    match service.recommend(&request).await {
        Ok(results) => Ok(Json(ApiResponse::success(service.enrich(results)))),
        Err(EngineError::UnknownUser(user_id)) => {
            // cold-start users degrade to the popularity ranking
            warn!(%user_id, "Unknown user, serving popularity fallback");
            match service.recommend_popular(request.top_k, &request.filters).await {
                Ok(results) => Ok(Json(ApiResponse::success(service.enrich(results)))),
                Err(e) => {
                    tracing::error!("Popularity fallback failed: {}", e);
                    Err(error_status(&e))
                }
            }
        }
        Err(e) => {
            tracing::error!("Failed to get recommendations: {}", e);
            Err(error_status(&e))
        }
    }
}

async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<ApiResponse<Vec<shoprec::RecommendedProduct>>>, StatusCode> {
    if let Err(e) = shoprec::utils::validation::validate_query_embedding(&body.query_embedding) {
        warn!("Invalid search request: {}", e);
        return Err(StatusCode::BAD_REQUEST);
    }
    let top_k = body.top_k.unwrap_or(10);
    if let Err(e) = shoprec::utils::validation::validate_top_k(top_k) {
        warn!("Invalid search request: {}", e);
        return Err(StatusCode::BAD_REQUEST);
    }

    let service = &state.recommendation_service;
    match service.search(&body.query_embedding, top_k, &body.filters).await {
        Ok(results) => Ok(Json(ApiResponse::success(service.enrich(results)))),
        Err(e) => {
            tracing::error!("Search failed: {}", e);
            Err(error_status(&e))
        }
    }
}

async fn get_similar_products(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(params): Query<SimilarQuery>,
) -> Result<Json<ApiResponse<Vec<shoprec::RecommendedProduct>>>, StatusCode> {
    let service = &state.recommendation_service;
    match service.similar_products(&product_id, params.top_k.unwrap_or(10)).await {
        Ok(results) => Ok(Json(ApiResponse::success(service.enrich(results)))),
        Err(e) => {
            tracing::error!("Failed to get similar products: {}", e);
            Err(error_status(&e))
        }
    }
}

async fn swap_fusion_config(
    State(state): State<AppState>,
    Json(config): Json<shoprec::FusionConfig>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    match state.recommendation_service.swap_config(config) {
        Ok(()) => Ok(Json(ApiResponse::success("Fusion config swapped".to_string()))),
        Err(e) => {
            warn!("Rejected fusion config: {}", e);
            Err(error_status(&e))
        }
    }
}

async fn reload_artifacts(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    match state.load_artifacts() {
        Ok(()) => Ok(Json(ApiResponse::success("Artifacts reloaded".to_string()))),
        Err(e) => {
            tracing::error!("Failed to reload artifacts: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommendations/:user_id", get(get_recommendations))
        .route("/search", post(search))
        .route("/products/:product_id/similar", get(get_similar_products))
        .route("/admin/config", post(swap_fusion_config))
        .route("/admin/reload", post(reload_artifacts))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::default();
    info!("Starting ShopRec server with config: {:?}", config.server);

    let state = AppState::new(config.clone())?;
    state.load_artifacts()?;

    let app = create_router(state);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
