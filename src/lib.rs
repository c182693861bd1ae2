pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::PipelineConfig;
use crate::services::pipeline::Pipeline;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::effects::remove_background,
        api::handlers::effects::remove_background_batch,
        api::handlers::effects::content_aware,
        api::handlers::effects::content_aware_batch,
        api::handlers::effects::add_shadow,
        api::handlers::effects::add_shadow_batch,
    ),
    components(
        schemas(
            api::error::ErrorResponse,
            api::handlers::health::HealthResponse,
            api::handlers::effects::ImageUpload,
            api::handlers::effects::BatchImageUpload,
            api::handlers::effects::ProcessedImageData,
            api::handlers::effects::ProcessImageResponse,
            api::handlers::effects::BatchProcessResponse,
            services::batch::BatchSummary,
            models::EffectKind,
            models::ItemStatus,
            models::ItemOutcome,
        )
    ),
    tags(
        (name = "effects", description = "Remote image effects with archiving"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: PipelineConfig,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let config = pipeline.config().clone();
        Self { pipeline, config }
    }
}

pub fn create_app(state: AppState) -> Router {
    use api::handlers::effects;

    let single_limit = DefaultBodyLimit::max(state.config.single_request_limit());

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/background-removal/", post(effects::remove_background).layer(single_limit))
        .route(
            "/background-removal/batch",
            post(effects::remove_background_batch),
        )
        .route("/content-aware/", post(effects::content_aware).layer(single_limit))
        .route("/content-aware/batch", post(effects::content_aware_batch))
        .route("/add-shadow/", post(effects::add_shadow).layer(single_limit))
        .route("/add-shadow/batch", post(effects::add_shadow_batch))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(DefaultBodyLimit::max(state.config.request_body_limit()))
        .with_state(state)
}
