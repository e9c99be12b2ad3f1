use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            header::HeaderName::from_static(middlewares::trace::TRACE_ID_HEADER),
        ])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .route("/api/upload", post(handlers::questions::upload_questions))
        .nest("/api/questions", question_routes())
        .nest("/api/blueprints", blueprint_routes())
        .nest("/api/papers", paper_routes())
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn question_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::questions::list_questions))
        .route("/subjects", get(handlers::questions::list_subjects))
        .route("/pool-metadata", get(handlers::questions::pool_metadata))
        .route("/cos", get(handlers::questions::course_outcomes))
        .route("/rbt-levels", get(handlers::questions::rbt_levels))
        .route("/stats", get(handlers::questions::question_stats))
}

fn blueprint_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::blueprints::list_blueprints).post(handlers::blueprints::create_blueprint),
        )
        .route(
            "/pool-metadata",
            get(handlers::blueprints::pool_availability),
        )
        .route(
            "/{id}",
            get(handlers::blueprints::get_blueprint).put(handlers::blueprints::update_blueprint),
        )
        .route(
            "/{id}/validate",
            post(handlers::blueprints::validate_blueprint),
        )
}

fn paper_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(handlers::papers::generate_papers))
        .route("/recent", get(handlers::papers::recent_papers))
        .route(
            "/difficulty-configs",
            get(handlers::papers::difficulty_configs),
        )
        .route(
            "/difficulty/{level}",
            get(handlers::papers::papers_by_difficulty),
        )
        .route(
            "/blueprint/{blueprint_id}/papers",
            get(handlers::papers::papers_by_blueprint),
        )
        .route("/{id}", get(handlers::papers::get_paper))
        .route("/{id}/download-pdf", get(handlers::papers::download_pdf))
        .route("/{id}/download-xlsx", get(handlers::papers::download_xlsx))
}
