pub mod health;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use crate::evaluation::handlers;
use crate::state::AppState;

/// Path the serverless deployment exposed the evaluate function under.
const NETLIFY_EVALUATE_PATH: &str = "/.netlify/functions/evaluate";

pub fn build_router(state: AppState) -> Router {
    let evaluate = post(handlers::handle_evaluate).fallback(handlers::handle_method_not_allowed);

    // Anything not matched above is a static asset; `/` resolves to index.html.
    let static_files = ServeDir::new(&state.config.static_dir);

    // The front end may be hosted on another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/evaluate", evaluate.clone())
        .route(NETLIFY_EVALUATE_PATH, evaluate)
        .fallback_service(static_files)
        .layer(cors)
        .with_state(state)
}
