use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.request_timeout_secs,
        )));

    Router::new()
        .route("/api/quota/:identity", get(handlers::get_status))
        .route("/api/quota/:identity/consume", post(handlers::consume))
        .route("/api/commands", post(handlers::run_command))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware)
}
