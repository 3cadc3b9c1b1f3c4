use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use kbchat_pipeline::Pipeline;

use crate::handlers;

pub fn build_router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/api/chat", get(handlers::get_chat).post(handlers::post_chat))
        .route("/health", get(handlers::health))
        .layer(Extension(pipeline))
        .layer(TraceLayer::new_for_http())
}
