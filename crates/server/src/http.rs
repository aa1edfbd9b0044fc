//! HTTP ingress
//!
//! Thin transport: `POST /event` carries one inbound event and returns
//! the ordered responses for it. The messaging gateway in front of the
//! engine does the channel-specific framing.

use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use sitedesk_protocol::{InboundEvent, Response};

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/event", post(event_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(engine)
}

async fn event_handler(
    State(engine): State<Arc<Engine>>,
    Json(event): Json<InboundEvent>,
) -> Json<Vec<Response>> {
    Json(engine.handle_event(event).await)
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
