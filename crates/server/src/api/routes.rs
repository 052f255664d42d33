use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;

use super::{handlers, matching, middleware::metrics_middleware, terms};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config().server.cors_origin);

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Term review
        .route("/terms/unknown", post(terms::submit_unknown))
        .route("/terms/approved", get(terms::list_approved))
        // Matching
        .route("/match", post(matching::run_match))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .route("/metrics", get(handlers::metrics))
        .fallback(handlers::not_found)
        .layer(CatchPanicLayer::custom(handlers::panic_response))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if origin.trim() == "*" {
        return layer.allow_origin(AllowOrigin::any());
    }

    match HeaderValue::from_str(origin) {
        // Only a matching Origin gets the allow header back.
        Ok(origin) => layer.allow_origin(AllowOrigin::list([origin])),
        Err(_) => {
            warn!(origin, "Invalid CORS origin, cross-origin requests disabled");
            layer
        }
    }
}
