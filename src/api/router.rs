//! HTTP router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! REST routes are nested under `/api/`; the WebSocket subscription lives
//! at `/ws/subscribe`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::api::websocket;
use crate::core_state::CoreState;

/// Build the service router.
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);
    build_router(ctx)
}

/// Build router from a pre-constructed `ApiContext`.
#[cfg(test)]
pub(crate) fn api_router_with_ctx(ctx: ApiContext) -> Router {
    build_router(ctx)
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/vitals", post(endpoints::vitals::ingest))
        .route("/vitals/batch", post(endpoints::vitals::ingest_batch))
        .route("/facilities/:id/alerts", get(endpoints::alerts::list))
        .route("/alerts/:id", get(endpoints::alerts::detail))
        .route("/alerts/:id/acknowledge", post(endpoints::alerts::acknowledge))
        .route("/alerts/:id/resolve", post(endpoints::alerts::resolve))
        .route("/alerts/:id/escalate", post(endpoints::alerts::escalate))
        .route(
            "/residents/:id/thresholds",
            get(endpoints::residents::get_thresholds).put(endpoints::residents::put_thresholds),
        )
        .route("/residents/:id/deactivate", post(endpoints::residents::deactivate))
        .with_state(ctx.clone());

    let ws_routes = Router::new()
        .route("/ws/subscribe", get(websocket::ws_subscribe))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
}
