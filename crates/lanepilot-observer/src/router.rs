//! Axum router construction for the control API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with open CORS so a dashboard on another origin can drive the loop.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use lanepilot_runner::{ChatBackend, GameApi};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws/state` -- `WebSocket` snapshot stream
/// - `GET /api/state` -- current snapshot
/// - `GET /api/ticks` -- recent tick history
/// - `POST /api/start`, `POST /api/stop`, `POST /api/continue`
/// - `GET /api/config`, `PUT /api/config`
pub fn build_router<G, B>(state: Arc<AppState<G, B>>) -> Router
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index::<G, B>))
        .route("/ws/state", get(ws::ws_state::<G, B>))
        .route("/api/state", get(handlers::get_state::<G, B>))
        .route("/api/ticks", get(handlers::get_ticks::<G, B>))
        .route("/api/start", post(handlers::start::<G, B>))
        .route("/api/stop", post(handlers::stop::<G, B>))
        .route("/api/continue", post(handlers::continue_once::<G, B>))
        .route(
            "/api/config",
            get(handlers::get_config::<G, B>).put(handlers::put_config::<G, B>),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
