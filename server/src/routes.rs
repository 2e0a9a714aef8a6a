use axum::{
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use crate::party::routes as party_api;
use crate::state::AppState;
use crate::time;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    let party_routes = Router::new()
        .route("/api/parties", post(party_api::create_party))
        .route(
            "/api/parties/{party_id}",
            get(party_api::get_party).delete(party_api::delete_party),
        );

    // WebSocket endpoint; the client session rides in the query string
    let ws_routes = Router::new().route("/party/{party_id}", get(ws_handler::party_upgrade));

    let health = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/time", get(time::current_time));

    Router::new()
        .merge(party_routes)
        .merge(ws_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> impl IntoResponse {
    ([(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")], "ok")
}
