use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::session::ConnectError;
use crate::state::AppState;
use crate::ws::{actor, new_connection_id};

/// Query parameters for a party WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct PartyConnectQuery {
    /// Logical client session, stable across reconnects of the same browser.
    #[serde(default)]
    pub session: Option<String>,
}

/// GET /party/{party_id}?session=...
/// WebSocket upgrade endpoint. The connection is admitted to the party
/// before upgrading, so an unknown party is refused with a plain 404.
pub async fn party_upgrade(
    State(state): State<AppState>,
    Path(party_id): Path<String>,
    Query(params): Query<PartyConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let connection_id = new_connection_id();
    let client_session = params
        .session
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    // Frames queued before the upgrade completes wait in the channel.
    let (tx, rx) = mpsc::unbounded_channel();
    let ping_tx = tx.clone();

    match state
        .sessions
        .connect(&party_id, &connection_id, &client_session, tx)
        .await
    {
        Ok(_) => {
            let failed_handler = state.sessions.clone();
            let failed_id = connection_id.clone();
            ws.on_failed_upgrade(move |err| {
                tracing::warn!(connection_id = %failed_id, error = %err, "WebSocket upgrade failed");
                failed_handler.disconnect(&failed_id);
            })
            .on_upgrade(move |socket| actor::run_connection(socket, state, connection_id, rx, ping_tx))
        }
        Err(ConnectError::PartyNotFound(_)) => {
            (StatusCode::NOT_FOUND, "Party not found").into_response()
        }
        Err(e) => {
            tracing::error!(party_id = %party_id, error = %e, "Party connect failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Party lookup failed").into_response()
        }
    }
}
