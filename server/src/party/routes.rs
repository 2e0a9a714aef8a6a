use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::party::Party;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PartyResponse {
    pub party_id: String,
    pub created_at: String,
}

impl From<Party> for PartyResponse {
    fn from(party: Party) -> Self {
        Self {
            party_id: party.id,
            created_at: party.created_at.to_rfc3339(),
        }
    }
}

/// POST /api/parties: Create a party under a fresh code.
pub async fn create_party(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<PartyResponse>), (StatusCode, String)> {
    let parties = state.parties.clone();

    let party = tokio::task::spawn_blocking(move || parties.create_party())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))?
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Create party: {}", e)))?;

    tracing::info!(party_id = %party.id, "Party created");

    Ok((StatusCode::CREATED, Json(party.into())))
}

/// GET /api/parties/{party_id}: Look up a party.
pub async fn get_party(
    State(state): State<AppState>,
    Path(party_id): Path<String>,
) -> Result<Json<PartyResponse>, (StatusCode, String)> {
    let parties = state.parties.clone();

    let party = tokio::task::spawn_blocking(move || parties.get_party(&party_id))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))?
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Get party: {}", e)))?
        .ok_or((StatusCode::NOT_FOUND, "Party not found".to_string()))?;

    Ok(Json(party.into()))
}

/// DELETE /api/parties/{party_id}: Remove a party record.
/// Connected members are left alone; new connections are refused.
pub async fn delete_party(
    State(state): State<AppState>,
    Path(party_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let parties = state.parties.clone();
    let id = party_id.clone();

    let deleted = tokio::task::spawn_blocking(move || parties.delete_party(&id))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))?
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete party: {}", e)))?;

    if !deleted {
        return Err((StatusCode::NOT_FOUND, "Party not found".to_string()));
    }

    tracing::info!(party_id = %party_id, "Party deleted");
    Ok(StatusCode::NO_CONTENT)
}
