//! Wall-clock endpoint used by clients to estimate their offset from the
//! server before a synchronised song start.

use axum::{http::header, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TimeResponse {
    /// Unix time in milliseconds
    pub time: i64,
}

/// GET /time
pub async fn current_time() -> impl IntoResponse {
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(TimeResponse {
            time: chrono::Utc::now().timestamp_millis(),
        }),
    )
}
