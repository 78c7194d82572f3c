//! Modem and smsd health endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::AppState;

/// `GET /api/v1.0/sms/modem_status`: empty 200 when healthy, otherwise 500
/// with the failing check. A CSQ of 99 may trigger a modem reset.
pub async fn modem_status(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.health.evaluate().await?;
    Ok(StatusCode::OK)
}

/// `GET /api/v1.0/sms/smsd_status`: probes the pid from smsd's pid file.
pub async fn smsd_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pid = state.smsd.check().await.inspect_err(|e| tracing::warn!("smsd: {e}"))?;
    tracing::debug!("smsd alive (pid {pid})");
    Ok(Json(json!({"result": "All OK"})))
}
