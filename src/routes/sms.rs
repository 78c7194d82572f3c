//! Send and lookup endpoints.
//!
//! - `GET  /api/v1.0/sms`: unauthenticated liveness text
//! - `POST /api/v1.0/sms/outgoing`: send from a JSON body
//! - `GET  /api/v1.0/sms/simple_send?to=&text=`: send from query params
//! - `GET  /api/v1.0/sms/sent/{message_id}`: header of a sent message

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use tracing::debug;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::outbox::SendReport;
use crate::spool::SentMessage;
use crate::AppState;

/// Request body for `POST /api/v1.0/sms/outgoing`.
#[derive(Debug, Deserialize)]
pub struct OutgoingRequest {
    pub mobiles: Vec<String>,
    pub text: String,
}

/// `GET /api/v1.0/sms`: returns `OK`.
pub async fn index() -> &'static str {
    "OK"
}

/// `POST /api/v1.0/sms/outgoing`
///
/// Any body that is not `{"mobiles": [string], "text": string}` is rejected
/// with `400 {"error": "Request error"}`.
pub async fn create_sms(
    State(state): State<AppState>,
    Extension(Identity(identity)): Extension<Identity>,
    payload: Result<Json<OutgoingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SendReport>), ApiError> {
    let Json(req) = payload.map_err(|e| {
        debug!("outgoing: rejected body: {e}");
        ApiError::BadRequest("Request error")
    })?;

    let report = state.outbox.submit(&identity, &req.mobiles, &req.text).await;
    Ok((StatusCode::CREATED, Json(report)))
}

/// `GET /api/v1.0/sms/simple_send`: `to` may be repeated.
pub async fn simple_send(
    State(state): State<AppState>,
    Extension(Identity(identity)): Extension<Identity>,
    params: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<(StatusCode, Json<SendReport>), ApiError> {
    const MISSING: ApiError = ApiError::BadRequest("missing required params");

    let Query(params) = params.map_err(|_| MISSING)?;
    let mobiles: Vec<String> = params
        .iter()
        .filter(|(k, _)| k == "to")
        .map(|(_, v)| v.clone())
        .collect();
    let text = params
        .iter()
        .find(|(k, _)| k == "text")
        .map(|(_, v)| v.as_str());

    let Some(text) = text else {
        return Err(MISSING);
    };
    if mobiles.is_empty() {
        return Err(MISSING);
    }
    debug!("simple_send to: {mobiles:?}");

    let report = state.outbox.submit(&identity, &mobiles, text).await;
    Ok((StatusCode::CREATED, Json(report)))
}

/// `GET /api/v1.0/sms/sent/{message_id}`: 404 if smsd has not moved the
/// message to the sent directory (yet).
pub async fn get_sent(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<SentMessage>, ApiError> {
    Ok(Json(state.spool.read_sent(&message_id).await?))
}
