//! HTTP route handlers.
//!
//! Each sub-module corresponds to an API endpoint group. All handlers except
//! [`sms::index`] require authentication via the
//! [`crate::auth::require_basic_auth`] middleware.

pub mod sms;
pub mod status;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Extension, Router,
};
use tower_http::trace::TraceLayer;

use crate::auth::{self, Users};
use crate::error::ApiError;
use crate::AppState;

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    let users = Users(Arc::new(state.config.auth.users.clone()));

    let public_routes = Router::new().route("/api/v1.0/sms", get(sms::index));

    let authed_routes = Router::new()
        .route("/api/v1.0/sms/outgoing", post(sms::create_sms))
        .route("/api/v1.0/sms/simple_send", get(sms::simple_send))
        .route("/api/v1.0/sms/sent/{message_id}", get(sms::get_sent))
        .route("/api/v1.0/sms/modem_status", get(status::modem_status))
        .route("/api/v1.0/sms/smsd_status", get(status::smsd_status))
        .route_layer(middleware::from_fn(auth::require_basic_auth));

    Router::new()
        .merge(public_routes)
        .merge(authed_routes)
        .fallback(not_found)
        .layer(Extension(users))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
