//! HTTP Basic authentication.
//!
//! All endpoints except the bare `GET /api/v1.0/sms` require credentials from
//! the `[auth.users]` table, sent either as `Authorization: Basic ...` or, for
//! clients that can only build URLs, as `username` and `password` query
//! parameters. The authenticated username becomes the message sender.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;

use crate::error::ApiError;

/// Extension type carrying the configured users, injected into the router
/// layer so [`require_basic_auth`] can access it without touching `AppState`.
#[derive(Clone)]
pub struct Users(pub Arc<HashMap<String, String>>);

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

/// Axum middleware that rejects requests without valid credentials with
/// `401 {"error": "Unauthorized access"}`.
pub async fn require_basic_auth(mut request: Request, next: Next) -> Response {
    let Some(Users(users)) = request.extensions().get::<Users>().cloned() else {
        return ApiError::Internal.into_response();
    };

    let Some((username, password)) = credentials(&request) else {
        return ApiError::Unauthorized.into_response();
    };

    if !verify(&users, &username, &password) {
        tracing::info!("Rejected credentials for {username:?}");
        return ApiError::Unauthorized.into_response();
    }

    request.extensions_mut().insert(Identity(username));
    next.run(request).await
}

/// Credentials from the `Authorization` header, falling back to the query
/// string only when no header is present.
fn credentials(request: &Request) -> Option<(String, String)> {
    if let Some(header) = request.headers().get("authorization") {
        return parse_basic(header.to_str().ok()?);
    }

    let Query(params) = Query::<Vec<(String, String)>>::try_from_uri(request.uri()).ok()?;
    let find = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };
    Some((find("username")?, find("password")?))
}

/// Parse `Basic <base64(user:pass)>`. The scheme is case-insensitive.
fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Unknown users are still compared against a dummy so the response time
/// does not reveal which usernames exist.
fn verify(users: &HashMap<String, String>, username: &str, password: &str) -> bool {
    match users.get(username) {
        Some(expected) => constant_time_eq(expected.as_bytes(), password.as_bytes()),
        None => {
            let _ = constant_time_eq(b"\0invalid-user-placeholder\0", password.as_bytes());
            false
        }
    }
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
///
/// Always iterates over the full length of `expected` regardless of `provided`
/// length, so an attacker cannot determine the password length from response
/// times.
pub fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    let mut diff = u8::from(expected.len() != provided.len());
    for (i, &e) in expected.iter().enumerate() {
        let p = provided.get(i).copied().unwrap_or(0xff);
        diff |= e ^ p;
    }
    diff == 0
}
