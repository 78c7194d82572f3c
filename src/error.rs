//! HTTP error envelope: every failure is `{"error": "<message>"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::health::HealthError;
use crate::smsd::SmsdError;
use crate::spool::SpoolError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("Unauthorized access")]
    Unauthorized,
    #[error("Not found")]
    NotFound,
    #[error("Internal error")]
    Internal,
    #[error(transparent)]
    Health(#[from] HealthError),
    #[error(transparent)]
    Smsd(#[from] SmsdError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal | Self::Health(_) | Self::Smsd(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SpoolError> for ApiError {
    fn from(e: SpoolError) -> Self {
        match e {
            SpoolError::NotFound => Self::NotFound,
            SpoolError::Io { .. } => {
                tracing::warn!("{e}");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({"error": self.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::BadRequest("Request error").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(HealthError::WeakSignal).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(matches!(
            ApiError::from(SpoolError::NotFound),
            ApiError::NotFound
        ));
    }

    #[test]
    fn test_messages() {
        assert_eq!(ApiError::BadRequest("missing required params").to_string(), "missing required params");
        assert_eq!(
            ApiError::from(HealthError::ModemUnavailable).to_string(),
            "modem not available"
        );
        assert_eq!(ApiError::from(SmsdError::NotRunning).to_string(), "smsd not running!");
    }
}
