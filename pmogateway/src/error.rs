//! Gestion des erreurs de la passerelle

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Réponse d'erreur générique
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Code d'erreur
    pub error: String,
    /// Message descriptif
    pub message: String,
}

/// Erreurs de la passerelle, converties en réponses JSON
///
/// Les détails upstream sont résumés (statut + message court) : jamais de
/// trace brute relayée à l'appelant.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Missing required 'url' query parameter")]
    MissingUrl,

    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),

    #[error("Host not in the proxy allow-list: {0}")]
    HostNotAllowed(String),

    #[error("Upstream request failed: {0}")]
    UpstreamFailed(String),

    #[error("All upstreams failed: {0}")]
    AllUpstreamsFailed(String),
}

impl GatewayError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            GatewayError::MissingUrl => (StatusCode::BAD_REQUEST, "MISSING_URL"),
            GatewayError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "INVALID_URL"),
            GatewayError::HostNotAllowed(_) => (StatusCode::BAD_REQUEST, "HOST_NOT_ALLOWED"),
            GatewayError::UpstreamFailed(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            GatewayError::AllUpstreamsFailed(_) => {
                (StatusCode::BAD_GATEWAY, "ALL_UPSTREAMS_FAILED")
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        (
            status,
            Json(ErrorResponse {
                error: code.to_string(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
