//! Gestion des erreurs du client catalogue

use thiserror::Error;

/// Type Result personnalisé pour pmocatalog
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Erreurs possibles lors de l'accès au catalogue
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Erreur HTTP de transport
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Erreur de parsing JSON
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Ressource non trouvée (track, album, playlist)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Quota dépassé (rate limiting)
    #[error("Rate limit exceeded, please try again later")]
    RateLimitExceeded,

    /// Réponse inattendue de l'API du catalogue
    #[error("Catalog API error (code {code}): {message}")]
    ApiError { code: u16, message: String },

    /// Tous les mirrors ont échoué pour cette opération
    #[error("All catalog mirrors failed: {0}")]
    AllTargetsFailed(String),

    /// Aucun mirror configuré
    #[error("No catalog mirror configured")]
    NoTargets,
}

impl CatalogError {
    /// Crée une erreur API depuis un code de statut HTTP et un message
    pub fn from_status_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            404 => Self::NotFound(message.into()),
            429 => Self::RateLimitExceeded,
            _ => Self::ApiError {
                code,
                message: message.into(),
            },
        }
    }
}
