//! # Passerelle HTTP de PMOBridge
//!
//! Surface same-origin exposée aux consommateurs UI :
//! - `GET /proxy?url=...` : relais vers un hôte de la liste blanche, avec
//!   nettoyage des en-têtes hop-by-hop et en-têtes CORS sur la réponse
//! - `GET /links?...` : lookup de liens de plateformes, avec cache
//!   read-through et bascule primaire → secours
//! - `GET /api/health` : instantané du moniteur de santé des mirrors
//! - `GET /api/cache/stats` : état du cache de réponses
//!
//! La validation d'hôte du proxy est une frontière de sécurité : aucune
//! URL hors liste blanche n'est jamais relayée.

pub mod error;
pub mod headers;
pub mod links;
pub mod proxy;
pub mod routes;
pub mod state;

pub use error::{ErrorResponse, GatewayError};
pub use routes::router;
pub use state::AppState;
