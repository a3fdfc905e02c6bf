//! Assemblage du routeur de la passerelle

use crate::links;
use crate::proxy;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

/// Construit le routeur complet de la passerelle
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/proxy",
            get(proxy::proxy_get).options(proxy::proxy_preflight),
        )
        .route("/links", get(links::links_get))
        .route("/api/health", get(health))
        .route("/api/cache/stats", get(cache_stats))
        .with_state(state)
}

/// `GET /api/health` : instantané du moniteur de santé
async fn health(State(state): State<AppState>) -> Json<pmohealth::HealthSnapshot> {
    Json(state.monitor.snapshot().await)
}

#[derive(Debug, Serialize)]
struct CacheStats {
    enabled: bool,
    entry_count: u64,
}

/// `GET /api/cache/stats` : état du cache de réponses
async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(CacheStats {
        enabled: state.cache.is_enabled(),
        entry_count: state.cache.entry_count().await,
    })
}
