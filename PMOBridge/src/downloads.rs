//! API REST des téléchargements
//!
//! Fine couche HTTP au-dessus de l'orchestrateur : démarrage, instantanés,
//! annulation et retrait des tâches, plus l'état du moteur de transcodage.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use pmocatalog::{CatalogClient, Quality};
use pmodownload::{DownloadManager, DownloadOptions, DownloadTask};
use pmotranscode::{EngineLoader, EngineProgress};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Réponse d'erreur générique
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Code d'erreur
    error: String,
    /// Message descriptif
    message: String,
}

fn not_found(task_id: Uuid) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "NOT_FOUND".to_string(),
            message: format!("Download task '{}' not found", task_id),
        }),
    )
        .into_response()
}

/// Dépendances partagées de l'API des téléchargements
#[derive(Clone)]
pub struct DownloadApi {
    pub manager: Arc<DownloadManager>,
    pub catalog: Arc<CatalogClient>,
    pub loader: Arc<EngineLoader>,
    pub directory: PathBuf,
    pub transcode_enabled: bool,
}

pub fn router(api: DownloadApi) -> Router {
    Router::new()
        .route("/api/downloads", post(start_download).get(list_downloads))
        .route("/api/downloads/{id}", get(get_download).delete(dismiss_download))
        .route("/api/downloads/{id}/cancel", post(cancel_download))
        .route("/api/engine", get(engine_status))
        .with_state(api)
}

#[derive(Debug, Deserialize)]
struct StartDownloadRequest {
    track_id: String,
    #[serde(default)]
    quality: Quality,
    /// Injection des métadonnées (si le pipeline est activé)
    #[serde(default = "default_true")]
    embed_metadata: bool,
    #[serde(default)]
    skip_countdown: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct StartDownloadResponse {
    task_id: Uuid,
    filename: String,
}

/// Démarre un téléchargement et retourne l'identifiant de la tâche
async fn start_download(
    State(api): State<DownloadApi>,
    Json(request): Json<StartDownloadRequest>,
) -> Response {
    let track = match api.catalog.get_track(&request.track_id).await {
        Ok(track) => track,
        Err(e) => {
            return (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: "CATALOG_ERROR".to_string(),
                    message: format!("Cannot resolve track '{}': {}", request.track_id, e),
                }),
            )
                .into_response()
        }
    };

    let filename = build_filename(&track.default_filename(), request.quality);
    let (task_id, _token) = api.manager.begin(&request.track_id, &filename).await;

    let options = DownloadOptions {
        quality: request.quality,
        embed_metadata: request.embed_metadata && api.transcode_enabled,
        skip_countdown: request.skip_countdown,
        directory: api.directory.clone(),
    };
    let api_task = api.clone();
    tokio::spawn(async move {
        if let Err(e) = api_task
            .manager
            .run(task_id, &api_task.catalog, &api_task.loader, &options)
            .await
        {
            warn!(task_id = %task_id, error = %e, "Download ended in error");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(StartDownloadResponse { task_id, filename }),
    )
        .into_response()
}

/// Liste les tâches actives
async fn list_downloads(State(api): State<DownloadApi>) -> Json<Vec<DownloadTask>> {
    Json(api.manager.list().await)
}

async fn get_download(State(api): State<DownloadApi>, Path(id): Path<Uuid>) -> Response {
    match api.manager.snapshot(id).await {
        Some(task) => (StatusCode::OK, Json(task)).into_response(),
        None => not_found(id),
    }
}

async fn cancel_download(State(api): State<DownloadApi>, Path(id): Path<Uuid>) -> Response {
    match api.manager.cancel(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => not_found(id),
    }
}

async fn dismiss_download(State(api): State<DownloadApi>, Path(id): Path<Uuid>) -> Response {
    match api.manager.dismiss(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => not_found(id),
    }
}

/// État courant du moteur de transcodage (statut, progression, compte à rebours)
async fn engine_status(State(api): State<DownloadApi>) -> Json<EngineProgress> {
    Json(api.loader.subscribe().borrow().clone())
}

fn build_filename(base: &str, quality: Quality) -> String {
    let extension = match quality {
        Quality::Flac => "flac",
        Quality::Low | Quality::High => "mp3",
    };
    // Les séparateurs de chemin n'ont rien à faire dans un nom de fichier
    let safe: String = base
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    format!("{}.{}", safe.trim(), extension)
}
