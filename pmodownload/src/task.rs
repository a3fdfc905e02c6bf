//! Tâche de téléchargement et sa machine à états

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// État d'une tâche de téléchargement
///
/// Transitions autorisées :
/// `Pending → Downloading → {Processing → Complete} | Error | Cancelled`.
/// `Complete`, `Error` et `Cancelled` sont terminaux : toute transition
/// demandée sur une tâche terminale est ignorée.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStage {
    Pending,
    Downloading,
    Processing,
    Complete,
    Error,
    Cancelled,
}

impl DownloadStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStage::Complete | DownloadStage::Error | DownloadStage::Cancelled
        )
    }
}

/// Tâche de téléchargement, propriété exclusive de l'orchestrateur
///
/// Les tâches sont identifiées par `task_id`, jamais par `track_id` : la
/// même piste peut être en file deux fois avec des cycles de vie
/// indépendants.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadTask {
    pub task_id: Uuid,
    pub track_id: String,
    pub filename: String,
    pub bytes_received: u64,
    pub bytes_total: Option<u64>,
    pub stage: DownloadStage,
    /// Message d'erreur lisible quand `stage == Error`
    pub error: Option<String>,
    #[serde(skip)]
    pub cancel: CancellationToken,
}

impl DownloadTask {
    pub fn new(track_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            track_id: track_id.into(),
            filename: filename.into(),
            bytes_received: 0,
            bytes_total: None,
            stage: DownloadStage::Pending,
            error: None,
            cancel: CancellationToken::new(),
        }
    }
}
