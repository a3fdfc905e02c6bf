//! Événements de progression diffusés aux consommateurs
//!
//! Contrat consommé par la couche UI : une séquence d'événements typés par
//! tâche, de `Started` jusqu'à un terminal `Completed`, `Failed` ou
//! `Cancelled`. Les octets reçus sont garantis non décroissants pour une
//! tâche donnée.

use serde::Serialize;
use uuid::Uuid;

/// Événement du cycle de vie d'un téléchargement
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Started,
    Progress { received: u64, total: Option<u64> },
    Processing,
    Completed,
    Failed { message: String },
    Cancelled,
}

/// Événement daté d'une tâche précise
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub task_id: Uuid,
    #[serde(flatten)]
    pub event: DownloadEvent,
}
