//! # Orchestrateur de téléchargement de PMOBridge
//!
//! Conduit la récupération d'une piste de bout en bout : flux d'octets avec
//! progression, remise optionnelle au pipeline de transcodage pour
//! l'injection des métadonnées, annulation, et compte-rendu d'état terminal.
//!
//! Chaque tâche est identifiée par un [`Uuid`](uuid::Uuid) et possède sa
//! propre machine à états ; les tâches sont indépendantes entre elles. Les
//! consommateurs observent l'avancement sur un canal `broadcast` d'événements
//! typés, seule interface dont la couche UI a besoin.

pub mod error;
pub mod events;
pub mod manager;
pub mod task;

pub use error::DownloadError;
pub use events::{DownloadEvent, TaskEvent};
pub use manager::{DownloadManager, DownloadOptions};
pub use task::{DownloadStage, DownloadTask};
