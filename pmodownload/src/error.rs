//! Gestion des erreurs de l'orchestrateur

use thiserror::Error;
use uuid::Uuid;

/// Erreurs possibles lors du pilotage d'un téléchargement
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Identifiant absent du registre des tâches actives
    #[error("Unknown download task: {0}")]
    TaskNotFound(Uuid),

    /// Erreur remontée par le client du catalogue
    #[error("Catalog error: {0}")]
    Catalog(#[from] pmocatalog::CatalogError),

    /// Lecture du flux d'octets interrompue
    #[error("Stream error: {0}")]
    Stream(String),

    /// Échec de l'injection des métadonnées
    #[error("Processing error: {0}")]
    Processing(String),

    /// Annulation demandée par l'appelant
    #[error("Download cancelled")]
    Cancelled,

    /// Erreur d'entrée/sortie sur le fichier de destination
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
