//! Gestion des erreurs du pipeline de transcodage

use thiserror::Error;

/// Erreurs possibles du chargeur et du moteur
#[derive(Error, Debug)]
pub enum EngineError {
    /// Le chargement du moteur a échoué (état `Failed`, définitif)
    #[error("Engine load failed: {0}")]
    LoadFailed(String),

    /// L'appelant a annulé pendant le compte à rebours
    #[error("Engine load cancelled during countdown")]
    Cancelled,

    /// Erreur d'écriture des tags
    #[error("Tag writing error: {0}")]
    Tagging(#[from] lofty::error::LoftyError),

    /// Erreur d'entrée/sortie sur le fichier livré
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
