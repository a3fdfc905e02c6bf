//! # Pipeline de transcodage de PMOBridge
//!
//! Sous-système optionnel et coûteux, chargé paresseusement et au plus une
//! fois par processus. Le premier téléchargement qui en a besoin déclenche
//! un compte à rebours observable (5 s par défaut, annulable et sautable),
//! puis le chargement de l'asset moteur avec progression 0–100. Une fois
//! `Ready`, l'instance est partagée par tous les téléchargements jusqu'à la
//! fin du processus.
//!
//! Un échec de chargement n'est jamais fatal pour un téléchargement :
//! l'orchestrateur livre alors le flux inchangé, sans métadonnées.

pub mod engine;
pub mod error;
pub mod loader;

pub use engine::{TrackTags, TranscodeEngine};
pub use error::EngineError;
pub use loader::{EngineLoader, EngineProgress, EngineStatus, LoadFn, LoadFuture, ProgressFn};
