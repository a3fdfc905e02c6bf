//! Modèles des entités du catalogue

use serde::{Deserialize, Serialize};

/// Palier de qualité audio demandé à l'upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Quality {
    Low,
    High,
    Flac,
}

impl Quality {
    /// Valeur du paramètre `quality=` attendu par l'upstream
    pub fn as_param(&self) -> &'static str {
        match self {
            Quality::Low => "LOW",
            Quality::High => "HIGH",
            Quality::Flac => "FLAC",
        }
    }

    /// Les sorties bas débit gagnent à être ré-encapsulées avec métadonnées
    pub fn benefits_from_transcode(&self) -> bool {
        matches!(self, Quality::Low | Quality::High)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Flac
    }
}

/// Piste du catalogue, telle que retournée par `GET /track/?id=...`
///
/// Seuls les champs utilisés par l'orchestrateur de téléchargement et
/// l'injection de métadonnées sont modélisés ; le reste de la réponse
/// upstream est ignoré.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub track_number: Option<u32>,
    #[serde(default)]
    pub disc_number: Option<u32>,
    #[serde(default)]
    pub release_year: Option<u32>,
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl Track {
    /// Nom de fichier par défaut : `Artiste - Titre`
    pub fn default_filename(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}
