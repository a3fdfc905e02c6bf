//! Mirrors candidats du catalogue

use pmoconfig::TargetEntry;
use serde::Serialize;

/// Un endpoint upstream candidat, chargé depuis la configuration statique
///
/// Immuable pendant la vie du processus ; `priority` croissante = préféré.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApiTarget {
    pub id: String,
    pub base_url: String,
    pub priority: u32,
}

impl ApiTarget {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, priority: u32) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            priority,
        }
    }

    /// URL de la sonde de santé pour ce mirror
    pub fn probe_url(&self, probe_track_id: &str) -> String {
        format!(
            "{}/track/?id={}&quality=LOW",
            self.base_url.trim_end_matches('/'),
            probe_track_id
        )
    }
}

impl From<TargetEntry> for ApiTarget {
    fn from(entry: TargetEntry) -> Self {
        Self {
            id: entry.id,
            base_url: entry.base_url,
            priority: entry.priority,
        }
    }
}
