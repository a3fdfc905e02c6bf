//! Client haut-niveau du catalogue avec bascule entre mirrors

use crate::error::{CatalogError, Result};
use crate::models::{Quality, Track};
use pmohealth::{ApiTarget, HealthMonitor};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Client du catalogue musical
///
/// Chaque opération essaie les mirrors sains dans l'ordre de priorité et
/// bascule sur le suivant en cas d'erreur de transport ou de statut
/// non-2xx. Quand tous échouent, l'erreur agrège les raisons par mirror.
pub struct CatalogClient {
    monitor: Arc<HealthMonitor>,
    client: reqwest::Client,
}

impl CatalogClient {
    pub fn new(monitor: Arc<HealthMonitor>) -> Self {
        Self {
            monitor,
            client: reqwest::Client::new(),
        }
    }

    /// Mirrors à essayer : les sains d'abord, sinon la liste configurée
    ///
    /// Avant le premier tour de sondes l'ensemble sain est vide ; on
    /// retombe alors sur la liste complète plutôt que d'échouer à froid.
    async fn candidates(&self) -> Result<Vec<ApiTarget>> {
        let healthy = self.monitor.healthy_targets().await;
        let targets = if healthy.is_empty() {
            self.monitor.targets().to_vec()
        } else {
            healthy
        };

        if targets.is_empty() {
            return Err(CatalogError::NoTargets);
        }
        Ok(targets)
    }

    /// Exécute `GET {base}{path}` sur le premier mirror qui répond 2xx
    async fn get_with_failover(&self, path: &str) -> Result<reqwest::Response> {
        let targets = self.candidates().await?;
        let mut failures = Vec::new();

        for target in &targets {
            let url = format!("{}{}", target.base_url.trim_end_matches('/'), path);
            debug!(target = %target.id, url = %url, "Catalog request");

            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    // 404 sur un mirror sain : inutile d'essayer les autres,
                    // la ressource n'existe pas dans le catalogue
                    if status == 404 {
                        return Err(CatalogError::from_status_code(status, path.to_string()));
                    }
                    warn!(target = %target.id, status, "Catalog mirror rejected request");
                    failures.push(format!("{}: HTTP {}", target.id, status));
                }
                Err(e) => {
                    warn!(target = %target.id, error = %e, "Catalog mirror unreachable");
                    failures.push(format!("{}: {}", target.id, e));
                }
            }
        }

        Err(CatalogError::AllTargetsFailed(failures.join("; ")))
    }

    /// Récupère une piste par son id
    pub async fn get_track(&self, track_id: &str) -> Result<Track> {
        let response = self
            .get_with_failover(&format!("/track/?id={}", track_id))
            .await?;
        Ok(response.json::<Track>().await?)
    }

    /// Récupère un album par son id (JSON brut de l'upstream)
    pub async fn get_album(&self, album_id: &str) -> Result<Value> {
        let response = self
            .get_with_failover(&format!("/album/?id={}", album_id))
            .await?;
        Ok(response.json::<Value>().await?)
    }

    /// Récupère une playlist par son id (JSON brut de l'upstream)
    pub async fn get_playlist(&self, playlist_id: &str) -> Result<Value> {
        let response = self
            .get_with_failover(&format!("/playlist/?id={}", playlist_id))
            .await?;
        Ok(response.json::<Value>().await?)
    }

    /// Ouvre le flux de téléchargement d'une piste
    ///
    /// La réponse est retournée telle quelle : c'est à l'appelant de
    /// consommer `bytes_stream()` (l'orchestrateur de téléchargement).
    pub async fn download_stream(
        &self,
        track_id: &str,
        quality: Quality,
    ) -> Result<reqwest::Response> {
        self.get_with_failover(&format!(
            "/stream/?trackId={}&quality={}",
            track_id,
            quality.as_param()
        ))
        .await
    }
}
