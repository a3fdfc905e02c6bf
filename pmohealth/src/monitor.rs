//! Moniteur de santé des endpoints
//!
//! Le moniteur est un état partagé à l'échelle du processus : créé au
//! démarrage en `Idle`, il passe en `Checking` pendant un tour de sondes,
//! puis en `Complete` quand toutes les sondes sont résolues. Un tour est
//! relancé à intervalle fixe. Deux tours ne se chevauchent jamais : un
//! appel pendant un tour en cours est un no-op qui retourne l'ensemble
//! sain courant.

use crate::target::ApiTarget;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use pmoconfig::Config;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Statut du cycle de sondes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Idle,
    Checking,
    Complete,
}

/// État interne du moniteur
struct HealthState {
    status: ProbeStatus,
    healthy: Vec<ApiTarget>,
    last_checked_at: Option<DateTime<Utc>>,
}

/// Vue sérialisable de l'état de santé (pour l'API REST)
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: ProbeStatus,
    pub healthy_targets: Vec<ApiTarget>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Moniteur de santé des mirrors du catalogue
///
/// Conçu pour être utilisé derrière un `Arc<HealthMonitor>` partagé entre
/// la passerelle, le client catalogue et la tâche de re-sondage.
pub struct HealthMonitor {
    targets: Vec<ApiTarget>,
    state: Arc<RwLock<HealthState>>,
    client: reqwest::Client,
    probe_track_id: String,
    probe_timeout: Duration,
    recheck_interval: Duration,
}

impl HealthMonitor {
    /// Crée un moniteur pour la liste de mirrors donnée
    pub fn new(
        mut targets: Vec<ApiTarget>,
        probe_track_id: impl Into<String>,
        probe_timeout: Duration,
        recheck_interval: Duration,
    ) -> Self {
        targets.sort_by_key(|t| t.priority);

        Self {
            targets,
            state: Arc::new(RwLock::new(HealthState {
                status: ProbeStatus::Idle,
                healthy: Vec::new(),
                last_checked_at: None,
            })),
            client: reqwest::Client::new(),
            probe_track_id: probe_track_id.into(),
            probe_timeout,
            recheck_interval,
        }
    }

    /// Construit le moniteur depuis la configuration du processus
    pub fn from_config(config: &Config) -> Self {
        let targets = config
            .get_api_targets()
            .into_iter()
            .map(ApiTarget::from)
            .collect();

        Self::new(
            targets,
            config.get_probe_track_id(),
            Duration::from_secs(config.get_probe_timeout_secs()),
            Duration::from_secs(config.get_recheck_interval_secs()),
        )
    }

    /// Liste configurée complète (saine ou non)
    pub fn targets(&self) -> &[ApiTarget] {
        &self.targets
    }

    /// Lance un tour de sondes sur tous les mirrors
    ///
    /// Toutes les sondes du tour courent en parallèle ; le tour ne se
    /// termine que lorsque chacune est résolue (succès ou échec), jamais
    /// partiellement. Si un tour est déjà en cours, l'appel retourne
    /// immédiatement l'ensemble sain courant sans relancer de sondes.
    pub async fn check_all(&self) -> Vec<ApiTarget> {
        {
            let mut state = self.state.write().await;
            if state.status == ProbeStatus::Checking {
                debug!("Health check already in progress, skipping");
                return state.healthy.clone();
            }
            state.status = ProbeStatus::Checking;
        }

        let probes = self.targets.iter().map(|t| self.probe(t));
        let results = join_all(probes).await;

        // Les cibles sont déjà triées par priorité : l'ordre de sortie la préserve
        let healthy: Vec<ApiTarget> = self
            .targets
            .iter()
            .zip(results)
            .filter_map(|(target, ok)| ok.then(|| target.clone()))
            .collect();

        info!(
            healthy = healthy.len(),
            total = self.targets.len(),
            "Health check round complete"
        );

        // Remplacement atomique : aucun lecteur ne voit un ensemble partiel
        let mut state = self.state.write().await;
        state.healthy = healthy.clone();
        state.status = ProbeStatus::Complete;
        state.last_checked_at = Some(Utc::now());

        healthy
    }

    /// Sonde un mirror ; le corps de la réponse n'est pas lu
    async fn probe(&self, target: &ApiTarget) -> bool {
        let url = target.probe_url(&self.probe_track_id);
        let request = self.client.get(&url).send();

        match tokio::time::timeout(self.probe_timeout, request).await {
            Ok(Ok(response)) if response.status().is_success() => true,
            Ok(Ok(response)) => {
                warn!(target = %target.id, status = %response.status(), "Probe rejected");
                false
            }
            Ok(Err(e)) => {
                warn!(target = %target.id, error = %e, "Probe failed");
                false
            }
            Err(_) => {
                warn!(target = %target.id, timeout = ?self.probe_timeout, "Probe timed out");
                false
            }
        }
    }

    /// Ensemble sain courant, dans l'ordre de priorité
    pub async fn healthy_targets(&self) -> Vec<ApiTarget> {
        self.state.read().await.healthy.clone()
    }

    /// Mirror préféré : premier élément de l'ensemble sain
    pub async fn preferred(&self) -> Option<ApiTarget> {
        self.state.read().await.healthy.first().cloned()
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        let state = self.state.read().await;
        HealthSnapshot {
            status: state.status,
            healthy_targets: state.healthy.clone(),
            last_checked_at: state.last_checked_at,
        }
    }

    /// Arme le re-sondage périodique
    ///
    /// Le premier tour part immédiatement, puis un tour toutes les
    /// `recheck_interval` (5 minutes par défaut). La tâche vit aussi
    /// longtemps que le processus.
    pub fn initialize(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.recheck_interval);
            loop {
                ticker.tick().await;
                monitor.check_all().await;
            }
        });
    }
}
