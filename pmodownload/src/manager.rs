//! Registre des tâches et pilote du flux de téléchargement

use crate::error::DownloadError;
use crate::events::{DownloadEvent, TaskEvent};
use crate::task::{DownloadStage, DownloadTask};
use futures_util::StreamExt;
use pmocatalog::{CatalogClient, Quality, Track};
use pmotranscode::{EngineError, EngineLoader, TrackTags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Options d'un téléchargement
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub quality: Quality,
    /// Injecter les métadonnées via le pipeline de transcodage
    pub embed_metadata: bool,
    /// Sauter le compte à rebours du chargement moteur (lots automatisés)
    pub skip_countdown: bool,
    /// Répertoire de destination
    pub directory: PathBuf,
}

/// Orchestrateur de téléchargement
///
/// Détient le registre des tâches actives et le canal d'événements. Les
/// opérations de transition sont des no-ops sur une tâche terminale ;
/// `cancel` déclenche le jeton *et* transitionne l'état sans attendre la
/// confirmation d'abandon du transport.
pub struct DownloadManager {
    tasks: RwLock<HashMap<Uuid, DownloadTask>>,
    events: broadcast::Sender<TaskEvent>,
}

impl DownloadManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            tasks: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Flux d'événements de toutes les tâches
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    fn emit(&self, task_id: Uuid, event: DownloadEvent) {
        // Absence d'abonné : les événements sont simplement perdus
        let _ = self.events.send(TaskEvent { task_id, event });
    }

    /// Enregistre une nouvelle tâche en état `Pending`
    pub async fn begin(
        &self,
        track_id: impl Into<String>,
        filename: impl Into<String>,
    ) -> (Uuid, CancellationToken) {
        let task = DownloadTask::new(track_id, filename);
        let task_id = task.task_id;
        let token = task.cancel.clone();

        self.tasks.write().await.insert(task_id, task);
        self.emit(task_id, DownloadEvent::Started);
        info!(task_id = %task_id, "Download task registered");
        (task_id, token)
    }

    /// Met à jour la progression (octets non décroissants)
    ///
    /// Le premier rapport fait passer la tâche de `Pending` à
    /// `Downloading`. Un compte reçu inférieur au précédent est écrêté.
    pub async fn report_progress(
        &self,
        task_id: Uuid,
        received: u64,
        total: Option<u64>,
    ) -> Result<(), DownloadError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(DownloadError::TaskNotFound(task_id))?;

        if task.stage.is_terminal() {
            return Ok(());
        }
        if task.stage == DownloadStage::Pending {
            task.stage = DownloadStage::Downloading;
        }
        task.bytes_received = task.bytes_received.max(received);
        if total.is_some() {
            task.bytes_total = total;
        }
        let (received, total) = (task.bytes_received, task.bytes_total);
        drop(tasks);

        self.emit(task_id, DownloadEvent::Progress { received, total });
        Ok(())
    }

    /// Passe la tâche en post-traitement
    pub async fn mark_processing(&self, task_id: Uuid) -> Result<(), DownloadError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(DownloadError::TaskNotFound(task_id))?;

        if task.stage.is_terminal() {
            return Ok(());
        }
        task.stage = DownloadStage::Processing;
        drop(tasks);

        self.emit(task_id, DownloadEvent::Processing);
        Ok(())
    }

    /// Transition terminale : téléchargement réussi
    pub async fn complete(&self, task_id: Uuid) -> Result<(), DownloadError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(DownloadError::TaskNotFound(task_id))?;

        if task.stage.is_terminal() {
            return Ok(());
        }
        task.stage = DownloadStage::Complete;
        drop(tasks);

        self.emit(task_id, DownloadEvent::Completed);
        info!(task_id = %task_id, "Download complete");
        Ok(())
    }

    /// Transition terminale : échec irrécupérable
    pub async fn fail(
        &self,
        task_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<(), DownloadError> {
        let reason = reason.into();
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(DownloadError::TaskNotFound(task_id))?;

        if task.stage.is_terminal() {
            return Ok(());
        }
        task.stage = DownloadStage::Error;
        task.error = Some(reason.clone());
        drop(tasks);

        self.emit(task_id, DownloadEvent::Failed { message: reason.clone() });
        warn!(task_id = %task_id, reason = %reason, "Download failed");
        Ok(())
    }

    /// Annule la tâche : déclenche le jeton et transitionne immédiatement
    ///
    /// La transition n'attend pas que le transport ait observé le signal.
    /// Annuler une tâche déjà terminale (y compris `Complete`) est un no-op.
    pub async fn cancel(&self, task_id: Uuid) -> Result<(), DownloadError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(DownloadError::TaskNotFound(task_id))?;

        if task.stage.is_terminal() {
            return Ok(());
        }
        task.cancel.cancel();
        task.stage = DownloadStage::Cancelled;
        drop(tasks);

        self.emit(task_id, DownloadEvent::Cancelled);
        info!(task_id = %task_id, "Download cancelled");
        Ok(())
    }

    /// Retire la tâche du registre (après état terminal ou abandon)
    pub async fn dismiss(&self, task_id: Uuid) -> Result<(), DownloadError> {
        self.tasks
            .write()
            .await
            .remove(&task_id)
            .map(|_| ())
            .ok_or(DownloadError::TaskNotFound(task_id))
    }

    /// Instantané d'une tâche
    pub async fn snapshot(&self, task_id: Uuid) -> Option<DownloadTask> {
        self.tasks.read().await.get(&task_id).cloned()
    }

    /// Instantané de toutes les tâches actives
    pub async fn list(&self) -> Vec<DownloadTask> {
        self.tasks.read().await.values().cloned().collect()
    }

    /// Conduit un téléchargement enregistré jusqu'à son état terminal
    ///
    /// En cas d'erreur la tâche est basculée en `Error` (ou `Cancelled` si
    /// le jeton a été déclenché) ; l'appelant n'a rien d'autre à faire que
    /// journaliser le résultat.
    pub async fn run(
        &self,
        task_id: Uuid,
        catalog: &CatalogClient,
        loader: &Arc<EngineLoader>,
        options: &DownloadOptions,
    ) -> Result<(), DownloadError> {
        let (track_id, filename, token) = {
            let tasks = self.tasks.read().await;
            let task = tasks
                .get(&task_id)
                .ok_or(DownloadError::TaskNotFound(task_id))?;
            (task.track_id.clone(), task.filename.clone(), task.cancel.clone())
        };

        match self
            .drive(task_id, &track_id, &filename, &token, catalog, loader, options)
            .await
        {
            Ok(()) => {
                self.complete(task_id).await?;
                Ok(())
            }
            Err(DownloadError::Cancelled) => {
                self.cancel(task_id).await?;
                Err(DownloadError::Cancelled)
            }
            Err(e) => {
                self.fail(task_id, e.to_string()).await?;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        task_id: Uuid,
        track_id: &str,
        filename: &str,
        token: &CancellationToken,
        catalog: &CatalogClient,
        loader: &Arc<EngineLoader>,
        options: &DownloadOptions,
    ) -> Result<(), DownloadError> {
        let track = catalog.get_track(track_id).await?;
        let response = catalog.download_stream(track_id, options.quality).await?;
        let total = response.content_length();

        tokio::fs::create_dir_all(&options.directory).await?;
        let path = options.directory.join(filename);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    // Libère le transport et efface le fichier partiel
                    drop(stream);
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(DownloadError::Cancelled);
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        file.write_all(&bytes).await?;
                        received += bytes.len() as u64;
                        self.report_progress(task_id, received, total).await?;
                    }
                    Some(Err(e)) => {
                        drop(file);
                        let _ = tokio::fs::remove_file(&path).await;
                        return Err(DownloadError::Stream(e.to_string()));
                    }
                    None => break,
                },
            }
        }
        file.flush().await?;

        if options.embed_metadata && options.quality.benefits_from_transcode() {
            match loader.acquire(options.skip_countdown, token).await {
                Ok(engine) => {
                    self.mark_processing(task_id).await?;
                    self.inject_tags(&engine, &path, &track).await?;
                }
                Err(EngineError::Cancelled) => {
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(DownloadError::Cancelled);
                }
                // Moteur indisponible : livraison du fichier inchangé,
                // jamais un échec du téléchargement
                Err(e) => {
                    warn!(
                        task_id = %task_id,
                        error = %e,
                        "Transcode engine unavailable, delivering unmodified file"
                    );
                }
            }
        }

        Ok(())
    }

    /// Injection des tags (bloquante, déléguée hors du runtime)
    async fn inject_tags(
        &self,
        engine: &Arc<pmotranscode::TranscodeEngine>,
        path: &Path,
        track: &Track,
    ) -> Result<(), DownloadError> {
        let tags = build_tags(track).await;
        let engine = engine.clone();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || engine.process(&path, &tags))
            .await
            .map_err(|e| DownloadError::Processing(e.to_string()))?
            .map_err(|e| DownloadError::Processing(e.to_string()))
    }
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Construit les tags à écrire, pochette comprise si disponible
///
/// L'échec du téléchargement de la pochette n'est pas bloquant : la piste
/// est livrée sans illustration.
async fn build_tags(track: &Track) -> TrackTags {
    let cover = match &track.cover_url {
        Some(url) => match fetch_cover(url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!(url = %url, error = %e, "Cover art fetch failed, skipping");
                None
            }
        },
        None => None,
    };

    TrackTags {
        title: Some(track.title.clone()),
        artist: track.artist.clone(),
        album: track.album.clone(),
        track_number: track.track_number,
        disc_number: track.disc_number,
        year: track.release_year,
        cover,
    }
}

async fn fetch_cover(url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let response = reqwest::get(url).await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}
