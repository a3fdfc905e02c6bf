//! Chargeur paresseux du moteur de transcodage
//!
//! Le chargeur est un singleton gardé par un enum d'état : les transitions
//! suivent uniquement le chemin `Unloaded → CountingDown → Loading → Ready`,
//! ou `Failed` depuis `CountingDown`/`Loading`. Un seul chargement procède
//! même si plusieurs téléchargements le demandent simultanément : les
//! appelants tardifs attendent la transition en cours sur un canal `watch`
//! plutôt que de déclencher un doublon. `Ready` est définitif : le moteur
//! est réutilisé sans recharge jusqu'à la fin du processus.

use crate::engine::TranscodeEngine;
use crate::error::EngineError;
use futures_util::StreamExt;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Statut du moteur partagé
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Unloaded,
    CountingDown,
    Loading,
    Ready,
    Failed,
}

/// Vue observable de la progression du chargement
#[derive(Debug, Clone, Serialize)]
pub struct EngineProgress {
    pub status: EngineStatus,
    /// Progression du chargement, 0–100
    pub load_progress: u8,
    /// Secondes restantes du compte à rebours, le cas échéant
    pub countdown_remaining: Option<u64>,
}

/// Callback de progression du chargement (0–100)
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;
/// Futur retourné par la fonction de chargement
pub type LoadFuture = Pin<Box<dyn Future<Output = Result<TranscodeEngine, String>> + Send>>;
/// Fonction de chargement du moteur, injectable
pub type LoadFn = Box<dyn Fn(ProgressFn) -> LoadFuture + Send + Sync>;

struct LoaderInner {
    status: EngineStatus,
    engine: Option<Arc<TranscodeEngine>>,
    error: Option<String>,
}

/// Chargeur du moteur, partagé à l'échelle du processus
pub struct EngineLoader {
    countdown_secs: u64,
    load_fn: LoadFn,
    inner: Mutex<LoaderInner>,
    progress_tx: watch::Sender<EngineProgress>,
}

impl EngineLoader {
    /// Crée un chargeur avec une fonction de chargement arbitraire
    ///
    /// La fonction reçoit un callback de progression (0–100) et retourne
    /// le moteur construit, ou un message d'erreur.
    pub fn new(countdown_secs: u64, load_fn: LoadFn) -> Self {
        let (progress_tx, _) = watch::channel(EngineProgress {
            status: EngineStatus::Unloaded,
            load_progress: 0,
            countdown_remaining: None,
        });

        Self {
            countdown_secs,
            load_fn,
            inner: Mutex::new(LoaderInner {
                status: EngineStatus::Unloaded,
                engine: None,
                error: None,
            }),
            progress_tx,
        }
    }

    /// Chargeur de production : télécharge l'asset moteur depuis `engine_url`
    ///
    /// Si aucune URL n'est configurée, le chargement échoue proprement et
    /// les téléchargements retombent sur la livraison sans métadonnées.
    pub fn with_asset(
        engine_url: Option<String>,
        engine_dir: PathBuf,
        countdown_secs: u64,
    ) -> Self {
        let load_fn: LoadFn = Box::new(move |progress: ProgressFn| {
            let engine_url = engine_url.clone();
            let engine_dir = engine_dir.clone();
            Box::pin(async move {
                let url = engine_url.ok_or_else(|| "engine asset URL not configured".to_string())?;
                fetch_engine_asset(&url, &engine_dir, progress).await?;
                Ok(TranscodeEngine::new(engine_dir))
            })
        });

        Self::new(countdown_secs, load_fn)
    }

    /// Observateur de la progression (compte à rebours et chargement)
    pub fn subscribe(&self) -> watch::Receiver<EngineProgress> {
        self.progress_tx.subscribe()
    }

    pub async fn status(&self) -> EngineStatus {
        self.inner.lock().await.status
    }

    /// Obtient le moteur partagé, en le chargeant au besoin
    ///
    /// Le premier appelant pilote le compte à rebours puis le chargement ;
    /// les suivants attendent la même transition. `skip_countdown` permet à
    /// un appelant qui a déjà accepté le coût (batch) de sauter l'attente.
    /// `cancel` n'est observé que pendant le compte à rebours : une
    /// annulation à ce stade rend le chargeur à l'état `Unloaded`.
    pub async fn acquire(
        &self,
        skip_countdown: bool,
        cancel: &CancellationToken,
    ) -> Result<Arc<TranscodeEngine>, EngineError> {
        loop {
            enum Action {
                Drive(bool),
                Wait,
            }

            let action = {
                let mut inner = self.inner.lock().await;
                match inner.status {
                    EngineStatus::Ready => match &inner.engine {
                        Some(engine) => return Ok(engine.clone()),
                        None => {
                            return Err(EngineError::LoadFailed(
                                "engine marked ready without instance".to_string(),
                            ))
                        }
                    },
                    EngineStatus::Failed => {
                        return Err(EngineError::LoadFailed(
                            inner.error.clone().unwrap_or_else(|| "unknown".to_string()),
                        ))
                    }
                    EngineStatus::CountingDown | EngineStatus::Loading => Action::Wait,
                    EngineStatus::Unloaded => {
                        // Revendique le chargement sous le verrou : aucun
                        // autre appelant ne peut le démarrer en parallèle
                        inner.status = if skip_countdown || self.countdown_secs == 0 {
                            EngineStatus::Loading
                        } else {
                            EngineStatus::CountingDown
                        };
                        Action::Drive(!skip_countdown && self.countdown_secs > 0)
                    }
                }
            };

            match action {
                Action::Drive(with_countdown) => {
                    return self.drive_load(with_countdown, cancel).await
                }
                Action::Wait => {
                    self.wait_for_transition().await;
                    // L'état a changé (Ready, Failed ou Unloaded après
                    // annulation du compte à rebours) : on réévalue
                }
            }
        }
    }

    /// Attend la fin de la transition en cours
    async fn wait_for_transition(&self) {
        let mut rx = self.progress_tx.subscribe();
        loop {
            {
                let progress = rx.borrow();
                match progress.status {
                    EngineStatus::CountingDown | EngineStatus::Loading => {}
                    _ => return,
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn emit(&self, status: EngineStatus, load_progress: u8, countdown_remaining: Option<u64>) {
        self.progress_tx.send_replace(EngineProgress {
            status,
            load_progress,
            countdown_remaining,
        });
    }

    /// Pilote le compte à rebours puis le chargement (appelant initiateur)
    async fn drive_load(
        &self,
        with_countdown: bool,
        cancel: &CancellationToken,
    ) -> Result<Arc<TranscodeEngine>, EngineError> {
        if with_countdown {
            for remaining in (1..=self.countdown_secs).rev() {
                self.emit(EngineStatus::CountingDown, 0, Some(remaining));
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Engine countdown cancelled before load");
                        let mut inner = self.inner.lock().await;
                        inner.status = EngineStatus::Unloaded;
                        drop(inner);
                        self.emit(EngineStatus::Unloaded, 0, None);
                        return Err(EngineError::Cancelled);
                    }
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
            let mut inner = self.inner.lock().await;
            inner.status = EngineStatus::Loading;
        }

        info!("Loading transcode engine");
        self.emit(EngineStatus::Loading, 0, None);

        let progress_tx = self.progress_tx.clone();
        let progress: ProgressFn = Arc::new(move |pct: u8| {
            progress_tx.send_replace(EngineProgress {
                status: EngineStatus::Loading,
                load_progress: pct.min(100),
                countdown_remaining: None,
            });
        });

        match (self.load_fn)(progress).await {
            Ok(engine) => {
                let engine = Arc::new(engine);
                let mut inner = self.inner.lock().await;
                inner.engine = Some(engine.clone());
                inner.status = EngineStatus::Ready;
                drop(inner);
                self.emit(EngineStatus::Ready, 100, None);
                info!("Transcode engine ready");
                Ok(engine)
            }
            Err(message) => {
                warn!(error = %message, "Transcode engine failed to load");
                let mut inner = self.inner.lock().await;
                inner.error = Some(message.clone());
                inner.status = EngineStatus::Failed;
                drop(inner);
                self.emit(EngineStatus::Failed, 0, None);
                Err(EngineError::LoadFailed(message))
            }
        }
    }
}

/// Télécharge l'asset moteur avec progression dérivée de `Content-Length`
async fn fetch_engine_asset(
    url: &str,
    engine_dir: &PathBuf,
    progress: ProgressFn,
) -> Result<(), String> {
    tokio::fs::create_dir_all(engine_dir)
        .await
        .map_err(|e| format!("cannot create engine directory: {e}"))?;

    let response = reqwest::get(url)
        .await
        .map_err(|e| format!("engine asset fetch failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("engine asset fetch failed: HTTP {}", response.status()));
    }

    let total = response.content_length();
    let path = engine_dir.join("engine.bin");
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| format!("cannot create engine file: {e}"))?;

    let mut stream = response.bytes_stream();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("engine asset read failed: {e}"))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("engine asset write failed: {e}"))?;
        received += chunk.len() as u64;

        match total {
            Some(total) if total > 0 => progress((received * 100 / total) as u8),
            // Taille inconnue : progression indéterminée, on reste à mi-course
            _ => progress(50),
        }
    }

    file.flush()
        .await
        .map_err(|e| format!("engine asset flush failed: {e}"))?;
    progress(100);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_loader(
        count: Arc<AtomicUsize>,
        fail: bool,
        delay: Duration,
    ) -> LoadFn {
        Box::new(move |progress: ProgressFn| {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                progress(100);
                if fail {
                    Err("asset unavailable".to_string())
                } else {
                    Ok(TranscodeEngine::new(std::env::temp_dir()))
                }
            })
        })
    }

    #[tokio::test]
    async fn test_concurrent_acquires_trigger_single_load() {
        let count = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(EngineLoader::new(
            0,
            counting_loader(count.clone(), false, Duration::from_millis(100)),
        ));
        let token = CancellationToken::new();

        let (a, b) = tokio::join!(
            loader.acquire(true, &token),
            loader.acquire(true, &token)
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(loader.status().await, EngineStatus::Ready);
    }

    #[tokio::test]
    async fn test_ready_engine_is_reused_without_reload() {
        let count = Arc::new(AtomicUsize::new(0));
        let loader = EngineLoader::new(
            0,
            counting_loader(count.clone(), false, Duration::from_millis(1)),
        );
        let token = CancellationToken::new();

        let first = loader.acquire(true, &token).await.unwrap();
        let second = loader.acquire(true, &token).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_sticky_and_reported_to_all() {
        let count = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(EngineLoader::new(
            0,
            counting_loader(count.clone(), true, Duration::from_millis(50)),
        ));
        let token = CancellationToken::new();

        let (a, b) = tokio::join!(
            loader.acquire(true, &token),
            loader.acquire(true, &token)
        );

        assert!(matches!(a, Err(EngineError::LoadFailed(_))));
        assert!(matches!(b, Err(EngineError::LoadFailed(_))));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Un appel ultérieur n'essaie pas de recharger
        assert!(matches!(
            loader.acquire(true, &token).await,
            Err(EngineError::LoadFailed(_))
        ));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(loader.status().await, EngineStatus::Failed);
    }

    #[tokio::test]
    async fn test_countdown_cancellation_returns_to_unloaded() {
        let count = Arc::new(AtomicUsize::new(0));
        let loader = EngineLoader::new(
            30,
            counting_loader(count.clone(), false, Duration::from_millis(1)),
        );
        let token = CancellationToken::new();
        token.cancel();

        let result = loader.acquire(false, &token).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(loader.status().await, EngineStatus::Unloaded);

        // Un nouvel appelant peut relancer le chargement
        let fresh = CancellationToken::new();
        assert!(loader.acquire(true, &fresh).await.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_countdown_progress_is_observable() {
        let count = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(EngineLoader::new(
            2,
            counting_loader(count.clone(), false, Duration::from_millis(1)),
        ));
        let mut rx = loader.subscribe();
        let token = CancellationToken::new();

        let handle = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.acquire(false, &token).await })
        };

        // Premier tick du compte à rebours
        rx.changed().await.unwrap();
        {
            let progress = rx.borrow();
            assert_eq!(progress.status, EngineStatus::CountingDown);
            assert_eq!(progress.countdown_remaining, Some(2));
        }

        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }
}
