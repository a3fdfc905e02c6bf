//! Tests de bout en bout du pilote de téléchargement

use pmocatalog::{CatalogClient, Quality};
use pmodownload::{DownloadManager, DownloadOptions, DownloadStage};
use pmohealth::{ApiTarget, HealthMonitor};
use pmotranscode::{EngineLoader, LoadFn, ProgressFn, TranscodeEngine};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn catalog_for(server: &mockito::ServerGuard) -> CatalogClient {
    let monitor = Arc::new(HealthMonitor::new(
        vec![ApiTarget::new("mirror", server.url(), 1)],
        "42",
        Duration::from_millis(500),
        Duration::from_secs(300),
    ));
    CatalogClient::new(monitor)
}

fn failing_loader() -> Arc<EngineLoader> {
    let load_fn: LoadFn = Box::new(|_progress: ProgressFn| {
        Box::pin(async { Err("engine asset unavailable".to_string()) })
    });
    Arc::new(EngineLoader::new(0, load_fn))
}

fn counting_loader(count: Arc<AtomicUsize>) -> Arc<EngineLoader> {
    let load_fn: LoadFn = Box::new(move |_progress: ProgressFn| {
        let count = count.clone();
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(TranscodeEngine::new(std::env::temp_dir()))
        })
    });
    Arc::new(EngineLoader::new(0, load_fn))
}

/// Fichier WAV minimal, suffisant pour l'écriture de tags
fn minimal_wav() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&36u32.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&44100u32.to_le_bytes());
    bytes.extend_from_slice(&88200u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes
}

async fn mock_track(server: &mut mockito::ServerGuard, id: &str, title: &str) {
    server
        .mock("GET", "/track/")
        .match_query(mockito::Matcher::UrlEncoded("id".into(), id.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(r#"{{"id":"{id}","title":"{title}"}}"#))
        .create_async()
        .await;
}

async fn mock_stream(server: &mut mockito::ServerGuard, id: &str, body: Vec<u8>) {
    server
        .mock("GET", "/stream/")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("trackId".into(), id.into()),
            mockito::Matcher::Regex("quality=".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body(body)
        .create_async()
        .await;
}

#[tokio::test]
async fn test_run_downloads_stream_to_destination() {
    let mut server = mockito::Server::new_async().await;
    let body = b"flac bytes here".to_vec();
    mock_track(&mut server, "42", "Aline").await;
    mock_stream(&mut server, "42", body.clone()).await;

    let catalog = catalog_for(&server);
    let loader = failing_loader();
    let manager = DownloadManager::new();
    let dir = tempfile::tempdir().unwrap();

    let (id, _token) = manager.begin("42", "aline.flac").await;
    let options = DownloadOptions {
        quality: Quality::Flac,
        embed_metadata: false,
        skip_countdown: true,
        directory: dir.path().to_path_buf(),
    };
    manager.run(id, &catalog, &loader, &options).await.unwrap();

    let task = manager.snapshot(id).await.unwrap();
    assert_eq!(task.stage, DownloadStage::Complete);
    assert_eq!(task.bytes_received, body.len() as u64);
    assert_eq!(
        std::fs::read(dir.path().join("aline.flac")).unwrap(),
        body
    );
}

#[tokio::test]
async fn test_engine_failure_still_delivers_unmodified_file() {
    let mut server = mockito::Server::new_async().await;
    let body = b"low quality bytes".to_vec();
    mock_track(&mut server, "7", "Seul").await;
    mock_stream(&mut server, "7", body.clone()).await;

    let catalog = catalog_for(&server);
    let loader = failing_loader();
    let manager = DownloadManager::new();
    let dir = tempfile::tempdir().unwrap();

    let (id, _token) = manager.begin("7", "seul.mp3").await;
    let options = DownloadOptions {
        quality: Quality::Low,
        embed_metadata: true,
        skip_countdown: true,
        directory: dir.path().to_path_buf(),
    };
    // L'indisponibilité du moteur ne doit jamais faire échouer la tâche
    manager.run(id, &catalog, &loader, &options).await.unwrap();

    let task = manager.snapshot(id).await.unwrap();
    assert_eq!(task.stage, DownloadStage::Complete);
    assert_eq!(std::fs::read(dir.path().join("seul.mp3")).unwrap(), body);
}

#[tokio::test]
async fn test_two_downloads_share_a_single_engine_load() {
    let mut server = mockito::Server::new_async().await;
    mock_track(&mut server, "1", "Un").await;
    mock_track(&mut server, "2", "Deux").await;
    mock_stream(&mut server, "1", minimal_wav()).await;
    mock_stream(&mut server, "2", minimal_wav()).await;

    let catalog = catalog_for(&server);
    let count = Arc::new(AtomicUsize::new(0));
    let loader = counting_loader(count.clone());
    let manager = DownloadManager::new();
    let dir = tempfile::tempdir().unwrap();

    let (a, _ta) = manager.begin("1", "un.wav").await;
    let (b, _tb) = manager.begin("2", "deux.wav").await;
    let options = DownloadOptions {
        quality: Quality::Low,
        embed_metadata: true,
        skip_countdown: true,
        directory: dir.path().to_path_buf(),
    };

    let (ra, rb) = tokio::join!(
        manager.run(a, &catalog, &loader, &options),
        manager.run(b, &catalog, &loader, &options)
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(manager.snapshot(a).await.unwrap().stage, DownloadStage::Complete);
    assert_eq!(manager.snapshot(b).await.unwrap().stage, DownloadStage::Complete);
}

#[tokio::test]
async fn test_cancel_during_countdown_removes_partial_file() {
    let mut server = mockito::Server::new_async().await;
    mock_track(&mut server, "9", "Long").await;
    mock_stream(&mut server, "9", minimal_wav()).await;

    let catalog = Arc::new(catalog_for(&server));
    let count = Arc::new(AtomicUsize::new(0));
    let load_fn: LoadFn = {
        let count = count.clone();
        Box::new(move |_progress: ProgressFn| {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(TranscodeEngine::new(std::env::temp_dir()))
            })
        })
    };
    // Compte à rebours long : l'annulation arrive pendant l'attente
    let loader = Arc::new(EngineLoader::new(30, load_fn));
    let manager = Arc::new(DownloadManager::new());
    let dir = tempfile::tempdir().unwrap();

    let (id, _token) = manager.begin("9", "long.wav").await;
    let options = DownloadOptions {
        quality: Quality::Low,
        embed_metadata: true,
        skip_countdown: false,
        directory: dir.path().to_path_buf(),
    };

    let handle = {
        let manager = manager.clone();
        let catalog = catalog.clone();
        let loader = loader.clone();
        tokio::spawn(async move { manager.run(id, &catalog, &loader, &options).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.cancel(id).await.unwrap();

    let result = handle.await.unwrap();
    assert!(result.is_err());
    assert_eq!(manager.snapshot(id).await.unwrap().stage, DownloadStage::Cancelled);
    // Le moteur n'a jamais été chargé et le fichier partiel a été effacé
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("long.wav").exists());
}
