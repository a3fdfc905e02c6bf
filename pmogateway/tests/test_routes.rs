//! Tests du routeur de la passerelle (proxy, links, santé)

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pmogateway::{router, AppState, ErrorResponse};
use pmohealth::{ApiTarget, HealthMonitor};
use pmorescache::{CachePolicy, CacheStore, CacheTtls};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn test_state(allowed_host: &str, primary: Option<String>, backup: Option<String>) -> AppState {
    let monitor = Arc::new(HealthMonitor::new(
        vec![ApiTarget::new("mirror", "http://127.0.0.1:1", 1)],
        "42",
        Duration::from_millis(500),
        Duration::from_secs(300),
    ));

    AppState {
        client: reqwest::Client::new(),
        cache: Arc::new(CacheStore::new(100)),
        policy: CachePolicy::new(200 * 1024),
        ttls: CacheTtls::default(),
        monitor,
        allowed_hosts: Arc::new(vec![allowed_host.to_string()]),
        user_agent: "PMOBridge/0.1".to_string(),
        links_upstream: primary,
        links_backup: backup,
    }
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

#[tokio::test]
async fn test_proxy_rejects_missing_url() {
    let app = router(test_state("api.example", None, None));
    let response = app
        .oneshot(Request::builder().uri("/proxy").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body.error, "MISSING_URL");
}

#[tokio::test]
async fn test_proxy_rejects_host_outside_allow_list() {
    let app = router(test_state("api.example", None, None));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/proxy?url=https://evil.example/steal")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body.error, "HOST_NOT_ALLOWED");
    assert!(body.message.contains("evil.example"));
}

#[tokio::test]
async fn test_proxy_rejects_malformed_and_non_http_urls() {
    let app = router(test_state("api.example", None, None));

    for target in ["not-a-url", "ftp://api.example/file"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/proxy?url={target}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{target}");
    }
}

#[tokio::test]
async fn test_proxy_relays_and_caches_eligible_responses() {
    let mut server = mockito::Server::new_async().await;
    let upstream = server
        .mock("GET", "/meta")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;

    let app = router(test_state("127.0.0.1", None, None));
    let uri = format!("/proxy?url={}/meta", server.url());

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&uri)
                .header("origin", "https://app.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers().get("x-cache").unwrap(), "MISS");
    assert_eq!(
        first.headers().get("access-control-allow-origin").unwrap(),
        "https://app.example"
    );
    let vary = first.headers().get("vary").unwrap().to_str().unwrap();
    assert!(vary.to_ascii_lowercase().contains("origin"));
    assert_eq!(body_bytes(first).await, br#"{"ok":true}"#);

    // Seconde requête identique : servie du cache, l'upstream n'est pas resollicité
    let second = app
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
    assert_eq!(body_bytes(second).await, br#"{"ok":true}"#);

    upstream.assert_async().await;
}

#[tokio::test]
async fn test_proxy_authorization_header_bypasses_cache() {
    let mut server = mockito::Server::new_async().await;
    let upstream = server
        .mock("GET", "/meta")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true}"#)
        .expect(2)
        .create_async()
        .await;

    let app = router(test_state("127.0.0.1", None, None));
    let uri = format!("/proxy?url={}/meta", server.url());

    // Amorce le cache
    let plain = app
        .clone()
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(plain.headers().get("x-cache").unwrap(), "MISS");

    // Une requête porteuse de credentials ne touche jamais le cache
    let authed = app
        .oneshot(
            Request::builder()
                .uri(&uri)
                .header("authorization", "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(authed.status(), StatusCode::OK);
    assert_eq!(authed.headers().get("x-cache").unwrap(), "MISS");

    upstream.assert_async().await;
}

#[tokio::test]
async fn test_proxy_streams_binary_bodies_without_caching() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/cover.jpg")
        .with_status(200)
        .with_header("content-type", "image/jpeg")
        .with_body(vec![0xFFu8; 512])
        .expect(2)
        .create_async()
        .await;

    let app = router(test_state("127.0.0.1", None, None));
    let uri = format!("/proxy?url={}/cover.jpg", server.url());

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");
        assert_eq!(body_bytes(response).await.len(), 512);
    }
}

#[tokio::test]
async fn test_proxy_preflight_advertises_cors() {
    let app = router(test_state("api.example", None, None));
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/proxy")
                .header("origin", "https://app.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get("access-control-allow-methods").unwrap(),
        "GET, OPTIONS"
    );
    assert_eq!(response.headers().get("access-control-max-age").unwrap(), "86400");
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "https://app.example"
    );
}

#[tokio::test]
async fn test_links_falls_back_to_backup_upstream() {
    let mut primary = mockito::Server::new_async().await;
    let mut backup = mockito::Server::new_async().await;

    primary
        .mock("GET", "/")
        .match_query(mockito::Matcher::Any)
        .with_status(503)
        .create_async()
        .await;
    backup
        .mock("GET", "/")
        .match_query(mockito::Matcher::UrlEncoded(
            "url".into(),
            "https://song.example/t/1".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"links":[]}"#)
        .create_async()
        .await;

    let app = router(test_state(
        "api.example",
        Some(primary.url()),
        Some(backup.url()),
    ));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/links?url=https://song.example/t/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");
    assert_eq!(
        response.headers().get("x-songlink-source").unwrap(),
        "backup-fallback"
    );
}

#[tokio::test]
async fn test_links_hit_on_identical_normalized_params() {
    let mut primary = mockito::Server::new_async().await;
    let upstream = primary
        .mock("GET", "/")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"links":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let app = router(test_state("api.example", Some(primary.url()), None));
    let uri = "/links?url=https://song.example/t/1&userCountry=FR";

    let first = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.headers().get("x-cache").unwrap(), "MISS");
    assert_eq!(first.headers().get("x-songlink-source").unwrap(), "primary");

    let second = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");

    upstream.assert_async().await;
}

#[tokio::test]
async fn test_links_both_upstreams_failing_returns_combined_502() {
    let mut primary = mockito::Server::new_async().await;
    let mut backup = mockito::Server::new_async().await;
    primary
        .mock("GET", "/")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .create_async()
        .await;
    backup
        .mock("GET", "/")
        .match_query(mockito::Matcher::Any)
        .with_status(429)
        .create_async()
        .await;

    let app = router(test_state(
        "api.example",
        Some(primary.url()),
        Some(backup.url()),
    ));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/links?url=https://song.example/t/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body.error, "ALL_UPSTREAMS_FAILED");
    assert!(body.message.contains("primary: HTTP 500"));
    assert!(body.message.contains("backup: HTTP 429"));
}

#[tokio::test]
async fn test_health_endpoint_reports_snapshot() {
    let app = router(test_state("api.example", None, None));
    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "idle");
    assert!(body["healthy_targets"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cache_stats_endpoint() {
    let app = router(test_state("api.example", None, None));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/cache/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["enabled"], true);
    assert_eq!(body["entry_count"], 0);
}
