//! Relais same-origin vers les hôtes de la liste blanche
//!
//! Le proxy est une frontière de sécurité : l'URL cible doit être absolue
//! et son hôte figurer dans la liste blanche statique, sinon la requête
//! est rejetée sans jamais être relayée. Les réponses textuelles éligibles
//! passent par le cache read-through ; le reste est relayé en flux.

use crate::error::GatewayError;
use crate::headers::{apply_cors, sanitize_request_headers, sanitize_response_headers};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use pmorescache::{cache_key, CacheCategory, CachedPayload};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    pub url: Option<String>,
}

/// Valide l'URL cible : absolue, http(s), hôte en liste blanche
fn validate_target(state: &AppState, raw: &str) -> Result<reqwest::Url, GatewayError> {
    let url =
        reqwest::Url::parse(raw).map_err(|e| GatewayError::InvalidUrl(format!("{raw}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(GatewayError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| GatewayError::InvalidUrl(format!("{raw}: no host")))?;

    if !state.is_host_allowed(host) {
        return Err(GatewayError::HostNotAllowed(host.to_string()));
    }
    Ok(url)
}

/// `GET /proxy?url=<url-absolue>`
pub async fn proxy_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ProxyParams>,
) -> Result<Response, GatewayError> {
    let raw = params.url.as_deref().ok_or(GatewayError::MissingUrl)?;
    let target = validate_target(&state, raw)?;
    let origin = headers.get(http::header::ORIGIN).cloned();

    let key = cache_key(CacheCategory::Generic.namespace(), &[("url", target.as_str())]);

    // Le prédicat d'éligibilité est le même en lecture et en écriture :
    // un hit stocké n'est pas servi à une requête porteuse de credentials
    if let Some(payload) = state.cache.get(&key).await {
        if state.policy.is_cacheable(
            &Method::GET,
            &headers,
            200,
            Some(&payload.content_type),
            None,
            payload.body.len(),
        ) {
            debug!(key = %key, "Proxy cache hit");
            return Ok(cached_response(&payload, origin.as_ref()));
        }
    }

    let outbound = sanitize_request_headers(&headers, &state.user_agent);
    let upstream = state
        .client
        .get(target.clone())
        .headers(outbound)
        .send()
        .await
        .map_err(|e| GatewayError::UpstreamFailed(summarize(&e)))?;

    let status = upstream.status();
    let mut response_headers = sanitize_response_headers(upstream.headers());
    apply_cors(&mut response_headers, origin.as_ref());

    let content_type = response_headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let cache_control = response_headers
        .get(http::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    // Les corps binaires ou trop grands ne seront jamais cachés : relai
    // en flux, sans mise en mémoire
    let buffer_worthy = status.is_success()
        && is_small_text(
            content_type.as_deref(),
            upstream.content_length(),
            state.policy.max_body_bytes,
        );

    if !buffer_worthy {
        let mut builder = Response::builder().status(status);
        if let Some(h) = builder.headers_mut() {
            *h = with_cache_tag(response_headers, "MISS");
        }
        return builder
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| GatewayError::UpstreamFailed(e.to_string()));
    }

    let body = upstream
        .bytes()
        .await
        .map_err(|e| GatewayError::UpstreamFailed(summarize(&e)))?;

    if state.policy.is_cacheable(
        &Method::GET,
        &headers,
        status.as_u16(),
        content_type.as_deref(),
        cache_control.as_deref(),
        body.len(),
    ) {
        let ttl = CacheCategory::Generic.ttl(&state.ttls);
        let payload = CachedPayload::new(
            body.clone(),
            content_type.as_deref().unwrap_or("text/plain"),
            ttl,
        );
        state.cache.put(&key, payload).await;
    }

    let mut builder = Response::builder().status(status);
    if let Some(h) = builder.headers_mut() {
        *h = with_cache_tag(response_headers, "MISS");
    }
    builder
        .body(Body::from(body))
        .map_err(|e| GatewayError::UpstreamFailed(e.to_string()))
}

/// `OPTIONS /proxy` : préflight CORS, cache de 24 h
pub async fn proxy_preflight(headers: HeaderMap) -> Response {
    let origin = headers.get(http::header::ORIGIN);
    let allow_origin = origin
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));

    (
        StatusCode::NO_CONTENT,
        [
            (http::header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin),
            (
                http::header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, OPTIONS"),
            ),
            (
                http::header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("*"),
            ),
            (
                http::header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_static("86400"),
            ),
            (http::header::VARY, HeaderValue::from_static("Origin")),
        ],
    )
        .into_response()
}

pub(crate) fn cached_response(payload: &CachedPayload, origin: Option<&HeaderValue>) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(ct) = HeaderValue::from_str(&payload.content_type) {
        headers.insert(http::header::CONTENT_TYPE, ct);
    }
    apply_cors(&mut headers, origin);
    let headers = with_cache_tag(headers, "HIT");

    let mut builder = Response::builder().status(StatusCode::OK);
    if let Some(h) = builder.headers_mut() {
        *h = headers;
    }
    builder
        .body(Body::from(payload.body.clone()))
        .unwrap_or_else(|e| {
            warn!(error = %e, "Cached response assembly failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

pub(crate) fn with_cache_tag(mut headers: HeaderMap, tag: &'static str) -> HeaderMap {
    headers.insert("x-cache", HeaderValue::from_static(tag));
    headers
}

fn is_small_text(content_type: Option<&str>, length: Option<u64>, ceiling: usize) -> bool {
    let textual = match content_type {
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/") || ct.contains("json")
        }
        None => false,
    };
    let small = match length {
        Some(len) => len <= ceiling as u64,
        // Longueur inconnue : on bufferise et le prédicat tranchera
        None => true,
    };
    textual && small
}

/// Résumé court d'une erreur reqwest (statut ou message transport)
pub(crate) fn summarize(e: &reqwest::Error) -> String {
    match e.status() {
        Some(status) => format!("HTTP {status}"),
        None => e.to_string(),
    }
}
