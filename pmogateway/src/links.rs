//! Lookup de liens de plateformes avec cache read-through
//!
//! `GET /links?url=...&userCountry=...&platform=...` interroge l'upstream
//! de résolution de liens. La clé de cache est dérivée de l'ensemble
//! normalisé des paramètres ; un échec du primaire déclenche une unique
//! tentative sur l'upstream de secours avant le 502 combiné.

use crate::error::GatewayError;
use crate::headers::apply_cors;
use crate::proxy::{cached_response, summarize, with_cache_tag};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use pmorescache::{cache_key, CacheCategory, CachedPayload};
use serde::Deserialize;
use tracing::{debug, warn};

/// Paramètres reconnus du lookup ; tout le reste est ignoré
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LinksParams {
    pub url: Option<String>,
    pub user_country: Option<String>,
    pub song_if_single: Option<String>,
    pub platform: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub id: Option<String>,
    pub key: Option<String>,
}

impl LinksParams {
    /// Ensemble normalisé (trié par `cache_key`) des paramètres présents
    fn normalized(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        fn push<'a>(
            pairs: &mut Vec<(&'static str, &'a str)>,
            name: &'static str,
            value: &'a Option<String>,
        ) {
            if let Some(value) = value {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    pairs.push((name, trimmed));
                }
            }
        }
        push(&mut pairs, "url", &self.url);
        push(&mut pairs, "userCountry", &self.user_country);
        push(&mut pairs, "songIfSingle", &self.song_if_single);
        push(&mut pairs, "platform", &self.platform);
        push(&mut pairs, "type", &self.entity_type);
        push(&mut pairs, "id", &self.id);
        push(&mut pairs, "key", &self.key);
        pairs
    }
}

/// Provenance de la réponse, exposée dans `X-Songlink-Source`
#[derive(Debug, Clone, Copy)]
enum LinkSource {
    Primary,
    Backup,
    BackupFallback,
}

impl LinkSource {
    fn as_header(self) -> &'static str {
        match self {
            LinkSource::Primary => "primary",
            LinkSource::Backup => "backup",
            LinkSource::BackupFallback => "backup-fallback",
        }
    }
}

/// `GET /links`
pub async fn links_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LinksParams>,
) -> Result<Response, GatewayError> {
    if params.url.is_none() && params.id.is_none() {
        return Err(GatewayError::MissingUrl);
    }

    let origin = headers.get(http::header::ORIGIN).cloned();
    let pairs = params.normalized();
    let key = cache_key(CacheCategory::Track.namespace(), &pairs);

    if let Some(payload) = state.cache.get(&key).await {
        if state.policy.is_cacheable(
            &Method::GET,
            &headers,
            200,
            Some(&payload.content_type),
            None,
            payload.body.len(),
        ) {
            debug!(key = %key, "Links cache hit");
            return Ok(cached_response(&payload, origin.as_ref()));
        }
    }

    let (body, content_type, cache_control, source) = fetch_links(&state, &pairs).await?;

    if state.policy.is_cacheable(
        &Method::GET,
        &headers,
        200,
        content_type.as_deref(),
        cache_control.as_deref(),
        body.len(),
    ) {
        let ttl = CacheCategory::Track.ttl(&state.ttls);
        state
            .cache
            .put(
                &key,
                CachedPayload::new(
                    body.clone(),
                    content_type.as_deref().unwrap_or("application/json"),
                    ttl,
                ),
            )
            .await;
    }

    let mut response_headers = HeaderMap::new();
    if let Some(ct) = content_type.as_deref().and_then(|ct| HeaderValue::from_str(ct).ok()) {
        response_headers.insert(http::header::CONTENT_TYPE, ct);
    }
    apply_cors(&mut response_headers, origin.as_ref());
    let mut response_headers = with_cache_tag(response_headers, "MISS");
    response_headers.insert(
        "x-songlink-source",
        HeaderValue::from_static(source.as_header()),
    );

    let mut builder = Response::builder().status(StatusCode::OK);
    if let Some(h) = builder.headers_mut() {
        *h = response_headers;
    }
    builder
        .body(Body::from(body))
        .map_err(|e| GatewayError::UpstreamFailed(e.to_string()))
}

/// Interroge le primaire puis, au besoin, le secours (une seule fois)
async fn fetch_links(
    state: &AppState,
    pairs: &[(&'static str, &str)],
) -> Result<(Bytes, Option<String>, Option<String>, LinkSource), GatewayError> {
    let primary = state.links_upstream.as_deref().filter(|u| !u.is_empty());
    let backup = state.links_backup.as_deref().filter(|u| !u.is_empty());

    let mut failures = Vec::new();

    if let Some(base) = primary {
        match fetch_one(state, base, pairs).await {
            Ok((body, ct, cc)) => return Ok((body, ct, cc, LinkSource::Primary)),
            Err(reason) => {
                warn!(upstream = %base, reason = %reason, "Primary links upstream failed");
                failures.push(format!("primary: {reason}"));
            }
        }
    }

    if let Some(base) = backup {
        let source = if primary.is_some() {
            LinkSource::BackupFallback
        } else {
            LinkSource::Backup
        };
        match fetch_one(state, base, pairs).await {
            Ok((body, ct, cc)) => return Ok((body, ct, cc, source)),
            Err(reason) => {
                warn!(upstream = %base, reason = %reason, "Backup links upstream failed");
                failures.push(format!("backup: {reason}"));
            }
        }
    }

    if failures.is_empty() {
        return Err(GatewayError::UpstreamFailed(
            "no links upstream configured".to_string(),
        ));
    }
    Err(GatewayError::AllUpstreamsFailed(failures.join("; ")))
}

async fn fetch_one(
    state: &AppState,
    base: &str,
    pairs: &[(&'static str, &str)],
) -> Result<(Bytes, Option<String>, Option<String>), String> {
    let response = state
        .client
        .get(base)
        .header(http::header::USER_AGENT, &state.user_agent)
        .query(pairs)
        .send()
        .await
        .map_err(|e| summarize(&e))?;

    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status().as_u16()));
    }

    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let cache_control = response
        .headers()
        .get(http::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let body = response.bytes().await.map_err(|e| summarize(&e))?;
    Ok((body, content_type, cache_control))
}
