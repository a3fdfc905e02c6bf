//! Nettoyage des en-têtes relayés et en-têtes CORS de réponse

use http::header::{HeaderMap, HeaderName, HeaderValue};

/// En-têtes hop-by-hop, jamais relayés dans un sens ni dans l'autre
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// `Cache-Control` par défaut quand l'upstream n'en fournit pas
const DEFAULT_CACHE_CONTROL: &str = "public, max-age=300";

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.iter().any(|h| name.as_str().eq_ignore_ascii_case(h))
}

/// En-têtes de requête à transmettre à l'upstream
///
/// Retire les en-têtes hop-by-hop et `Host` (l'upstream reçoit le sien),
/// et injecte un `User-Agent` par défaut s'il est absent.
pub fn sanitize_request_headers(inbound: &HeaderMap, user_agent: &str) -> HeaderMap {
    let mut outbound = HeaderMap::new();
    for (name, value) in inbound {
        if is_hop_by_hop(name) || name == http::header::HOST {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }

    if !outbound.contains_key(http::header::USER_AGENT) {
        if let Ok(value) = HeaderValue::from_str(user_agent) {
            outbound.insert(http::header::USER_AGENT, value);
        }
    }
    outbound
}

/// En-têtes de réponse upstream à relayer au client
pub fn sanitize_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::new();
    for (name, value) in upstream {
        if is_hop_by_hop(name) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound
}

/// Applique les en-têtes CORS et les défauts de cache à une réponse
///
/// L'`Origin` de l'appelant est renvoyé tel quel, `*` à défaut. `Vary`
/// doit lister `Origin` (fusionné avec une valeur existante, jamais
/// écrasé) pour que les caches intermédiaires distinguent les origines.
pub fn apply_cors(headers: &mut HeaderMap, origin: Option<&HeaderValue>) {
    let allow_origin = origin
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    headers.insert(http::header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);

    let vary = match headers.get(http::header::VARY) {
        Some(existing) => {
            let existing = existing.to_str().unwrap_or("");
            if existing
                .split(',')
                .any(|part| part.trim().eq_ignore_ascii_case("origin"))
            {
                None
            } else {
                HeaderValue::from_str(&format!("{existing}, Origin")).ok()
            }
        }
        None => Some(HeaderValue::from_static("Origin")),
    };
    if let Some(vary) = vary {
        headers.insert(http::header::VARY, vary);
    }

    if !headers.contains_key(http::header::CACHE_CONTROL) {
        headers.insert(
            http::header::CACHE_CONTROL,
            HeaderValue::from_static(DEFAULT_CACHE_CONTROL),
        );
    }
}
