//! Prédicat d'éligibilité au cache
//!
//! Une paire requête/réponse n'est cachable que si toutes les conditions
//! suivantes sont réunies :
//! - méthode de lecture sûre (GET)
//! - aucune en-tête porteuse de credentials (authorization, cookie, range)
//! - statut 2xx
//! - corps sous le plafond d'octets configuré
//! - type de contenu texte ou JSON
//! - pas de `no-store` ni `private` dans `Cache-Control`
//!
//! Le même prédicat est utilisé en lecture et en écriture : il n'existe
//! aucune politique asymétrique.

use http::{HeaderMap, Method};

/// En-têtes de requête interdisant toute mise en cache
const BLOCKED_REQUEST_HEADERS: [&str; 3] = ["authorization", "cookie", "range"];

/// Politique d'éligibilité au cache de réponses
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Taille maximale d'un corps cachable, en octets
    pub max_body_bytes: usize,
}

impl CachePolicy {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    /// Décide si une paire requête/réponse peut toucher le cache
    pub fn is_cacheable(
        &self,
        method: &Method,
        request_headers: &HeaderMap,
        status: u16,
        content_type: Option<&str>,
        cache_control: Option<&str>,
        body_len: usize,
    ) -> bool {
        if method != Method::GET {
            return false;
        }

        if BLOCKED_REQUEST_HEADERS
            .iter()
            .any(|name| request_headers.contains_key(*name))
        {
            return false;
        }

        if !(200..300).contains(&status) {
            return false;
        }

        if body_len > self.max_body_bytes {
            return false;
        }

        if !Self::is_text_or_json(content_type) {
            return false;
        }

        if let Some(cc) = cache_control {
            let cc = cc.to_ascii_lowercase();
            if cc.contains("no-store") || cc.contains("private") {
                return false;
            }
        }

        true
    }

    fn is_text_or_json(content_type: Option<&str>) -> bool {
        match content_type {
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.starts_with("text/") || ct.contains("json")
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn policy() -> CachePolicy {
        CachePolicy::new(200 * 1024)
    }

    fn cacheable_call(policy: &CachePolicy, headers: &HeaderMap) -> bool {
        policy.is_cacheable(&Method::GET, headers, 200, Some("application/json"), None, 100)
    }

    #[test]
    fn test_plain_get_json_is_cacheable() {
        assert!(cacheable_call(&policy(), &HeaderMap::new()));
    }

    #[test]
    fn test_non_get_is_rejected() {
        let p = policy();
        assert!(!p.is_cacheable(
            &Method::POST,
            &HeaderMap::new(),
            200,
            Some("application/json"),
            None,
            100
        ));
    }

    #[test]
    fn test_credential_headers_are_rejected() {
        for name in ["authorization", "cookie", "range"] {
            let mut headers = HeaderMap::new();
            headers.insert(name, HeaderValue::from_static("x"));
            assert!(!cacheable_call(&policy(), &headers), "{name} should block caching");
        }
    }

    #[test]
    fn test_non_2xx_is_rejected() {
        let p = policy();
        for status in [301, 404, 500] {
            assert!(!p.is_cacheable(
                &Method::GET,
                &HeaderMap::new(),
                status,
                Some("application/json"),
                None,
                100
            ));
        }
    }

    #[test]
    fn test_body_over_ceiling_is_rejected() {
        let p = CachePolicy::new(1000);
        assert!(p.is_cacheable(&Method::GET, &HeaderMap::new(), 200, Some("text/plain"), None, 1000));
        assert!(!p.is_cacheable(&Method::GET, &HeaderMap::new(), 200, Some("text/plain"), None, 1001));
    }

    #[test]
    fn test_binary_content_is_rejected() {
        let p = policy();
        for ct in [Some("audio/flac"), Some("application/octet-stream"), None] {
            assert!(!p.is_cacheable(&Method::GET, &HeaderMap::new(), 200, ct, None, 100));
        }
    }

    #[test]
    fn test_no_store_and_private_are_rejected() {
        let p = policy();
        for cc in ["no-store", "private", "public, NO-STORE"] {
            assert!(!p.is_cacheable(
                &Method::GET,
                &HeaderMap::new(),
                200,
                Some("application/json"),
                Some(cc),
                100
            ));
        }
        assert!(p.is_cacheable(
            &Method::GET,
            &HeaderMap::new(),
            200,
            Some("application/json"),
            Some("public, max-age=60"),
            100
        ));
    }
}
