//! Stockage des réponses mises en cache
//!
//! Le stockage repose sur `moka` avec une expiration native par entrée
//! (chaque catégorie logique porte son propre TTL). L'âge d'une entrée est
//! en outre vérifié explicitement à la lecture : l'expiration du stockage
//! sous-jacent est une dépendance externe, on ne s'y fie pas seule.

use bytes::Bytes;
use moka::future::Cache as MokaCache;
use moka::Expiry;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Catégorie logique d'une requête cachable
///
/// Le cache ne couvre qu'un ensemble borné de catégories ; chacune porte
/// son propre TTL (les recherches vivent plus longtemps que les lookups
/// de piste isolée, dont les URLs upstream expirent vite).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Search,
    Track,
    Generic,
}

/// TTL par catégorie, fournis par la configuration
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub search: Duration,
    pub track: Duration,
    pub generic: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(300),
            track: Duration::from_secs(120),
            generic: Duration::from_secs(300),
        }
    }
}

impl CacheCategory {
    /// TTL applicable à cette catégorie
    pub fn ttl(&self, ttls: &CacheTtls) -> Duration {
        match self {
            CacheCategory::Search => ttls.search,
            CacheCategory::Track => ttls.track,
            CacheCategory::Generic => ttls.generic,
        }
    }

    /// Préfixe de namespace utilisé dans les clés de cache
    pub fn namespace(&self) -> &'static str {
        match self {
            CacheCategory::Search => "search",
            CacheCategory::Track => "track",
            CacheCategory::Generic => "generic",
        }
    }
}

/// Charge utile mise en cache, avec son horodatage et son TTL
#[derive(Debug, Clone)]
pub struct CachedPayload {
    pub body: Bytes,
    pub content_type: String,
    /// Secondes Unix au moment du stockage
    pub stored_at: u64,
    pub ttl: Duration,
}

impl CachedPayload {
    pub fn new(body: Bytes, content_type: impl Into<String>, ttl: Duration) -> Self {
        Self {
            body,
            content_type: content_type.into(),
            stored_at: unix_now(),
            ttl,
        }
    }

    /// Vérification explicite d'âge, indépendante de l'expiration native
    pub fn is_expired(&self) -> bool {
        unix_now() >= self.stored_at + self.ttl.as_secs()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Expiration native : chaque entrée expire après son propre TTL
struct PerEntryTtl;

impl Expiry<String, CachedPayload> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedPayload,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Cache de réponses clé/valeur, accès concurrent par clé sans verrou global
///
/// En mode désactivé (stockage absent), toutes les lectures sont des miss
/// et les écritures sont ignorées, sans erreur.
pub struct CacheStore {
    inner: Option<MokaCache<String, CachedPayload>>,
}

impl CacheStore {
    /// Crée un cache pouvant contenir `max_entries` réponses
    pub fn new(max_entries: u64) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner: Some(inner) }
    }

    /// Cache désactivé : toujours miss, jamais d'erreur
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Lit une entrée ; une entrée expirée est invalidée et traitée en miss
    pub async fn get(&self, key: &str) -> Option<CachedPayload> {
        let inner = self.inner.as_ref()?;
        let payload = inner.get(key).await?;

        if payload.is_expired() {
            debug!(key, "Cache entry expired on read, invalidating");
            inner.invalidate(key).await;
            return None;
        }

        Some(payload)
    }

    /// Stocke une entrée (no-op si le cache est désactivé)
    pub async fn put(&self, key: &str, payload: CachedPayload) {
        if let Some(inner) = &self.inner {
            inner.insert(key.to_string(), payload).await;
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Some(inner) = &self.inner {
            inner.invalidate(key).await;
        }
    }

    /// Nombre d'entrées actuellement stockées
    pub async fn entry_count(&self) -> u64 {
        match &self.inner {
            Some(inner) => {
                inner.run_pending_tasks().await;
                inner.entry_count()
            }
            None => 0,
        }
    }
}
