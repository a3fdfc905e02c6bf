//! État partagé du routeur de la passerelle

use pmohealth::HealthMonitor;
use pmorescache::{CachePolicy, CacheStore, CacheTtls};
use std::sync::Arc;
use std::time::Duration;

/// État injecté dans chaque handler axum
#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub cache: Arc<CacheStore>,
    pub policy: CachePolicy,
    pub ttls: CacheTtls,
    pub monitor: Arc<HealthMonitor>,
    /// Hôtes que le proxy accepte de relayer
    pub allowed_hosts: Arc<Vec<String>>,
    pub user_agent: String,
    /// Upstream primaire du lookup de liens (None : lookup désactivé)
    pub links_upstream: Option<String>,
    /// Upstream de secours, tenté après un échec du primaire
    pub links_backup: Option<String>,
}

impl AppState {
    /// Assemble l'état depuis la configuration du processus
    pub fn from_config(config: &pmoconfig::Config, monitor: Arc<HealthMonitor>) -> Self {
        let cache = if config.get_cache_enabled() {
            Arc::new(CacheStore::new(config.get_cache_max_entries()))
        } else {
            Arc::new(CacheStore::disabled())
        };

        Self {
            client: reqwest::Client::new(),
            cache,
            policy: CachePolicy::new(config.get_cache_max_body_bytes()),
            ttls: CacheTtls {
                search: Duration::from_secs(config.get_ttl_search_secs()),
                track: Duration::from_secs(config.get_ttl_track_secs()),
                generic: Duration::from_secs(config.get_ttl_generic_secs()),
            },
            monitor,
            allowed_hosts: Arc::new(config.get_allowed_hosts()),
            user_agent: config.get_user_agent(),
            links_upstream: config.get_links_upstream(),
            links_backup: config.get_links_backup_upstream(),
        }
    }

    /// Vrai si `host` figure dans la liste blanche du proxy
    pub fn is_host_allowed(&self, host: &str) -> bool {
        self.allowed_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(host))
    }
}
