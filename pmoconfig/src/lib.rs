//! # Module de configuration de PMOBridge
//!
//! Ce module gère la configuration du pont d'accès au catalogue :
//! - Chargement depuis un fichier YAML externe
//! - Fusion avec la configuration par défaut embarquée
//! - Surcharge par variables d'environnement
//! - Getters typés avec valeurs par défaut
//! - Singleton thread-safe accessible dans tout le processus
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let hosts = config.get_allowed_hosts();
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::{env, fs, path::Path, sync::Mutex};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmobridge.yaml");

lazy_static! {
    static ref CONFIG: std::sync::Arc<Config> = std::sync::Arc::new(
        Config::load_config("").expect("Failed to load PMOBridge configuration")
    );
}

const ENV_CONFIG_DIR: &str = "PMOBRIDGE_CONFIG";
const ENV_PREFIX: &str = "PMOBRIDGE_CONFIG__";

// Valeurs par défaut quand le YAML est incomplet
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_USER_AGENT: &str = "PMOBridge/0.1";
const DEFAULT_CACHE_MAX_ENTRIES: u64 = 5000;
const DEFAULT_CACHE_MAX_BODY_BYTES: usize = 200 * 1024;
const DEFAULT_TTL_SEARCH_SECS: u64 = 300;
const DEFAULT_TTL_TRACK_SECS: u64 = 120;
const DEFAULT_TTL_GENERIC_SECS: u64 = 300;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 4;
const DEFAULT_RECHECK_INTERVAL_SECS: u64 = 300;
const DEFAULT_COUNTDOWN_SECS: u64 = 5;

/// Accès au singleton de configuration du processus
pub fn get_config() -> std::sync::Arc<Config> {
    CONFIG.clone()
}

/// Mirror du catalogue tel que déclaré dans la configuration
///
/// Le tri par `priority` croissante détermine l'ordre de préférence.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TargetEntry {
    pub id: String,
    pub base_url: String,
    pub priority: u32,
}

/// Macro générant un getter u64 avec valeur par défaut
macro_rules! impl_u64_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap_or($default),
                Ok(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap_or($default as i64) as u64,
                _ => $default,
            }
        }
    };
}

/// Macro générant un getter bool avec valeur par défaut
macro_rules! impl_bool_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }
    };
}

/// Gestionnaire de configuration de PMOBridge
///
/// La configuration est un arbre YAML : les valeurs par défaut embarquées
/// sont fusionnées avec le fichier utilisateur puis surchargées par les
/// variables d'environnement `PMOBRIDGE_CONFIG__...`.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Config {
    /// Cherche le répertoire de configuration en essayant plusieurs emplacements
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(".pmobridge").exists() {
            return ".pmobridge".to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(".pmobridge");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".pmobridge".to_string()
    }

    /// Valide et prépare le répertoire de configuration
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(anyhow!("Config path is not a directory"));
        }
        Ok(())
    }

    /// Charge la configuration depuis le répertoire indiqué
    ///
    /// 1. Détermine le répertoire de configuration
    /// 2. Charge la configuration par défaut embarquée
    /// 3. Fusionne avec le fichier `config.yaml` externe si présent
    /// 4. Applique les surcharges des variables d'environnement
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&config_dir))?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            let external_value: Value = serde_yaml::from_slice(&data)?;
            merge_yaml(&mut default_value, &external_value);
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
        }

        let mut config_value = Self::lower_keys_value(default_value);
        Self::apply_env_overrides(&mut config_value);

        Ok(Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        })
    }

    /// Récupère une valeur de configuration au chemin indiqué
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();
                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Modifie une valeur de configuration (en mémoire uniquement)
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key, value);
            } else {
                let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                let key_path = key
                    .trim_start_matches(ENV_PREFIX)
                    .split("__")
                    .collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        new_map.insert(Value::String(s.to_lowercase()), Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Résout un chemin relatif au répertoire de configuration et le crée
    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let path = Path::new(dir_path);
        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created managed directory");
        }

        Ok(absolute_path.to_string_lossy().to_string())
    }

    /// Récupère un répertoire géré par la configuration (créé si absent)
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => default.to_string(),
        };
        self.resolve_and_create_dir(&dir_path)
    }

    fn get_string(&self, path: &[&str]) -> Option<String> {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    // ============ Serveur ============

    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => n.as_u64().map(|p| p as u16).unwrap_or(DEFAULT_HTTP_PORT),
            _ => DEFAULT_HTTP_PORT,
        }
    }

    pub fn get_base_url(&self) -> String {
        self.get_string(&["host", "base_url"])
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.get_http_port()))
    }

    // ============ Proxy ============

    pub fn get_user_agent(&self) -> String {
        self.get_string(&["proxy", "user_agent"])
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Liste blanche des hôtes autorisés pour `/proxy`
    pub fn get_allowed_hosts(&self) -> Vec<String> {
        match self.get_value(&["proxy", "allowed_hosts"]) {
            Ok(Value::Sequence(seq)) => seq
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    // ============ Route /links ============

    pub fn get_links_upstream(&self) -> Option<String> {
        self.get_string(&["links", "upstream"])
    }

    pub fn get_links_backup_upstream(&self) -> Option<String> {
        self.get_string(&["links", "backup_upstream"])
    }

    // ============ Cache ============

    impl_bool_config!(get_cache_enabled, &["cache", "enabled"], true);
    impl_u64_config!(
        get_cache_max_entries,
        &["cache", "max_entries"],
        DEFAULT_CACHE_MAX_ENTRIES
    );
    impl_u64_config!(
        get_ttl_search_secs,
        &["cache", "ttl_search_secs"],
        DEFAULT_TTL_SEARCH_SECS
    );
    impl_u64_config!(
        get_ttl_track_secs,
        &["cache", "ttl_track_secs"],
        DEFAULT_TTL_TRACK_SECS
    );
    impl_u64_config!(
        get_ttl_generic_secs,
        &["cache", "ttl_generic_secs"],
        DEFAULT_TTL_GENERIC_SECS
    );

    pub fn get_cache_max_body_bytes(&self) -> usize {
        match self.get_value(&["cache", "max_body_bytes"]) {
            Ok(Value::Number(n)) if n.is_u64() => {
                n.as_u64().map(|v| v as usize).unwrap_or(DEFAULT_CACHE_MAX_BODY_BYTES)
            }
            _ => DEFAULT_CACHE_MAX_BODY_BYTES,
        }
    }

    // ============ Sonde de santé ============

    /// Id de piste connu utilisé par la sonde (`/track/?id=...&quality=LOW`)
    pub fn get_probe_track_id(&self) -> String {
        self.get_string(&["health", "probe_track_id"])
            .unwrap_or_else(|| "1".to_string())
    }

    impl_u64_config!(
        get_probe_timeout_secs,
        &["health", "probe_timeout_secs"],
        DEFAULT_PROBE_TIMEOUT_SECS
    );
    impl_u64_config!(
        get_recheck_interval_secs,
        &["health", "recheck_interval_secs"],
        DEFAULT_RECHECK_INTERVAL_SECS
    );

    /// Mirrors du catalogue, triés par priorité croissante
    pub fn get_api_targets(&self) -> Vec<TargetEntry> {
        let mut targets: Vec<TargetEntry> = match self.get_value(&["health", "targets"]) {
            Ok(value) => serde_yaml::from_value(value).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        targets.sort_by_key(|t| t.priority);
        targets
    }

    // ============ Téléchargements ============

    pub fn get_download_dir(&self) -> Result<String> {
        self.get_managed_dir(&["download", "directory"], "downloads")
    }

    // ============ Transcodage ============

    impl_bool_config!(get_transcode_enabled, &["transcode", "enabled"], true);
    impl_u64_config!(
        get_countdown_secs,
        &["transcode", "countdown_secs"],
        DEFAULT_COUNTDOWN_SECS
    );

    pub fn get_engine_url(&self) -> Option<String> {
        self.get_string(&["transcode", "engine_url"])
    }

    pub fn get_engine_dir(&self) -> Result<String> {
        self.get_managed_dir(&["transcode", "engine_directory"], "engine")
    }
}

/// Fusionne récursivement `other` dans `base` (les valeurs de `other` priment)
fn merge_yaml(base: &mut Value, other: &Value) {
    match (base, other) {
        (Value::Mapping(base_map), Value::Mapping(other_map)) => {
            for (key, other_value) in other_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_yaml(base_value, other_value),
                    None => {
                        base_map.insert(key.clone(), other_value.clone());
                    }
                }
            }
        }
        (base, other) => *base = other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from_dir(dir: &Path) -> Config {
        Config::load_config(dir.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults_without_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_from_dir(dir.path());

        assert_eq!(config.get_http_port(), 8080);
        assert_eq!(config.get_ttl_track_secs(), 120);
        assert_eq!(config.get_cache_max_body_bytes(), 204800);
        assert!(config.get_cache_enabled());
        assert!(!config.get_allowed_hosts().is_empty());
    }

    #[test]
    fn test_user_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "host:\n  http_port: 9999\ncache:\n  ttl_track_secs: 60\n",
        )
        .unwrap();

        let config = config_from_dir(dir.path());
        assert_eq!(config.get_http_port(), 9999);
        assert_eq!(config.get_ttl_track_secs(), 60);
        // Les valeurs non surchargées restent celles des défauts
        assert_eq!(config.get_ttl_search_secs(), 300);
    }

    #[test]
    fn test_targets_sorted_by_priority() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            concat!(
                "health:\n  targets:\n",
                "    - id: b\n      base_url: \"https://b.example\"\n      priority: 2\n",
                "    - id: a\n      base_url: \"https://a.example\"\n      priority: 1\n",
            ),
        )
        .unwrap();

        let config = config_from_dir(dir.path());
        let targets = config.get_api_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id, "a");
        assert_eq!(targets[1].id, "b");
    }

    #[test]
    fn test_set_value_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_from_dir(dir.path());

        config
            .set_value(&["cache", "ttl_track_secs"], Value::Number(42.into()))
            .unwrap();
        assert_eq!(config.get_ttl_track_secs(), 42);
    }
}
