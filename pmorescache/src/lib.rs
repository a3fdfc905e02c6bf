//! # Cache de réponses pour PMOBridge
//!
//! Ce crate fournit le cache read-through utilisé par la passerelle :
//! - `key` : dérivation déterministe des clés (SHA-256 des paramètres normalisés)
//! - `policy` : prédicat d'éligibilité (jamais de données privées en cache)
//! - `store` : stockage en mémoire avec TTL par catégorie
//!
//! Le cache ne stocke que des réponses GET sûres ; le même prédicat est
//! appliqué en lecture et en écriture.

pub mod key;
pub mod policy;
pub mod store;

pub use key::cache_key;
pub use policy::CachePolicy;
pub use store::{CacheCategory, CacheStore, CacheTtls, CachedPayload};
