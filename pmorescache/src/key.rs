//! Dérivation des clés de cache
//!
//! Une clé est le SHA-256 hexadécimal de l'ensemble des paramètres de la
//! requête, normalisés par tri sur le nom. Deux requêtes aux paramètres
//! identiques produisent la même clé ; tout changement de paramètre change
//! la clé.

use sha2::{Digest, Sha256};

/// Calcule la clé de cache `namespace:hash` pour un jeu de paramètres
///
/// Les paramètres sont triés par nom (puis par valeur pour les doublons)
/// avant hachage, si bien que l'ordre d'arrivée n'influence pas la clé.
pub fn cache_key(namespace: &str, params: &[(&str, &str)]) -> String {
    let mut normalized: Vec<(&str, &str)> = params.to_vec();
    normalized.sort();

    let mut hasher = Sha256::new();
    for (i, (name, value)) in normalized.iter().enumerate() {
        if i > 0 {
            hasher.update(b"&");
        }
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }

    format!("{}:{}", namespace, hex::encode(hasher.finalize()))
}
