//! # Surveillance de santé des mirrors du catalogue
//!
//! Le service upstream est exposé par plusieurs endpoints interchangeables,
//! individuellement peu fiables (rate limiting, pannes régionales). Ce crate
//! sonde périodiquement chaque mirror et maintient le sous-ensemble
//! actuellement sain, ordonné par priorité configurée.
//!
//! Une sonde est une requête synthétique légère : `GET /track/?id=<id
//! connu>&quality=LOW`. Un statut non-2xx, un timeout (4 s par défaut) ou
//! une erreur réseau marque le mirror indisponible pour ce tour. Le corps
//! de la réponse n'est jamais lu.

pub mod monitor;
pub mod target;

pub use monitor::{HealthMonitor, HealthSnapshot, ProbeStatus};
pub use target::ApiTarget;
