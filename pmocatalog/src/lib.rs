//! # Client du catalogue musical
//!
//! Interface étroite vers le service upstream : récupérer une piste, un
//! album ou une playlist par id, et ouvrir le flux de téléchargement d'une
//! piste pour une qualité donnée.
//!
//! Le client s'appuie sur le moniteur de santé (`pmohealth`) : les mirrors
//! sains sont essayés dans l'ordre de priorité, avec bascule automatique
//! sur le suivant en cas d'échec.

pub mod client;
pub mod error;
pub mod models;

pub use client::CatalogClient;
pub use error::{CatalogError, Result};
pub use models::{Quality, Track};
