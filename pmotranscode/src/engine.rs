//! Moteur de transcodage : injection des métadonnées dans le fichier livré
//!
//! Le travail est synchrone et borné par les entrées/sorties disque :
//! l'orchestrateur l'exécute via `spawn_blocking` pour ne pas bloquer le
//! runtime.

use crate::error::EngineError;
use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Métadonnées à écrire dans le fichier téléchargé
#[derive(Debug, Clone, Default)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<u32>,
    /// Pochette (JPEG) déjà téléchargée, le cas échéant
    pub cover: Option<Vec<u8>>,
}

/// Moteur de transcodage chargé
///
/// L'instance n'existe qu'après le chargement de l'asset par
/// [`EngineLoader`](crate::loader::EngineLoader) : en détenir une prouve
/// que le moteur est prêt.
pub struct TranscodeEngine {
    asset_dir: PathBuf,
}

impl TranscodeEngine {
    pub fn new(asset_dir: PathBuf) -> Self {
        Self { asset_dir }
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    /// Écrit les tags et la pochette dans le fichier, en place
    ///
    /// Le format de tag natif du conteneur est utilisé (ID3v2 pour MP3,
    /// Vorbis Comments pour FLAC, etc.). Les champs absents de `tags` ne
    /// sont pas écrits.
    pub fn process(&self, path: &Path, tags: &TrackTags) -> Result<(), EngineError> {
        let tagged_file = Probe::open(path)?.read()?;
        let tag_type = tagged_file.primary_tag_type();
        let mut tag = Tag::new(tag_type);

        if let Some(title) = &tags.title {
            tag.set_title(title.clone());
        }
        if let Some(artist) = &tags.artist {
            tag.set_artist(artist.clone());
        }
        if let Some(album) = &tags.album {
            tag.set_album(album.clone());
        }
        if let Some(track_number) = tags.track_number {
            tag.set_track(track_number);
        }
        if let Some(disc_number) = tags.disc_number {
            tag.set_disk(disc_number);
        }
        if let Some(year) = tags.year {
            tag.set_year(year);
        }
        if let Some(cover) = &tags.cover {
            tag.push_picture(Picture::new_unchecked(
                PictureType::CoverFront,
                Some(MimeType::Jpeg),
                None,
                cover.clone(),
            ));
        }

        tag.save_to_path(path, WriteOptions::default())?;
        debug!(path = %path.display(), tag_type = ?tag_type, "Tags written");
        Ok(())
    }
}
