use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::date;
use crate::geocode::{AddressResolver, ReverseGeocoder};
use crate::location;
use crate::metadata::MetadataSource;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const MOVIE_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];

/// Media kind, decided once from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Movie,
    Unknown,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return MediaKind::Unknown;
        };
        let ext = ext.to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Image
        } else if MOVIE_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Movie
        } else {
            MediaKind::Unknown
        }
    }
}

/// One file going through the pipeline.
#[derive(Debug, Clone)]
pub struct MediaRecord {
    /// Source path
    pub path: PathBuf,
    pub kind: MediaKind,
    /// File name without extension
    pub stem: String,
    /// File name including extension
    pub file_name: String,
    /// File size in bytes
    pub size: u64,
    /// Metadata returned by the extractor, `{}` until resolved or on failure
    pub raw_metadata: Value,
    pub date: Option<NaiveDateTime>,
    pub location: Option<String>,
}

impl MediaRecord {
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let size = fs::metadata(path)?.len();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            kind: MediaKind::from_path(path),
            stem,
            file_name,
            size,
            raw_metadata: Value::Object(Default::default()),
            date: None,
            location: None,
        })
    }

    pub fn is_supported(&self) -> bool {
        self.kind != MediaKind::Unknown
    }

    /// Extract metadata and resolve date and location.
    ///
    /// Unknown records are left untouched. Only a fatal geocoder failure is
    /// returned as an error.
    pub fn resolve<M, G>(
        &mut self,
        source: &M,
        resolver: &mut AddressResolver<G>,
    ) -> crate::Result<()>
    where
        M: MetadataSource + ?Sized,
        G: ReverseGeocoder,
    {
        if !self.is_supported() {
            return Ok(());
        }

        log::info!("Loading {}", self.path.display());
        self.raw_metadata = source.extract(&self.path, self.kind);
        self.location =
            location::resolve_location(&self.path, &self.raw_metadata, self.kind, resolver)?;
        self.date = date::resolve_date(&self.path, &self.stem, &self.raw_metadata, self.kind);
        Ok(())
    }
}
