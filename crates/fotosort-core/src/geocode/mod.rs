pub mod nominatim;

pub use nominatim::NominatimGeocoder;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};

/// Address components (`suburb`, `village`, `town`, `state`, ...) to names.
pub type Address = BTreeMap<String, String>;

/// Failure of a single reverse-geocoding lookup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeocodeError {
    /// The service rejected the coordinates; no address exists for them.
    #[error("invalid coordinates: {0}")]
    InvalidInput(String),
    /// The service could not be reached or refused to answer.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Reverse geocoding backend.
pub trait ReverseGeocoder {
    fn reverse(&self, latitude: f64, longitude: f64) -> std::result::Result<Address, GeocodeError>;
}

/// When the address cache is written to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePersistence {
    /// Rewrite the cache file after every new entry.
    #[default]
    WriteThrough,
    /// Only write on [`AddressResolver::flush`].
    Batched,
}

/// Cache key: both coordinates rounded to 3 decimals.
pub fn cache_key(latitude: f64, longitude: f64) -> String {
    format!("{:.3},{:.3}", latitude, longitude)
}

/// Reverse geocoder with a persistent on-disk cache.
///
/// Entries are never evicted. Lookups that fail because the coordinates are
/// invalid are not cached.
pub struct AddressResolver<G> {
    geocoder: G,
    cache: BTreeMap<String, Address>,
    cache_path: PathBuf,
    persistence: CachePersistence,
    dirty: bool,
}

impl<G: ReverseGeocoder> AddressResolver<G> {
    /// Create a resolver, loading `cache_path` if it exists.
    pub fn open(
        cache_path: impl Into<PathBuf>,
        geocoder: G,
        persistence: CachePersistence,
    ) -> Result<Self> {
        let cache_path = cache_path.into();
        let cache = if cache_path.exists() {
            log::info!("Load {} ...", cache_path.display());
            load_cache(&cache_path)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            geocoder,
            cache,
            cache_path,
            persistence,
            dirty: false,
        })
    }

    /// Look up the address of a coordinate.
    ///
    /// Returns `Ok(None)` when the geocoder rejects the coordinates and
    /// [`Error::GeocoderUnavailable`] when it cannot be reached.
    pub fn address(&mut self, latitude: f64, longitude: f64) -> Result<Option<Address>> {
        let key = cache_key(latitude, longitude);
        if let Some(address) = self.cache.get(&key) {
            log::debug!("location {} from cache", key);
            return Ok(Some(address.clone()));
        }

        match self.geocoder.reverse(latitude, longitude) {
            Ok(address) => {
                self.cache.insert(key, address.clone());
                self.dirty = true;
                if self.persistence == CachePersistence::WriteThrough {
                    self.flush()?;
                }
                Ok(Some(address))
            }
            Err(GeocodeError::InvalidInput(reason)) => {
                log::warn!("No address for {}: {}", key, reason);
                Ok(None)
            }
            Err(GeocodeError::Unavailable(reason)) => Err(Error::GeocoderUnavailable(reason)),
        }
    }

    /// Write the cache to disk if it changed since the last write.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        save_cache(&self.cache_path, &self.cache)?;
        self.dirty = false;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }
}

fn cache_error(path: &Path, reason: impl ToString) -> Error {
    Error::Cache {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn load_cache(path: &Path) -> Result<BTreeMap<String, Address>> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    bincode::deserialize(&bytes).map_err(|e| cache_error(path, e))
}

fn save_cache(path: &Path, cache: &BTreeMap<String, Address>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let encoded = bincode::serialize(cache).map_err(|e| cache_error(path, e))?;

    // Write to temp file first, then rename
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;
    file.write_all(&encoded)
        .and_then(|_| file.sync_all())
        .map_err(|e| Error::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::tempdir;

    struct FakeGeocoder {
        calls: Cell<usize>,
        response: std::result::Result<Address, GeocodeError>,
    }

    impl FakeGeocoder {
        fn answering(response: std::result::Result<Address, GeocodeError>) -> Self {
            Self {
                calls: Cell::new(0),
                response,
            }
        }
    }

    impl ReverseGeocoder for FakeGeocoder {
        fn reverse(&self, _: f64, _: f64) -> std::result::Result<Address, GeocodeError> {
            self.calls.set(self.calls.get() + 1);
            self.response.clone()
        }
    }

    fn paris() -> Address {
        [("suburb", "Quartier Notre-Dame"), ("state", "Île-de-France")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cache_key_rounding() {
        assert_eq!(cache_key(48.8566, 2.3522), "48.857,2.352");
        assert_eq!(cache_key(-33.86881, 151.20929), "-33.869,151.209");
    }

    #[test]
    fn test_second_lookup_is_a_cache_hit() {
        let dir = tempdir().unwrap();
        let mut resolver = AddressResolver::open(
            dir.path().join("cache.bin"),
            FakeGeocoder::answering(Ok(paris())),
            CachePersistence::WriteThrough,
        )
        .unwrap();

        let first = resolver.address(48.8566, 2.3522).unwrap();
        let second = resolver.address(48.8566, 2.3522).unwrap();
        assert_eq!(resolver.geocoder().calls.get(), 1);
        assert_eq!(first, second);
        assert_eq!(first, Some(paris()));
    }

    #[test]
    fn test_nearby_coordinates_share_an_entry() {
        let dir = tempdir().unwrap();
        let mut resolver = AddressResolver::open(
            dir.path().join("cache.bin"),
            FakeGeocoder::answering(Ok(paris())),
            CachePersistence::Batched,
        )
        .unwrap();

        resolver.address(48.85661, 2.35221).unwrap();
        resolver.address(48.85659, 2.35219).unwrap();
        assert_eq!(resolver.geocoder().calls.get(), 1);
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_write_through_persists_each_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        {
            let mut resolver = AddressResolver::open(
                &path,
                FakeGeocoder::answering(Ok(paris())),
                CachePersistence::WriteThrough,
            )
            .unwrap();
            resolver.address(48.8566, 2.3522).unwrap();
        }

        let mut reopened = AddressResolver::open(
            &path,
            FakeGeocoder::answering(Err(GeocodeError::Unavailable("offline".into()))),
            CachePersistence::WriteThrough,
        )
        .unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.address(48.8566, 2.3522).unwrap(), Some(paris()));
        assert_eq!(reopened.geocoder().calls.get(), 0);
    }

    #[test]
    fn test_batched_writes_only_on_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        let mut resolver = AddressResolver::open(
            &path,
            FakeGeocoder::answering(Ok(paris())),
            CachePersistence::Batched,
        )
        .unwrap();

        resolver.address(48.8566, 2.3522).unwrap();
        assert!(!path.exists());
        resolver.flush().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_invalid_input_is_no_address() {
        let dir = tempdir().unwrap();
        let mut resolver = AddressResolver::open(
            dir.path().join("cache.bin"),
            FakeGeocoder::answering(Err(GeocodeError::InvalidInput("ocean".into()))),
            CachePersistence::WriteThrough,
        )
        .unwrap();

        assert_eq!(resolver.address(0.0, -30.0).unwrap(), None);
        assert!(resolver.is_empty());
        assert!(!resolver.cache_path().exists());
    }

    #[test]
    fn test_unavailable_is_fatal() {
        let dir = tempdir().unwrap();
        let mut resolver = AddressResolver::open(
            dir.path().join("cache.bin"),
            FakeGeocoder::answering(Err(GeocodeError::Unavailable("HTTP 429".into()))),
            CachePersistence::WriteThrough,
        )
        .unwrap();

        let err = resolver.address(48.8566, 2.3522).unwrap_err();
        assert!(matches!(err, Error::GeocoderUnavailable(_)));
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        fs::write(&path, b"\xff\xff\xff\xff\xff\xff\xff\xff\xff").unwrap();

        let result = AddressResolver::open(
            &path,
            FakeGeocoder::answering(Ok(paris())),
            CachePersistence::WriteThrough,
        );
        assert!(matches!(result, Err(Error::Cache { .. })));
    }
}
