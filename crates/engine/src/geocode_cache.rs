use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A resolved city coordinate pair.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

/// JSON-file-backed city-name -> {lat,lon}? cache (C5). `None` means
/// "confirmed unresolvable" and is cached too, so an unresolvable city is
/// never re-queried against the place provider within or across runs.
///
/// The in-memory map is authoritative for the duration of a run; `save`
/// flushes it back to disk.
pub struct GeocodeCache {
    path: std::path::PathBuf,
    entries: Mutex<HashMap<String, Option<LatLon>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum GeocodeCacheError {
    #[error("geocode cache io error: {0}")]
    Io(String),
    #[error("geocode cache serialization error: {0}")]
    Serialization(String),
}

impl From<GeocodeCacheError> for poi_pipeline_common::PipelineError {
    fn from(e: GeocodeCacheError) -> Self {
        poi_pipeline_common::PipelineError::Geocode(e.to_string())
    }
}

impl GeocodeCache {
    /// Loads the cache from `path` if it exists; starts empty otherwise.
    pub fn load(path: impl Into<std::path::PathBuf>) -> Result<Self, GeocodeCacheError> {
        let path = path.into();

        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| GeocodeCacheError::Io(e.to_string()))?;
            serde_json::from_str(&raw).map_err(|e| GeocodeCacheError::Serialization(e.to_string()))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn get(&self, city: &str) -> Option<Option<LatLon>> {
        self.entries.lock().unwrap().get(city).copied()
    }

    pub fn put(&self, city: &str, value: Option<LatLon>) {
        self.entries.lock().unwrap().insert(city.to_string(), value);
    }

    pub fn save(&self) -> Result<(), GeocodeCacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GeocodeCacheError::Io(e.to_string()))?;
        }

        let entries = self.entries.lock().unwrap();
        let raw = serde_json::to_string_pretty(&*entries)
            .map_err(|e| GeocodeCacheError::Serialization(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| GeocodeCacheError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_starts_empty() {
        let cache = GeocodeCache::load("/tmp/poi-pipeline-test-geocode-missing.json").unwrap();
        assert!(cache.get("Paris").is_none());
    }

    #[test]
    fn put_then_get_roundtrips_and_caches_null() {
        let path = format!("/tmp/poi-pipeline-test-geocode-{}.json", std::process::id());
        let cache = GeocodeCache::load(&path).unwrap();

        cache.put("Paris", Some(LatLon { latitude: 48.8566, longitude: 2.3522 }));
        cache.put("Atlantis", None);

        assert_eq!(
            cache.get("Paris"),
            Some(Some(LatLon { latitude: 48.8566, longitude: 2.3522 }))
        );
        assert_eq!(cache.get("Atlantis"), Some(None));

        cache.save().unwrap();
        let reloaded = GeocodeCache::load(&path).unwrap();
        assert_eq!(reloaded.get("Atlantis"), Some(None));

        let _ = std::fs::remove_file(&path);
    }
}
