//! Manifest-backed stand-in for the collection cache collaborator.
//!
//! The real system refreshes its item listing from a remote catalog; the
//! CLI consumes a JSON manifest of already-resolved items instead, with
//! the file's mtime acting as the cache refresh time.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use favgrab_engine::{CollectionCache, DownloadError, ItemDescriptor};

use crate::error::AppError;

pub struct ManifestCache {
    path: PathBuf,
    items: Vec<ItemDescriptor>,
    refreshed: Option<SystemTime>,
}

impl ManifestCache {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::Manifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let items: Vec<ItemDescriptor> =
            serde_json::from_str(&raw).map_err(|e| AppError::Manifest {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let refreshed = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        Ok(Self {
            path: path.to_path_buf(),
            items,
            refreshed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CollectionCache for ManifestCache {
    fn entries(&self) -> Result<Vec<ItemDescriptor>, DownloadError> {
        Ok(self.items.clone())
    }

    fn last_refreshed(&self) -> Option<SystemTime> {
        self.refreshed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn loads_items_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"[{
                "item_id": "BV1",
                "title": "first",
                "streams": [
                    {"item_id": "BV1", "kind": "combined", "url": "http://cdn/c"}
                ]
            }]"#,
        )
        .unwrap();

        let cache = ManifestCache::load(&path).unwrap();
        let items = cache.entries().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "first");
        // Freshly written file is not stale.
        assert!(!cache.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn bad_json_is_a_manifest_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ManifestCache::load(&path),
            Err(AppError::Manifest { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_manifest_error() {
        assert!(matches!(
            ManifestCache::load(Path::new("/no/such/manifest.json")),
            Err(AppError::Manifest { .. })
        ));
    }
}
