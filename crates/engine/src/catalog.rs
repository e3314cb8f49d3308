//! Boundary traits for the external catalog collaborators.
//!
//! The catalog API client and the persisted collection cache live
//! outside this crate; the scheduler consumes them only through these
//! seams.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error::DownloadError;
use crate::model::{ItemDescriptor, StreamDescriptor};

/// Resolves an item into its retrievable stream descriptors.
///
/// Items arriving from a manifest may already carry resolved streams;
/// implementations are free to return those as-is.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve(&self, item: &ItemDescriptor) -> Result<Vec<StreamDescriptor>, DownloadError>;
}

/// Read-side view of the collection cache: the items to process and how
/// fresh the cached listing is. Storage is the collaborator's problem.
pub trait CollectionCache: Send + Sync {
    fn entries(&self) -> Result<Vec<ItemDescriptor>, DownloadError>;

    /// When the cached listing was last refreshed, if known.
    fn last_refreshed(&self) -> Option<SystemTime>;

    /// A listing older than this is worth refreshing before a run.
    fn is_stale(&self, max_age: Duration) -> bool {
        match self.last_refreshed() {
            Some(at) => at.elapsed().map(|age| age > max_age).unwrap_or(true),
            None => true,
        }
    }
}

/// Resolver for descriptors that are already materialized, e.g. read
/// from a manifest file.
#[derive(Debug, Default)]
pub struct PreresolvedStreams;

#[async_trait]
impl StreamResolver for PreresolvedStreams {
    async fn resolve(&self, item: &ItemDescriptor) -> Result<Vec<StreamDescriptor>, DownloadError> {
        if item.streams.is_empty() {
            return Err(DownloadError::invalid_manifest(format!(
                "item `{}` has no streams",
                item.item_id
            )));
        }
        Ok(item.streams.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackKind;

    struct FixedCache {
        refreshed: Option<SystemTime>,
    }

    impl CollectionCache for FixedCache {
        fn entries(&self) -> Result<Vec<ItemDescriptor>, DownloadError> {
            Ok(Vec::new())
        }

        fn last_refreshed(&self) -> Option<SystemTime> {
            self.refreshed
        }
    }

    #[test]
    fn unknown_refresh_time_is_stale() {
        let cache = FixedCache { refreshed: None };
        assert!(cache.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn recent_refresh_is_fresh() {
        let cache = FixedCache {
            refreshed: Some(SystemTime::now()),
        };
        assert!(!cache.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn old_refresh_is_stale() {
        let cache = FixedCache {
            refreshed: Some(SystemTime::now() - Duration::from_secs(3600)),
        };
        assert!(cache.is_stale(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn preresolved_rejects_streamless_items() {
        let item = ItemDescriptor {
            item_id: "x".into(),
            title: "t".into(),
            streams: Vec::new(),
        };
        let result = PreresolvedStreams.resolve(&item).await;
        assert!(matches!(
            result,
            Err(DownloadError::InvalidManifest { .. })
        ));
    }

    #[tokio::test]
    async fn preresolved_passes_streams_through() {
        let item = ItemDescriptor {
            item_id: "x".into(),
            title: "t".into(),
            streams: vec![StreamDescriptor {
                item_id: "x".into(),
                kind: TrackKind::Combined,
                url: "http://cdn/c".into(),
                expected_size: None,
                container: "mp4".into(),
            }],
        };
        let streams = PreresolvedStreams.resolve(&item).await.unwrap();
        assert_eq!(streams.len(), 1);
    }
}
