//! Data model shared across the transfer, scheduling and merge stages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which track of an item a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    /// A single stream already containing both video and audio; no merge
    /// step is required.
    Combined,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
            TrackKind::Combined => "combined",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pointer to one retrievable media track, produced by the catalog
/// resolver. Immutable once resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub item_id: String,
    pub kind: TrackKind,
    pub url: String,
    /// Total size in bytes when the resolver knows it; used for resume
    /// accounting and post-download verification.
    #[serde(default)]
    pub expected_size: Option<u64>,
    /// Container extension for the final file, e.g. `mp4`.
    #[serde(default = "default_container")]
    pub container: String,
}

fn default_container() -> String {
    "mp4".to_string()
}

/// One item of a collection: a title plus the streams that constitute it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub item_id: String,
    pub title: String,
    pub streams: Vec<StreamDescriptor>,
}

impl ItemDescriptor {
    pub fn stream(&self, kind: TrackKind) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.kind == kind)
    }

    /// An item needs the merge stage when it is delivered as a separate
    /// video + audio track pair.
    pub fn needs_merge(&self) -> bool {
        self.stream(TrackKind::Video).is_some() && self.stream(TrackKind::Audio).is_some()
    }
}

/// Lifecycle of a single transfer. Owned exclusively by its transfer
/// unit; nothing else mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    InProgress,
    /// Stopped early but the temp file is valid for a future resume.
    Resumable,
    Complete,
    Failed,
}

#[derive(Debug)]
pub struct TransferState {
    pub descriptor: StreamDescriptor,
    pub temp_path: PathBuf,
    pub bytes_written: u64,
    pub status: TransferStatus,
}

impl TransferState {
    pub fn new(descriptor: StreamDescriptor, temp_path: PathBuf) -> Self {
        Self {
            descriptor,
            temp_path,
            bytes_written: 0,
            status: TransferStatus::Pending,
        }
    }
}

/// A completed video+audio pair waiting for the background mux worker.
#[derive(Debug, Clone)]
pub struct MergeJob {
    pub item_id: String,
    pub title: String,
    pub video_temp: PathBuf,
    pub audio_temp: Option<PathBuf>,
    pub final_path: PathBuf,
    pub attempt: u32,
}

/// Terminal per-item outcome. Every scheduled item yields exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Downloaded,
    Skipped,
    /// Muxing failed past its retry bound; the video-only track was
    /// promoted to the final path instead.
    PartialNoAudio,
    Failed(String),
    Cancelled,
}

impl ItemOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ItemOutcome::Downloaded => "downloaded",
            ItemOutcome::Skipped => "skipped",
            ItemOutcome::PartialNoAudio => "partial (no audio)",
            ItemOutcome::Failed(_) => "failed",
            ItemOutcome::Cancelled => "cancelled",
        }
    }
}

/// Aggregate result of one batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<(String, ItemOutcome)>,
    /// Merge jobs still queued when the run stopped; their temp files are
    /// left on disk for a future resumed run.
    pub merges_pending: usize,
}

impl BatchSummary {
    pub fn count(&self, matches: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| matches(o)).count()
    }

    pub fn downloaded(&self) -> usize {
        self.count(|o| *o == ItemOutcome::Downloaded)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == ItemOutcome::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    pub fn partial(&self) -> usize {
        self.count(|o| *o == ItemOutcome::PartialNoAudio)
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| *o == ItemOutcome::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_descriptor_round_trip() {
        let json = r#"{
            "item_id": "BV1xx",
            "title": "a video",
            "streams": [
                {"item_id": "BV1xx", "kind": "video", "url": "http://cdn/v", "expected_size": 1000},
                {"item_id": "BV1xx", "kind": "audio", "url": "http://cdn/a", "expected_size": 200}
            ]
        }"#;
        let item: ItemDescriptor = serde_json::from_str(json).unwrap();
        assert!(item.needs_merge());
        assert_eq!(item.stream(TrackKind::Video).unwrap().expected_size, Some(1000));
        assert_eq!(item.stream(TrackKind::Audio).unwrap().container, "mp4");
        assert!(item.stream(TrackKind::Combined).is_none());
    }

    #[test]
    fn combined_item_does_not_need_merge() {
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
        assert!(!item.needs_merge());
    }

    #[test]
    fn summary_counts_by_outcome() {
        let summary = BatchSummary {
            outcomes: vec![
                ("a".into(), ItemOutcome::Downloaded),
                ("b".into(), ItemOutcome::Skipped),
                ("c".into(), ItemOutcome::Failed("boom".into())),
                ("d".into(), ItemOutcome::PartialNoAudio),
            ],
            merges_pending: 0,
        };
        assert_eq!(summary.downloaded(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.partial(), 1);
        assert_eq!(summary.cancelled(), 0);
    }
}
