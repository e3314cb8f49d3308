//! Progress reporting seam between the engine and whatever renders it.

use crate::model::TrackKind;

/// Observer notified as transfers advance. Implementations must not
/// block: they are called from inside the transfer loop.
pub trait ProgressObserver: Send + Sync {
    /// A transfer is starting (or resuming from `bytes_done > 0`).
    fn on_start(&self, item_id: &str, kind: TrackKind, bytes_done: u64, total: Option<u64>);

    /// Bytes written so far for a track.
    fn on_progress(&self, item_id: &str, kind: TrackKind, bytes_done: u64, total: Option<u64>);

    /// The transfer finished (successfully or not); the bar can be
    /// cleared either way.
    fn on_finish(&self, item_id: &str, kind: TrackKind);
}

/// Observer that drops everything; the default for library use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressObserver for NullProgress {
    fn on_start(&self, _: &str, _: TrackKind, _: u64, _: Option<u64>) {}
    fn on_progress(&self, _: &str, _: TrackKind, _: u64, _: Option<u64>) {}
    fn on_finish(&self, _: &str, _: TrackKind) {}
}
