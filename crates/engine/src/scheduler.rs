//! Download scheduler: drives an ordered batch of items to completion
//! with bounded transfer concurrency, applying the overwrite policy and
//! feeding the background merge worker.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cancel::CancellationController;
use crate::catalog::{PreresolvedStreams, StreamResolver};
use crate::config::DownloaderConfig;
use crate::error::DownloadError;
use crate::merge::{MergeOutcome, MergeQueue, merge_channel};
use crate::model::{
    BatchSummary, ItemDescriptor, ItemOutcome, MergeJob, StreamDescriptor, TrackKind,
    TransferStatus,
};
use crate::mux::Muxer;
use crate::naming;
use crate::overwrite::{Decision, OverwritePolicy};
use crate::progress::{NullProgress, ProgressObserver};
use crate::transfer::TransferUnit;

/// Caller hook for resolving an overwrite conflict the standing policy
/// does not cover. Implementations may escalate by setting an
/// apply-to-all mode on the policy; the scheduler never does.
pub trait OverwritePrompt: Send + Sync {
    fn resolve(&self, policy: &OverwritePolicy, target: &Path, title: &str) -> Decision;
}

/// Non-interactive default: an undecided conflict is a skip.
pub struct SkipUndecided;

impl OverwritePrompt for SkipUndecided {
    fn resolve(&self, _: &OverwritePolicy, _: &Path, _: &str) -> Decision {
        Decision::Skip
    }
}

pub struct Scheduler {
    client: reqwest::Client,
    config: DownloaderConfig,
    cancel: CancellationController,
    overwrite: OverwritePolicy,
    prompt: Arc<dyn OverwritePrompt>,
    progress: Arc<dyn ProgressObserver>,
    resolver: Arc<dyn StreamResolver>,
    muxer: Option<Arc<dyn Muxer>>,
}

impl Scheduler {
    pub fn new(
        config: DownloaderConfig,
        cancel: CancellationController,
        overwrite: OverwritePolicy,
        muxer: Option<Arc<dyn Muxer>>,
    ) -> Result<Self, DownloadError> {
        let client = config.build_client()?;
        Ok(Self {
            client,
            config,
            cancel,
            overwrite,
            prompt: Arc::new(SkipUndecided),
            progress: Arc::new(NullProgress),
            resolver: Arc::new(PreresolvedStreams),
            muxer,
        })
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn OverwritePrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Swap in the external catalog resolver; the default passes through
    /// descriptors that are already materialized on the items.
    pub fn with_resolver(mut self, resolver: Arc<dyn StreamResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    /// Whether the external muxing tool was detected at startup. When
    /// false, only `combined`-kind items are schedulable.
    pub fn mux_available(&self) -> bool {
        self.muxer.is_some()
    }

    /// Drive the batch to completion. Every item yields exactly one
    /// terminal outcome; sibling failures never abort the run. Returns
    /// once all transfers are settled and the merge worker has exited.
    pub async fn run(&self, items: Vec<ItemDescriptor>) -> Result<BatchSummary, DownloadError> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let (queue, worker_handle) = match &self.muxer {
            Some(muxer) => {
                let (queue, worker) = merge_channel(
                    muxer.clone(),
                    self.config.merge_retries,
                    self.cancel.token().clone(),
                );
                (Some(queue), Some(tokio::spawn(worker.run())))
            }
            None => (None, None),
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_transfers));

        let mut tasks: FuturesUnordered<_> = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let semaphore = semaphore.clone();
                let queue = queue.clone();
                async move {
                    let outcome = self.process_item(item, semaphore, queue).await;
                    info!(item = %item.item_id, outcome = outcome.label(), "Item settled");
                    (index, item.item_id.clone(), outcome)
                }
            })
            .collect();

        let mut outcomes = Vec::with_capacity(items.len());
        while let Some(result) = tasks.next().await {
            outcomes.push(result);
        }
        drop(tasks);

        // Close the producer side so the worker drains and exits; on
        // cancellation it stops at the next job boundary instead.
        drop(queue);
        let merges_pending = match worker_handle {
            Some(handle) => handle.await.map_err(|e| DownloadError::Internal {
                reason: format!("merge worker panicked: {e}"),
            })?,
            None => 0,
        };

        self.cancel.confirm_stopped();

        outcomes.sort_by_key(|(index, _, _)| *index);
        Ok(BatchSummary {
            outcomes: outcomes
                .into_iter()
                .map(|(_, id, outcome)| (id, outcome))
                .collect(),
            merges_pending,
        })
    }

    async fn process_item(
        &self,
        item: &ItemDescriptor,
        semaphore: Arc<Semaphore>,
        queue: Option<MergeQueue>,
    ) -> ItemOutcome {
        if self.cancel.is_cancelled() {
            return ItemOutcome::Cancelled;
        }

        let streams = match self.resolver.resolve(item).await {
            Ok(streams) => streams,
            Err(e) => return ItemOutcome::Failed(e.to_string()),
        };
        let find = |kind| streams.iter().find(|s: &&StreamDescriptor| s.kind == kind);
        let video = find(TrackKind::Video);
        let audio = find(TrackKind::Audio);
        let combined = find(TrackKind::Combined);

        // The primary stream names the final file.
        let primary = match combined.or(video) {
            Some(primary) => primary,
            None => return ItemOutcome::Failed("no video or combined stream".to_string()),
        };

        let final_path = naming::final_path(
            &self.config.output_dir,
            &item.title,
            &item.item_id,
            &primary.container,
        );

        // Overwrite first: a skipped item is skipped regardless of what
        // capabilities it would have needed.
        match self.overwrite.decide_for(&final_path) {
            Decision::Proceed => {}
            Decision::Skip => {
                debug!(item = %item.item_id, "Target exists, skipping");
                return ItemOutcome::Skipped;
            }
            Decision::NeedsPrompt => {
                match self.prompt.resolve(&self.overwrite, &final_path, &item.title) {
                    Decision::Proceed => {}
                    Decision::Skip | Decision::NeedsPrompt => return ItemOutcome::Skipped,
                }
            }
        }

        let needs_merge = combined.is_none() && video.is_some() && audio.is_some();
        if needs_merge && queue.is_none() {
            // Capability-gated before any network I/O.
            warn!(item = %item.item_id, "Rejected: track pair needs the unavailable muxing tool");
            return ItemOutcome::Failed(DownloadError::MuxingUnavailable.to_string());
        }

        if needs_merge {
            // Unwraps guarded by `needs_merge` above.
            let video = video.expect("needs_merge implies video");
            let audio = audio.expect("needs_merge implies audio");
            let queue = queue.expect("needs_merge implies queue");
            self.process_pair(item, video, audio, &final_path, semaphore, queue)
                .await
        } else {
            self.process_single(item, primary, &final_path, semaphore)
                .await
        }
    }

    /// A `combined` stream (or a lone video track): one transfer, then
    /// the temp file is promoted directly to the final path.
    async fn process_single(
        &self,
        item: &ItemDescriptor,
        stream: &StreamDescriptor,
        final_path: &Path,
        semaphore: Arc<Semaphore>,
    ) -> ItemOutcome {
        match self.transfer(stream, semaphore).await {
            Ok(TrackResult::Complete(temp)) => {
                if self.cancel.is_cancelled() {
                    // No final file appears once the flag is set; the
                    // complete temp is picked up by the next run.
                    return ItemOutcome::Cancelled;
                }
                match promote(&temp, final_path).await {
                    Ok(()) => {
                        info!(item = %item.item_id, output = %final_path.display(), "Download complete");
                        ItemOutcome::Downloaded
                    }
                    Err(e) => ItemOutcome::Failed(e.to_string()),
                }
            }
            Ok(TrackResult::Cancelled) => ItemOutcome::Cancelled,
            Err(e) => ItemOutcome::Failed(e.to_string()),
        }
    }

    /// A video+audio pair: both transfers run concurrently; the pair is
    /// handed to the merge worker only once both reach `Complete`.
    async fn process_pair(
        &self,
        item: &ItemDescriptor,
        video: &StreamDescriptor,
        audio: &StreamDescriptor,
        final_path: &Path,
        semaphore: Arc<Semaphore>,
        queue: MergeQueue,
    ) -> ItemOutcome {
        let (video_result, audio_result) = tokio::join!(
            self.transfer(video, semaphore.clone()),
            self.transfer(audio, semaphore.clone()),
        );

        let video_temp = match video_result {
            Ok(TrackResult::Complete(temp)) => temp,
            Ok(TrackResult::Cancelled) => return ItemOutcome::Cancelled,
            Err(e) => return ItemOutcome::Failed(format!("video track: {e}")),
        };

        let audio_temp = match audio_result {
            Ok(TrackResult::Complete(temp)) => temp,
            Ok(TrackResult::Cancelled) => return ItemOutcome::Cancelled,
            Err(e) => {
                // The video survived; salvage it rather than discarding
                // the completed work. No partial merge is attempted.
                warn!(item = %item.item_id, error = %e, "Audio track failed, keeping video only");
                return match promote(&video_temp, final_path).await {
                    Ok(()) => ItemOutcome::PartialNoAudio,
                    Err(promote_err) => ItemOutcome::Failed(promote_err.to_string()),
                };
            }
        };

        if self.cancel.is_cancelled() {
            // Both temps are complete and stay on disk; a future run
            // finds them and goes straight to the merge stage.
            return ItemOutcome::Cancelled;
        }

        let rx = queue.enqueue(MergeJob {
            item_id: item.item_id.clone(),
            title: item.title.clone(),
            video_temp,
            audio_temp: Some(audio_temp),
            final_path: final_path.to_path_buf(),
            attempt: 0,
        });

        match rx.await {
            Ok(MergeOutcome::Merged) => ItemOutcome::Downloaded,
            Ok(MergeOutcome::VideoOnly { reason }) => {
                warn!(item = %item.item_id, %reason, "Merged without audio");
                ItemOutcome::PartialNoAudio
            }
            // Worker exited before reaching this job (cancellation);
            // temps are intact for a future run.
            Err(_) => ItemOutcome::Cancelled,
        }
    }

    /// Acquire a concurrency permit and run one transfer unit.
    async fn transfer(
        &self,
        stream: &StreamDescriptor,
        semaphore: Arc<Semaphore>,
    ) -> Result<TrackResult, DownloadError> {
        let _permit = tokio::select! {
            _ = self.cancel.token().cancelled() => return Ok(TrackResult::Cancelled),
            permit = semaphore.acquire_owned() => permit.map_err(|_| DownloadError::Internal {
                reason: "transfer semaphore closed".to_string(),
            })?,
        };

        let temp = naming::temp_path(&self.config.output_dir, &stream.item_id, stream.kind);
        let unit = TransferUnit::new(
            &self.client,
            &self.config.retry,
            &self.cancel,
            self.progress.as_ref(),
        );
        let state = unit.run(stream, &temp).await?;
        match state.status {
            TransferStatus::Complete => Ok(TrackResult::Complete(temp)),
            _ => Ok(TrackResult::Cancelled),
        }
    }
}

enum TrackResult {
    Complete(std::path::PathBuf),
    Cancelled,
}

/// Move a finished temp file onto its final path, replacing any existing
/// file (the overwrite decision was already taken).
async fn promote(temp: &Path, final_path: &Path) -> Result<(), DownloadError> {
    if tokio::fs::metadata(final_path).await.is_ok() {
        tokio::fs::remove_file(final_path).await?;
    }
    tokio::fs::rename(temp, final_path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overwrite::OverwriteMode;

    fn pair_item(id: &str) -> ItemDescriptor {
        ItemDescriptor {
            item_id: id.to_string(),
            title: format!("title {id}"),
            streams: vec![
                StreamDescriptor {
                    item_id: id.to_string(),
                    kind: TrackKind::Video,
                    // Unroutable: any network attempt would error, which
                    // the assertions below would surface.
                    url: "http://192.0.2.1/video".to_string(),
                    expected_size: Some(1000),
                    container: "mp4".to_string(),
                },
                StreamDescriptor {
                    item_id: id.to_string(),
                    kind: TrackKind::Audio,
                    url: "http://192.0.2.1/audio".to_string(),
                    expected_size: Some(200),
                    container: "mp4".to_string(),
                },
            ],
        }
    }

    fn scheduler_in(dir: &Path, mode: OverwriteMode) -> Scheduler {
        let config = DownloaderConfig::default().with_output_dir(dir);
        Scheduler::new(
            config,
            CancellationController::new(),
            OverwritePolicy::new(mode),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn pair_is_rejected_up_front_without_muxer() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_in(dir.path(), OverwriteMode::Prompt);
        assert!(!scheduler.mux_available());

        let summary = scheduler.run(vec![pair_item("a")]).await.unwrap();
        assert_eq!(summary.outcomes.len(), 1);
        assert!(matches!(&summary.outcomes[0].1, ItemOutcome::Failed(reason)
            if reason.contains("muxing tool unavailable")));
        // Rejected before any transfer: no temp files appear.
        assert!(!dir.path().join("a.video.part").exists());
        assert!(!dir.path().join("a.audio.part").exists());
    }

    #[tokio::test]
    async fn existing_target_with_skip_all_makes_no_network_calls() {
        let dir = tempfile::tempdir().unwrap();
        let item = pair_item("a");
        let final_path = naming::final_path(dir.path(), &item.title, &item.item_id, "mp4");
        std::fs::write(&final_path, b"already here").unwrap();

        let scheduler = scheduler_in(dir.path(), OverwriteMode::SkipAll);
        let summary = scheduler.run(vec![item]).await.unwrap();

        assert_eq!(summary.outcomes[0].1, ItemOutcome::Skipped);
        assert_eq!(std::fs::read(&final_path).unwrap(), b"already here");
        assert!(!dir.path().join("a.video.part").exists());
    }

    #[tokio::test]
    async fn undecided_conflict_defaults_to_skip() {
        let dir = tempfile::tempdir().unwrap();
        let item = pair_item("a");
        let final_path = naming::final_path(dir.path(), &item.title, &item.item_id, "mp4");
        std::fs::write(&final_path, b"x").unwrap();

        let scheduler = scheduler_in(dir.path(), OverwriteMode::Prompt);
        let summary = scheduler.run(vec![item]).await.unwrap();
        assert_eq!(summary.outcomes[0].1, ItemOutcome::Skipped);
    }

    #[tokio::test]
    async fn cancelled_before_start_yields_cancelled_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let config = DownloaderConfig::default().with_output_dir(dir.path());
        let cancel = CancellationController::new();
        cancel.cancel();
        let scheduler = Scheduler::new(
            config,
            cancel,
            OverwritePolicy::new(OverwriteMode::OverwriteAll),
            None,
        )
        .unwrap();

        let summary = scheduler
            .run(vec![pair_item("a"), pair_item("b")])
            .await
            .unwrap();
        assert_eq!(summary.outcomes.len(), 2);
        for (_, outcome) in &summary.outcomes {
            assert_eq!(*outcome, ItemOutcome::Cancelled);
        }
    }

    #[tokio::test]
    async fn item_without_streams_fails_without_aborting_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let empty = ItemDescriptor {
            item_id: "empty".to_string(),
            title: "empty".to_string(),
            streams: Vec::new(),
        };
        let existing = pair_item("b");
        let final_path = naming::final_path(dir.path(), &existing.title, &existing.item_id, "mp4");
        std::fs::write(&final_path, b"x").unwrap();

        let scheduler = scheduler_in(dir.path(), OverwriteMode::SkipAll);
        let summary = scheduler.run(vec![empty, existing]).await.unwrap();

        assert!(matches!(&summary.outcomes[0].1, ItemOutcome::Failed(_)));
        assert_eq!(summary.outcomes[1].1, ItemOutcome::Skipped);
    }
}
