//! Background merge queue and its single worker.
//!
//! Downloads never wait on assembly: the scheduler enqueues a
//! [`MergeJob`] as soon as both tracks of an item are complete and moves
//! on. One worker drains the queue strictly in arrival order, invoking
//! the muxer per job. The jobs are independent, so FIFO is a simplicity
//! choice rather than a correctness requirement.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::DownloadError;
use crate::model::MergeJob;
use crate::mux::Muxer;

/// Delay between mux attempts for the same job.
const MERGE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Terminal result of one merge job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Both tracks were muxed into the final file; temps removed.
    Merged,
    /// Muxing kept failing; the video-only track was promoted instead.
    VideoOnly { reason: String },
}

struct QueuedJob {
    job: MergeJob,
    done: oneshot::Sender<MergeOutcome>,
}

/// Producer handle. Enqueueing never blocks; cloning shares the queue.
#[derive(Clone)]
pub struct MergeQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
    depth: Arc<AtomicUsize>,
}

impl MergeQueue {
    /// Hand a completed track pair to the background worker. The
    /// returned receiver resolves once the job reaches a terminal state;
    /// it errors if the worker shut down first (cancellation), in which
    /// case the temp files are left in place for a future run.
    pub fn enqueue(&self, job: MergeJob) -> oneshot::Receiver<MergeOutcome> {
        let (done_tx, done_rx) = oneshot::channel();
        self.depth.fetch_add(1, Ordering::AcqRel);
        info!(item = %job.item_id, pending = self.pending(), "Queued merge job");
        if self
            .tx
            .send(QueuedJob {
                job,
                done: done_tx,
            })
            .is_err()
        {
            // Worker already gone; the dropped sender surfaces through
            // the receiver.
            self.depth.fetch_sub(1, Ordering::AcqRel);
        }
        done_rx
    }

    /// Jobs enqueued but not yet terminal.
    pub fn pending(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

/// The single background consumer. Run it with `tokio::spawn`.
pub struct MergeWorker {
    rx: mpsc::UnboundedReceiver<QueuedJob>,
    depth: Arc<AtomicUsize>,
    muxer: Arc<dyn Muxer>,
    retries: u32,
    token: CancellationToken,
}

/// Create the queue plus its worker. The worker exits when every
/// producer handle is dropped and the queue is drained, or at the next
/// job boundary after cancellation.
pub fn merge_channel(
    muxer: Arc<dyn Muxer>,
    retries: u32,
    token: CancellationToken,
) -> (MergeQueue, MergeWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        MergeQueue {
            tx,
            depth: depth.clone(),
        },
        MergeWorker {
            rx,
            depth,
            muxer,
            retries,
            token,
        },
    )
}

impl MergeWorker {
    /// Drain the queue until it closes or cancellation is observed
    /// between jobs. Returns the number of jobs left undrained; their
    /// temp files stay on disk for a future resumed run.
    pub async fn run(mut self) -> usize {
        loop {
            if self.token.is_cancelled() {
                break;
            }

            let queued = tokio::select! {
                _ = self.token.cancelled() => break,
                queued = self.rx.recv() => match queued {
                    Some(queued) => queued,
                    None => break,
                },
            };

            // Cancellation is deliberately not observed past this point:
            // aborting mid-mux would leave a half-written output.
            let outcome = self.process(queued.job).await;
            self.depth.fetch_sub(1, Ordering::AcqRel);
            let _ = queued.done.send(outcome);
        }

        let undrained = self.depth.load(Ordering::Acquire);
        if undrained > 0 {
            warn!(undrained, "Merge worker exiting with jobs still queued");
        }
        undrained
    }

    async fn process(&self, mut job: MergeJob) -> MergeOutcome {
        let audio = match job.audio_temp.clone() {
            Some(audio) => audio,
            None => {
                // Defensive: a pair-less job should not have been queued.
                return self.promote_video_only(&job, "no audio track on job").await;
            }
        };

        let staging = job.final_path.with_extension("merged.part");
        let max_attempts = self.retries + 1;
        let mut last_error = String::new();

        while job.attempt < max_attempts {
            job.attempt += 1;
            info!(
                item = %job.item_id,
                attempt = job.attempt,
                max = max_attempts,
                "Merging tracks"
            );
            match self.muxer.mux(&job.video_temp, &audio, &staging).await {
                Ok(()) => match self.finish_merged(&job, &audio, &staging).await {
                    Ok(()) => {
                        info!(item = %job.item_id, output = %job.final_path.display(), "Merge complete");
                        return MergeOutcome::Merged;
                    }
                    Err(e) => last_error = e.to_string(),
                },
                Err(e) => last_error = e.to_string(),
            }
            if job.attempt < max_attempts {
                tokio::time::sleep(MERGE_RETRY_DELAY).await;
            }
        }

        error!(item = %job.item_id, error = %last_error, "Merge failed, keeping video-only track");
        let _ = tokio::fs::remove_file(&staging).await;
        let _ = tokio::fs::remove_file(&audio).await;
        self.promote_video_only(&job, &last_error).await
    }

    async fn finish_merged(
        &self,
        job: &MergeJob,
        audio: &std::path::Path,
        staging: &std::path::Path,
    ) -> Result<(), DownloadError> {
        tokio::fs::rename(staging, &job.final_path).await?;
        tokio::fs::remove_file(&job.video_temp).await?;
        tokio::fs::remove_file(audio).await?;
        Ok(())
    }

    async fn promote_video_only(&self, job: &MergeJob, reason: &str) -> MergeOutcome {
        if let Err(e) = tokio::fs::rename(&job.video_temp, &job.final_path).await {
            error!(
                item = %job.item_id,
                error = %e,
                "Failed to promote video-only track"
            );
        }
        MergeOutcome::VideoOnly {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::AtomicU32;

    /// Muxer scripted to fail a fixed number of times before writing the
    /// output file.
    struct ScriptedMuxer {
        failures_before_success: u32,
        calls: AtomicU32,
        order: parking_lot::Mutex<Vec<String>>,
    }

    impl ScriptedMuxer {
        fn new(failures_before_success: u32) -> Self {
            Self {
                failures_before_success,
                calls: AtomicU32::new(0),
                order: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Muxer for ScriptedMuxer {
        async fn mux(
            &self,
            video: &Path,
            _audio: &Path,
            output: &Path,
        ) -> Result<(), DownloadError> {
            let call = self.calls.fetch_add(1, Ordering::AcqRel);
            self.order
                .lock()
                .push(video.file_name().unwrap().to_string_lossy().into_owned());
            if call < self.failures_before_success {
                return Err(DownloadError::muxing_failed("scripted failure"));
            }
            tokio::fs::write(output, b"muxed").await?;
            Ok(())
        }
    }

    fn job_in(dir: &Path, id: &str) -> MergeJob {
        let video = dir.join(format!("{id}.video.part"));
        let audio = dir.join(format!("{id}.audio.part"));
        std::fs::write(&video, b"video-bytes").unwrap();
        std::fs::write(&audio, b"audio-bytes").unwrap();
        MergeJob {
            item_id: id.to_string(),
            title: id.to_string(),
            video_temp: video,
            audio_temp: Some(audio),
            final_path: dir.join(format!("{id}.mp4")),
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn successful_merge_promotes_and_cleans_temps() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Arc::new(ScriptedMuxer::new(0));
        let token = CancellationToken::new();
        let (queue, worker) = merge_channel(muxer, 2, token);
        let handle = tokio::spawn(worker.run());

        let job = job_in(dir.path(), "a");
        let final_path = job.final_path.clone();
        let video = job.video_temp.clone();
        let audio = job.audio_temp.clone().unwrap();
        let outcome = queue.enqueue(job).await.unwrap();

        assert_eq!(outcome, MergeOutcome::Merged);
        assert!(final_path.exists());
        assert!(!video.exists());
        assert!(!audio.exists());

        drop(queue);
        assert_eq!(handle.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Arc::new(ScriptedMuxer::new(1));
        let calls = muxer.clone();
        let token = CancellationToken::new();
        let (queue, worker) = merge_channel(muxer, 2, token);
        let handle = tokio::spawn(worker.run());

        let outcome = queue.enqueue(job_in(dir.path(), "a")).await.unwrap();
        assert_eq!(outcome, MergeOutcome::Merged);
        assert_eq!(calls.calls.load(Ordering::Acquire), 2);

        drop(queue);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_video_only() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Arc::new(ScriptedMuxer::new(u32::MAX));
        let calls = muxer.clone();
        let token = CancellationToken::new();
        let (queue, worker) = merge_channel(muxer, 2, token);
        let handle = tokio::spawn(worker.run());

        let job = job_in(dir.path(), "a");
        let final_path = job.final_path.clone();
        let outcome = queue.enqueue(job).await.unwrap();

        assert!(matches!(outcome, MergeOutcome::VideoOnly { .. }));
        // retries=2 means three attempts total, never a silent drop.
        assert_eq!(calls.calls.load(Ordering::Acquire), 3);
        assert!(final_path.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"video-bytes");

        drop(queue);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn jobs_run_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Arc::new(ScriptedMuxer::new(0));
        let order = muxer.clone();
        let token = CancellationToken::new();
        let (queue, worker) = merge_channel(muxer, 0, token);

        let rx_a = queue.enqueue(job_in(dir.path(), "a"));
        let rx_b = queue.enqueue(job_in(dir.path(), "b"));
        let rx_c = queue.enqueue(job_in(dir.path(), "c"));
        assert_eq!(queue.pending(), 3);

        let handle = tokio::spawn(worker.run());
        rx_a.await.unwrap();
        rx_b.await.unwrap();
        rx_c.await.unwrap();

        assert_eq!(
            *order.order.lock(),
            vec!["a.video.part", "b.video.part", "c.video.part"]
        );
        assert_eq!(queue.pending(), 0);

        drop(queue);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_between_jobs_leaves_queue_undrained() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        // Cancel before the worker starts: it must exit at the first
        // job boundary without touching anything.
        token.cancel();
        let muxer = Arc::new(ScriptedMuxer::new(0));
        let (queue, worker) = merge_channel(muxer, 0, token);

        let rx = queue.enqueue(job_in(dir.path(), "a"));
        let video = dir.path().join("a.video.part");

        let undrained = worker.run().await;
        assert_eq!(undrained, 1);
        assert_eq!(queue.pending(), 1);
        // The job's completion channel is dropped, not resolved.
        assert!(rx.await.is_err());
        // Temp files stay for a future resumed run.
        assert!(video.exists());
    }
}
