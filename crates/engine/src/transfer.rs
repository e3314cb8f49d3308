//! Transfer unit: downloads one remote byte stream to a local temp path,
//! resumable via range requests, with retry/backoff.

use std::path::Path;

use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::cancel::CancellationController;
use crate::error::DownloadError;
use crate::model::{StreamDescriptor, TransferState, TransferStatus};
use crate::progress::ProgressObserver;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};

/// Drives a single stream to completion at `temp_path`.
pub struct TransferUnit<'a> {
    client: &'a reqwest::Client,
    policy: &'a RetryPolicy,
    cancel: &'a CancellationController,
    progress: &'a dyn ProgressObserver,
}

impl<'a> TransferUnit<'a> {
    pub fn new(
        client: &'a reqwest::Client,
        policy: &'a RetryPolicy,
        cancel: &'a CancellationController,
        progress: &'a dyn ProgressObserver,
    ) -> Self {
        Self {
            client,
            policy,
            cancel,
            progress,
        }
    }

    /// Download `descriptor` to `temp_path`, resuming a partial temp file
    /// when the server honors range requests.
    ///
    /// Returns the final [`TransferState`]: `Complete` on success, or
    /// `Resumable` when cancellation stopped the transfer, which is not
    /// a failure and skips the error cleanup below. Real failures come
    /// back as `Err`; the temp file is retained unless it is known
    /// corrupt (zero bytes).
    pub async fn run(
        &self,
        descriptor: &StreamDescriptor,
        temp_path: &Path,
    ) -> Result<TransferState, DownloadError> {
        let mut state = TransferState::new(descriptor.clone(), temp_path.to_path_buf());
        state.status = TransferStatus::InProgress;

        let result = retry_with_backoff(self.policy, self.cancel.token(), |attempt| {
            let state_path = temp_path.to_path_buf();
            async move {
                match self.attempt(descriptor, &state_path, attempt).await {
                    Ok(bytes) => RetryAction::Success(bytes),
                    Err(DownloadError::Cancelled) => RetryAction::Fail(DownloadError::Cancelled),
                    Err(err) => RetryAction::from_error(err),
                }
            }
        })
        .await;

        self.progress.on_finish(&descriptor.item_id, descriptor.kind);

        match result {
            Ok(bytes) => {
                state.bytes_written = bytes;
                state.status = TransferStatus::Complete;
                Ok(state)
            }
            Err(DownloadError::Cancelled) => {
                state.bytes_written = existing_len(temp_path).await;
                state.status = TransferStatus::Resumable;
                Ok(state)
            }
            Err(err) => {
                state.bytes_written = existing_len(temp_path).await;
                state.status = TransferStatus::Failed;
                // A zero-byte temp carries nothing worth resuming.
                if state.bytes_written == 0 {
                    let _ = tokio::fs::remove_file(temp_path).await;
                }
                Err(err)
            }
        }
    }

    /// One download attempt: probe the resume offset, issue the request,
    /// stream the body to disk, verify the size.
    async fn attempt(
        &self,
        descriptor: &StreamDescriptor,
        temp_path: &Path,
        attempt: u32,
    ) -> Result<u64, DownloadError> {
        let mut offset = existing_len(temp_path).await;

        if let Some(expected) = descriptor.expected_size {
            if offset == expected {
                // A previous run finished the body but stopped before
                // promotion; nothing left to fetch.
                debug!(item = %descriptor.item_id, kind = %descriptor.kind, "Temp file already complete");
                return Ok(offset);
            }
            if offset > expected {
                // Larger than the remote resource: stale content from an
                // earlier version. Restart from zero.
                warn!(
                    item = %descriptor.item_id,
                    offset,
                    expected,
                    "Temp file larger than expected, restarting"
                );
                tokio::fs::remove_file(temp_path).await?;
                offset = 0;
            }
        }

        let mut request = self.client.get(&descriptor.url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await?;
        let status = response.status();

        let resume = match status {
            StatusCode::PARTIAL_CONTENT if offset > 0 => true,
            StatusCode::OK => {
                if offset > 0 {
                    // Server ignored the range (or the content changed):
                    // the existing bytes cannot be trusted.
                    info!(
                        item = %descriptor.item_id,
                        kind = %descriptor.kind,
                        "Range not honored, restarting from zero"
                    );
                    offset = 0;
                }
                false
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                // Offset beyond the resource: the content changed under
                // us. The temp file is corrupt, drop it and restart.
                tokio::fs::remove_file(temp_path).await?;
                return Err(DownloadError::Timeout {
                    reason: "range no longer satisfiable, restarting".to_string(),
                });
            }
            s if s.is_success() => false,
            s => return Err(DownloadError::http_status(s, descriptor.url.clone())),
        };

        let total = descriptor
            .expected_size
            .or_else(|| response.content_length().map(|len| len + offset));

        if attempt == 0 || offset > 0 {
            debug!(
                item = %descriptor.item_id,
                kind = %descriptor.kind,
                offset,
                ?total,
                resume,
                "Starting transfer"
            );
        }
        self.progress
            .on_start(&descriptor.item_id, descriptor.kind, offset, total);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(resume)
            .write(true)
            .truncate(!resume)
            .open(temp_path)
            .await?;

        let mut written = offset;
        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.hard_token().cancelled() => {
                    // Hard abort: stop without flushing. The temp file
                    // stays at whatever the OS already committed.
                    return Err(DownloadError::Cancelled);
                }
                _ = self.cancel.token().cancelled() => {
                    file.flush().await?;
                    return Err(DownloadError::Cancelled);
                }
                chunk = stream.next() => chunk,
            };

            let chunk = match chunk {
                Some(chunk) => chunk?,
                None => break,
            };

            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            self.progress
                .on_progress(&descriptor.item_id, descriptor.kind, written, total);
        }

        file.flush().await?;

        if let Some(expected) = descriptor.expected_size
            && written != expected
        {
            // Retained on disk: a future attempt resumes from `written`.
            return Err(DownloadError::SizeMismatch {
                expected,
                actual: written,
            });
        }

        Ok(written)
    }
}

async fn existing_len(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_temp_has_zero_length() {
        assert_eq!(existing_len(Path::new("/no/such/file.part")).await, 0);
    }

    #[tokio::test]
    async fn partial_temp_reports_its_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.video.part");
        tokio::fs::write(&path, vec![0u8; 123]).await.unwrap();
        assert_eq!(existing_len(&path).await, 123);
    }
}
