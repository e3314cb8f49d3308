//! External muxing tool integration.
//!
//! The merge worker only sees the [`Muxer`] trait; the production
//! implementation shells out to ffmpeg. Availability is probed once at
//! startup and consulted before any merge-needing item is scheduled.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::DownloadError;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Build a `tokio::process::Command` that does not flash a console
/// window on Windows.
fn command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let cmd = tokio::process::Command::new(program);
    #[cfg(windows)]
    let cmd = {
        use std::os::windows::process::CommandExt;
        let mut cmd = cmd;
        cmd.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        cmd
    };
    cmd
}

/// Combines separate video and audio tracks into one container file.
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError>;
}

/// ffmpeg-backed muxer. Construct via [`FfmpegMuxer::detect`].
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    path: PathBuf,
    version: String,
}

impl FfmpegMuxer {
    /// Probe for a working ffmpeg. `override_path` wins when given;
    /// otherwise `ffmpeg` is resolved from PATH. Returns `None` when no
    /// working binary is found, which gates merge-needing items out of
    /// scheduling entirely.
    pub async fn detect(override_path: Option<&Path>) -> Option<Self> {
        let candidate: PathBuf = override_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));

        match Self::probe_version(&candidate).await {
            Some(version) => {
                info!(path = %candidate.display(), %version, "Muxing tool detected");
                Some(Self {
                    path: candidate,
                    version,
                })
            }
            None => {
                warn!(
                    path = %candidate.display(),
                    "Muxing tool not found; only combined streams are schedulable"
                );
                None
            }
        }
    }

    async fn probe_version(path: &Path) -> Option<String> {
        let output = command(path).arg("-version").output().await.ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        // First line looks like `ffmpeg version 7.1 Copyright ...`.
        let version = stdout
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(2))
            .unwrap_or("unknown")
            .to_string();
        Some(version)
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        debug!(
            video = %video.display(),
            audio = %audio.display(),
            output = %output.display(),
            "Invoking ffmpeg"
        );

        // Stream copy, first input's video + second input's audio.
        let result = command(&self.path)
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-c", "copy", "-map", "0:v:0", "-map", "1:a:0", "-y"])
            .arg(output)
            .output()
            .await
            .map_err(|e| DownloadError::muxing_failed(format!("failed to spawn ffmpeg: {e}")))?;

        if result.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(3)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("; ");
        Err(DownloadError::muxing_failed(format!(
            "ffmpeg exited with {}: {tail}",
            result.status
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detect_fails_for_missing_binary() {
        let bogus = Path::new("/definitely/not/a/real/ffmpeg");
        assert!(FfmpegMuxer::detect(Some(bogus)).await.is_none());
    }
}
