use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] favgrab_engine::DownloadError),

    #[error("Invalid manifest {path}: {reason}")]
    Manifest { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AppError>;
