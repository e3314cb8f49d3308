use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// How to handle final files that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnExisting {
    /// Ask per file; the answer can be widened to the whole batch.
    Prompt,
    /// Skip every existing file without asking.
    Skip,
    /// Overwrite every existing file without asking.
    Overwrite,
}

#[derive(Debug, Parser)]
#[command(
    name = "favgrab",
    version,
    about = "Download collection items from a resolved stream manifest, merging track pairs in the background"
)]
pub struct Args {
    /// JSON manifest with the items to download (resolved stream URLs).
    pub manifest: PathBuf,

    /// Directory final files and resumable temp files are written to.
    #[arg(short, long, default_value = "./downloads")]
    pub out_dir: PathBuf,

    /// Maximum simultaneously active transfers across all items.
    #[arg(short = 'j', long, default_value_t = 3)]
    pub concurrency: usize,

    /// What to do when a final file already exists.
    #[arg(long, value_enum, default_value_t = OnExisting::Prompt)]
    pub on_existing: OnExisting,

    /// Path to the ffmpeg binary (default: resolve from PATH).
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Retry attempts per transfer after the initial one.
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Retry attempts per merge job before falling back to video-only.
    #[arg(long, default_value_t = 2)]
    pub merge_retries: u32,

    /// Per-operation network timeout in seconds (connect and read).
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Verbose logging (debug level).
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet logging (errors only).
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
