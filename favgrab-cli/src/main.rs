mod cli;
mod error;
mod manifest;
mod output;
mod prompt;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use favgrab_engine::{
    CancellationController, CollectionCache, DownloaderConfig, FfmpegMuxer, OverwriteMode,
    OverwritePolicy, RetryPolicy, Scheduler,
};

use crate::{
    cli::{Args, OnExisting},
    error::Result,
    manifest::ManifestCache,
    output::ConsoleProgress,
    prompt::InteractivePrompt,
};

/// A manifest older than this is probably missing new collection items.
const STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() {
    let args = Args::parse();
    match run(args).await {
        Ok(failed) if failed > 0 => process::exit(1),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<usize> {
    init_logging(args.verbose, args.quiet);

    let cache = ManifestCache::load(&args.manifest)?;
    if cache.is_stale(STALE_AFTER) {
        warn!(
            manifest = %cache.path().display(),
            "Manifest is more than a day old; consider refreshing it from the catalog"
        );
    }
    let items = cache.entries()?;
    if items.is_empty() {
        info!("Manifest contains no items, nothing to do");
        return Ok(0);
    }

    let muxer = FfmpegMuxer::detect(args.ffmpeg.as_deref()).await;
    let cancel = CancellationController::new();
    spawn_interrupt_handler(cancel.clone());

    let overwrite = OverwritePolicy::new(match args.on_existing {
        OnExisting::Prompt => OverwriteMode::Prompt,
        OnExisting::Skip => OverwriteMode::SkipAll,
        OnExisting::Overwrite => OverwriteMode::OverwriteAll,
    });

    let config = DownloaderConfig {
        connect_timeout: Duration::from_secs(args.timeout),
        read_timeout: Duration::from_secs(args.timeout),
        retry: RetryPolicy {
            max_retries: args.retries,
            ..RetryPolicy::default()
        },
        merge_retries: args.merge_retries,
        ..DownloaderConfig::default()
    }
    .with_output_dir(&args.out_dir)
    .with_concurrency(args.concurrency);

    let scheduler = Scheduler::new(
        config,
        cancel.clone(),
        overwrite.clone(),
        muxer.map(|m| Arc::new(m) as Arc<dyn favgrab_engine::Muxer>),
    )?
    .with_prompt(Arc::new(InteractivePrompt::new(cancel.clone())))
    .with_progress(Arc::new(ConsoleProgress::new()));

    if !scheduler.mux_available() {
        warn!("ffmpeg not found: items needing an audio merge will be rejected");
    }

    info!(
        items = items.len(),
        out_dir = %args.out_dir.display(),
        concurrency = args.concurrency,
        "Starting batch"
    );

    let summary = scheduler.run(items).await?;
    output::print_summary(&summary);

    Ok(summary.failed())
}

/// First Ctrl-C cancels cooperatively; a second one escalates to a hard
/// stop that aborts in-flight transfers.
fn spawn_interrupt_handler(cancel: CancellationController) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nInterrupt received: finishing in-flight work, Ctrl-C again to abort");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nAborting");
            cancel.escalate();
        }
    });
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
