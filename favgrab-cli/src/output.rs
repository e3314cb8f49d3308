//! Progress rendering and the end-of-run summary.

use std::collections::HashMap;

use favgrab_engine::{BatchSummary, ItemOutcome, ProgressObserver, TrackKind};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;

pub struct ConsoleProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<(String, TrackKind), ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn style(total: Option<u64>) -> ProgressStyle {
        let template = if total.is_some() {
            "{msg:30!} [{bar:25}] {bytes}/{total_bytes} {bytes_per_sec}"
        } else {
            "{msg:30!} {bytes} {bytes_per_sec}"
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleProgress {
    fn on_start(&self, item_id: &str, kind: TrackKind, bytes_done: u64, total: Option<u64>) {
        let bar = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::no_length(),
        };
        bar.set_style(Self::style(total));
        bar.set_message(format!("{item_id} [{kind}]"));
        bar.set_position(bytes_done);
        let bar = self.multi.add(bar);
        self.bars
            .lock()
            .insert((item_id.to_string(), kind), bar);
    }

    fn on_progress(&self, item_id: &str, kind: TrackKind, bytes_done: u64, _total: Option<u64>) {
        if let Some(bar) = self.bars.lock().get(&(item_id.to_string(), kind)) {
            bar.set_position(bytes_done);
        }
    }

    fn on_finish(&self, item_id: &str, kind: TrackKind) {
        if let Some(bar) = self.bars.lock().remove(&(item_id.to_string(), kind)) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }
}

/// Print the per-item and aggregate results of a batch run.
pub fn print_summary(summary: &BatchSummary) {
    println!();
    for (item_id, outcome) in &summary.outcomes {
        match outcome {
            ItemOutcome::Failed(reason) => println!("  {item_id}: failed - {reason}"),
            other => println!("  {item_id}: {}", other.label()),
        }
    }

    println!(
        "\n{} downloaded, {} skipped, {} partial (no audio), {} failed, {} cancelled",
        summary.downloaded(),
        summary.skipped(),
        summary.partial(),
        summary.failed(),
        summary.cancelled(),
    );
    if summary.merges_pending > 0 {
        println!(
            "{} merge(s) still pending; temp files were kept and will be picked up by the next run",
            summary.merges_pending
        );
    }
}
