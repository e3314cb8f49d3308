//! Interactive overwrite prompt.
//!
//! The engine's decision function is pure; this is the side-effecting
//! half that asks the user and may widen a single answer to the whole
//! batch.

use std::io::Write;
use std::path::Path;

use favgrab_engine::{
    CancellationController, Decision, OverwriteMode, OverwritePolicy, OverwritePrompt,
};
use parking_lot::Mutex;

pub struct InteractivePrompt {
    /// Serializes prompts from concurrently settling items.
    lock: Mutex<()>,
    cancel: CancellationController,
}

impl InteractivePrompt {
    pub fn new(cancel: CancellationController) -> Self {
        Self {
            lock: Mutex::new(()),
            cancel,
        }
    }

    fn ask(&self, target: &Path, title: &str) -> String {
        println!("\nFile already exists: {title}");
        println!("  {}", target.display());
        print!("[s]kip, [o]verwrite, [a]ll overwrite, [sa] skip all, [c]ancel (default s): ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return "s".to_string();
        }
        let answer = line.trim().to_lowercase();
        if answer.is_empty() {
            "s".to_string()
        } else {
            answer
        }
    }
}

impl OverwritePrompt for InteractivePrompt {
    fn resolve(&self, policy: &OverwritePolicy, target: &Path, title: &str) -> Decision {
        let _guard = self.lock.lock();

        // A batch-wide answer may have landed while we waited our turn.
        match policy.mode() {
            OverwriteMode::SkipAll => return Decision::Skip,
            OverwriteMode::OverwriteAll => return Decision::Proceed,
            _ => {}
        }
        if self.cancel.is_cancelled() {
            return Decision::Skip;
        }

        match self.ask(target, title).as_str() {
            "o" => Decision::Proceed,
            "a" => {
                policy.set_mode(OverwriteMode::OverwriteAll);
                Decision::Proceed
            }
            "sa" => {
                policy.set_mode(OverwriteMode::SkipAll);
                Decision::Skip
            }
            "c" => {
                self.cancel.cancel();
                Decision::Skip
            }
            // "s" and anything unrecognized skip this one file.
            _ => Decision::Skip,
        }
    }
}
