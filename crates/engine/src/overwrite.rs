//! Overwrite policy: decides per target path whether to proceed or skip.
//!
//! The decision function is pure; the side-effecting prompt (if any)
//! lives with the caller, which may escalate a single answer to an
//! apply-to-all policy for the rest of the batch.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

/// Current process-wide overwrite stance, mutated only by an explicit
/// user/caller choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteMode {
    /// No standing decision; the caller must ask (interactive) or treat
    /// as skip (non-interactive).
    Prompt,
    /// Skip this one existing target, then revert to `Prompt`.
    Skip,
    /// Overwrite this one existing target, then revert to `Prompt`.
    Overwrite,
    /// Skip every remaining existing target without asking.
    SkipAll,
    /// Overwrite every remaining existing target without asking.
    OverwriteAll,
}

/// Outcome of a decision for one target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed to create or replace the target.
    Proceed,
    /// Leave the existing target alone; no download should start.
    Skip,
    /// The target exists and no standing policy covers it; the caller
    /// must obtain a decision and update the mode.
    NeedsPrompt,
}

/// Pure decision: target existence + current mode in, decision out.
/// No I/O happens here.
pub fn decide(exists: bool, mode: OverwriteMode) -> Decision {
    if !exists {
        return Decision::Proceed;
    }
    match mode {
        OverwriteMode::Prompt => Decision::NeedsPrompt,
        OverwriteMode::Skip | OverwriteMode::SkipAll => Decision::Skip,
        OverwriteMode::Overwrite | OverwriteMode::OverwriteAll => Decision::Proceed,
    }
}

/// Shared handle to the batch-wide overwrite mode.
///
/// Cloning shares the same underlying state; tests inject independent
/// instances per run.
#[derive(Debug, Clone)]
pub struct OverwritePolicy {
    mode: Arc<Mutex<OverwriteMode>>,
}

impl OverwritePolicy {
    pub fn new(mode: OverwriteMode) -> Self {
        Self {
            mode: Arc::new(Mutex::new(mode)),
        }
    }

    pub fn mode(&self) -> OverwriteMode {
        *self.mode.lock()
    }

    /// Record an explicit caller decision. Escalation to the `*All`
    /// variants happens here, never inside `decide`.
    pub fn set_mode(&self, mode: OverwriteMode) {
        *self.mode.lock() = mode;
    }

    /// Decide for a target path, consuming a single-shot `Skip` or
    /// `Overwrite` answer when the target exists.
    pub fn decide_for(&self, target: &Path) -> Decision {
        let exists = target.exists();
        let mut mode = self.mode.lock();
        let decision = decide(exists, *mode);
        if exists {
            // Single-shot answers apply to exactly one path.
            match *mode {
                OverwriteMode::Skip | OverwriteMode::Overwrite => *mode = OverwriteMode::Prompt,
                _ => {}
            }
        }
        decision
    }
}

impl Default for OverwritePolicy {
    fn default() -> Self {
        Self::new(OverwriteMode::Prompt)
    }
}
