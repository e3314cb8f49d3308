//! Cooperative cancellation shared by every suspension point in the
//! pipeline.
//!
//! The controller tracks `running -> cancelling -> stopped` over a soft
//! token plus a hard-abort child token. The first interrupt flips the
//! soft token; escalating to the hard token is a caller policy choice,
//! surfaced but never taken by the controller itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Cancelling,
    Stopped,
}

const RUNNING: u8 = 0;
const CANCELLING: u8 = 1;
const STOPPED: u8 = 2;

#[derive(Debug, Clone)]
pub struct CancellationController {
    state: Arc<AtomicU8>,
    soft: CancellationToken,
    hard: CancellationToken,
}

impl CancellationController {
    pub fn new() -> Self {
        let soft = CancellationToken::new();
        // Hard is a child: a hard abort implies soft cancellation too.
        let hard = soft.child_token();
        Self {
            state: Arc::new(AtomicU8::new(RUNNING)),
            soft,
            hard,
        }
    }

    pub fn state(&self) -> RunState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => RunState::Running,
            CANCELLING => RunState::Cancelling,
            _ => RunState::Stopped,
        }
    }

    /// First interrupt: stop scheduling new work, let in-flight work
    /// reach its cancellation point. Idempotent.
    pub fn cancel(&self) {
        let _ = self.state.compare_exchange(
            RUNNING,
            CANCELLING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.soft.cancel();
    }

    /// Escalate to an immediate hard stop that aborts in-flight
    /// transfers without cleanup. No-op unless already cancelling.
    pub fn escalate(&self) {
        if self.state.load(Ordering::Acquire) != RUNNING {
            self.hard.cancel();
        }
    }

    /// Called once the scheduler confirms no transfer remains active and
    /// the merge worker has exited its loop.
    pub fn confirm_stopped(&self) {
        self.state.store(STOPPED, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.soft.is_cancelled()
    }

    pub fn is_hard_cancelled(&self) -> bool {
        self.hard.is_cancelled()
    }

    /// Token observed at every suspension point.
    pub fn token(&self) -> &CancellationToken {
        &self.soft
    }

    /// Token that aborts mid-transfer; only the hard escalation trips it.
    pub fn hard_token(&self) -> &CancellationToken {
        &self.hard
    }
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let ctrl = CancellationController::new();
        assert_eq!(ctrl.state(), RunState::Running);
        assert!(!ctrl.is_cancelled());
        assert!(!ctrl.is_hard_cancelled());
    }

    #[test]
    fn first_interrupt_moves_to_cancelling() {
        let ctrl = CancellationController::new();
        ctrl.cancel();
        assert_eq!(ctrl.state(), RunState::Cancelling);
        assert!(ctrl.is_cancelled());
        assert!(!ctrl.is_hard_cancelled());

        // Idempotent.
        ctrl.cancel();
        assert_eq!(ctrl.state(), RunState::Cancelling);
    }

    #[test]
    fn escalation_requires_prior_cancel() {
        let ctrl = CancellationController::new();
        ctrl.escalate();
        assert!(!ctrl.is_hard_cancelled());

        ctrl.cancel();
        ctrl.escalate();
        assert!(ctrl.is_hard_cancelled());
    }

    #[test]
    fn hard_abort_implies_soft_cancellation() {
        let ctrl = CancellationController::new();
        ctrl.cancel();
        ctrl.escalate();
        assert!(ctrl.token().is_cancelled());
        assert!(ctrl.hard_token().is_cancelled());
    }

    #[test]
    fn confirm_stopped_is_terminal() {
        let ctrl = CancellationController::new();
        ctrl.cancel();
        ctrl.confirm_stopped();
        assert_eq!(ctrl.state(), RunState::Stopped);
    }

    #[test]
    fn clones_share_state() {
        let ctrl = CancellationController::new();
        let other = ctrl.clone();
        ctrl.cancel();
        assert!(other.is_cancelled());
        assert_eq!(other.state(), RunState::Cancelling);
    }
}
