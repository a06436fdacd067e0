//! Ctrl-C forwarding between the REPL driver and an in-flight turn.
//!
//! The signal handler only ever talks to an [`InterruptHandle`]. While a turn
//! is streaming, the turn registers a cancellation token with the handle and
//! an interrupt cancels that token. While idle, the handle reports
//! [`InterruptOutcome::Idle`] and the driver decides to exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

/// What an interrupt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// The in-flight turn's token was cancelled.
    Cancelled,
    /// An evaluation is running but has not registered a token yet; the token
    /// will be cancelled as soon as it is registered.
    Deferred,
    /// Nothing is being evaluated.
    Idle,
}

/// Shared interrupt state.
#[derive(Debug, Default)]
pub struct InterruptHandle {
    evaluating: AtomicBool,
    pending: AtomicBool,
    active: Mutex<Option<CancellationToken>>,
}

impl InterruptHandle {
    /// Creates a new handle ready to be shared with a signal handler.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Marks an evaluation as in progress until the guard is dropped.
    pub fn begin_evaluation(self: &Arc<Self>) -> EvaluationGuard {
        self.pending.store(false, Ordering::SeqCst);
        self.evaluating.store(true, Ordering::SeqCst);
        EvaluationGuard {
            handle: Arc::clone(self),
        }
    }

    /// True while an [`EvaluationGuard`] is alive.
    pub fn is_evaluating(&self) -> bool {
        self.evaluating.load(Ordering::SeqCst)
    }

    /// Registers a fresh cancellation token for the current turn.
    ///
    /// The token is deregistered when the returned [`TurnCancellation`] is
    /// dropped. An interrupt that arrived before registration cancels the new
    /// token immediately.
    pub fn register(self: &Arc<Self>) -> TurnCancellation {
        let token = CancellationToken::new();
        let mut active = self.lock_active();
        if self.pending.swap(false, Ordering::SeqCst) {
            token.cancel();
        }
        *active = Some(token.clone());
        TurnCancellation {
            handle: Arc::clone(self),
            token,
        }
    }

    /// Delivers an interrupt.
    pub fn interrupt(&self) -> InterruptOutcome {
        let active = self.lock_active();
        if let Some(token) = active.as_ref() {
            token.cancel();
            InterruptOutcome::Cancelled
        } else if self.is_evaluating() {
            self.pending.store(true, Ordering::SeqCst);
            InterruptOutcome::Deferred
        } else {
            InterruptOutcome::Idle
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps the handle in the evaluating state.
#[derive(Debug)]
pub struct EvaluationGuard {
    handle: Arc<InterruptHandle>,
}

impl Drop for EvaluationGuard {
    fn drop(&mut self) {
        self.handle.evaluating.store(false, Ordering::SeqCst);
        self.handle.pending.store(false, Ordering::SeqCst);
    }
}

/// A registered cancellation token for one turn.
#[derive(Debug)]
pub struct TurnCancellation {
    handle: Arc<InterruptHandle>,
    token: CancellationToken,
}

impl TurnCancellation {
    /// The token an interrupt cancels.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once the turn has been interrupted.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TurnCancellation {
    fn drop(&mut self) {
        let mut active = self.handle.lock_active();
        *active = None;
    }
}
