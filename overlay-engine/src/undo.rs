use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::Result;

pub trait Clock {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(start)) }
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub message: String,
    pub tone: Tone,
    pub expires_at: u64,
}

type Action = Box<dyn FnOnce() -> Result<()>>;

struct PendingUndo {
    reverse: Action,
    finalize: Action,
    deadline: u64,
}

fn run_finalizer(finalize: Action) {
    if let Err(e) = finalize() {
        warn!(error = %e, "finalizer failed");
    }
}

impl PendingUndo {
    fn finalize(self) {
        run_finalizer(self.finalize);
    }
}

/// One toast at a time, at most one undoable action behind it.
///
/// An armed action is either reversed by `undo` before its deadline or
/// finalized: by `tick` once the deadline passes, or immediately when a
/// newer toast takes its place.
pub struct UndoCoordinator<C> {
    clock: C,
    toast: Option<Toast>,
    pending: Option<PendingUndo>,
}

impl<C: Clock> UndoCoordinator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, toast: None, pending: None }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn replace(&mut self, toast: Toast) {
        if let Some(previous) = self.pending.take() {
            debug!("pending undo superseded, finalizing");
            previous.finalize();
        }
        self.toast = Some(toast);
    }

    /// Shows an undoable toast for `window_ms`.
    pub fn arm<R, F>(&mut self, message: impl Into<String>, window_ms: u64, reverse: R, finalize: F)
    where
        R: FnOnce() -> Result<()> + 'static,
        F: FnOnce() -> Result<()> + 'static,
    {
        let deadline = self.clock.now_millis() + window_ms;
        self.replace(Toast { message: message.into(), tone: Tone::Info, expires_at: deadline });
        self.pending = Some(PendingUndo { reverse: Box::new(reverse), finalize: Box::new(finalize), deadline });
    }

    pub fn notify(&mut self, message: impl Into<String>, tone: Tone, window_ms: u64) {
        let expires_at = self.clock.now_millis() + window_ms;
        self.replace(Toast { message: message.into(), tone, expires_at });
    }

    /// Runs the pending reversal if its window is still open. A successful
    /// reversal drops the finalizer; a failed one leaves the action in
    /// effect, so the finalizer runs before the error is returned.
    pub fn undo(&mut self) -> Result<bool> {
        let now = self.clock.now_millis();
        match self.pending.take() {
            Some(pending) if now < pending.deadline => {
                self.toast = None;
                let PendingUndo { reverse, finalize, .. } = pending;
                if let Err(e) = reverse() {
                    warn!(error = %e, "undo failed, finalizing instead");
                    run_finalizer(finalize);
                    return Err(e);
                }
                Ok(true)
            }
            Some(pending) => {
                pending.finalize();
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Expires the toast and finalizes an undo whose window has closed.
    pub fn tick(&mut self) {
        let now = self.clock.now_millis();
        if self.pending.as_ref().is_some_and(|p| now >= p.deadline) {
            if let Some(pending) = self.pending.take() {
                pending.finalize();
            }
        }
        if self.toast.as_ref().is_some_and(|t| now >= t.expires_at) {
            self.toast = None;
        }
    }

    pub fn current_toast(&self) -> Option<&Toast> {
        let now = self.clock.now_millis();
        self.toast.as_ref().filter(|t| now < t.expires_at)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<C> fmt::Debug for UndoCoordinator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoCoordinator")
            .field("toast", &self.toast)
            .field("pending", &self.pending.as_ref().map(|p| p.deadline))
            .finish()
    }
}
