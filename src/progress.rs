use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Cooperative progress reporting and cancellation.
///
/// Strainers report at seed granularity and poll [`ProgressSink::is_cancelled`]
/// between seeds, never inside a recursive descent.
pub trait ProgressSink: Sync {
    fn set_total(&self, total: usize);
    fn set_current(&self, current: usize);
    fn is_cancelled(&self) -> bool;
}

/// Ignores progress and never cancels
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_total(&self, _total: usize) {}
    fn set_current(&self, _current: usize) {}
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Thread-safe sink a host can poll from another thread and cancel.
#[derive(Default)]
pub struct AtomicProgress {
    total: AtomicUsize,
    current: AtomicUsize,
    cancelled: AtomicBool,
}

impl AtomicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

impl ProgressSink for AtomicProgress {
    fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    fn set_current(&self, current: usize) {
        self.current.store(current, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Forwards only cancellation, for sub-problems that run side by side and
/// would otherwise fight over the host's counters.
pub(crate) struct CancelOnly<'a>(pub &'a dyn ProgressSink);

impl ProgressSink for CancelOnly<'_> {
    fn set_total(&self, _total: usize) {}
    fn set_current(&self, _current: usize) {}
    fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}
