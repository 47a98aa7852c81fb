use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing analysis activity.
#[derive(Default)]
pub struct AnalysisMetrics {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    duplicate_starts: AtomicU64,
    chunk_calls_succeeded: AtomicU64,
    chunk_calls_failed: AtomicU64,
}

impl AnalysisMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a background run was spawned.
    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run that persisted a completed analysis.
    pub fn record_run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run that ended in the failed state.
    pub fn record_run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a start request suppressed because a run was already active.
    pub fn record_duplicate_start(&self) {
        self.duplicate_starts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a single first-stage chunk request.
    pub fn record_chunk_call(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.chunk_calls_succeeded
        } else {
            &self.chunk_calls_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            duplicate_starts: self.duplicate_starts.load(Ordering::Relaxed),
            chunk_calls_succeeded: self.chunk_calls_succeeded.load(Ordering::Relaxed),
            chunk_calls_failed: self.chunk_calls_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of analysis counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Background runs spawned since startup.
    pub runs_started: u64,
    /// Runs that ended with a completed analysis.
    pub runs_completed: u64,
    /// Runs that ended in the failed state.
    pub runs_failed: u64,
    /// Start requests that found a run already in progress.
    pub duplicate_starts: u64,
    /// First-stage chunk requests that returned a response.
    pub chunk_calls_succeeded: u64,
    /// First-stage chunk requests that errored or timed out.
    pub chunk_calls_failed: u64,
}
