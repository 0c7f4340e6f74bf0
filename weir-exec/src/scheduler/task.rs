//! Tasks and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of one task slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum TaskResult {
    /// The task ran to completion.
    Complete,
    /// The task yielded cooperatively and wants to be rescheduled.
    Yield,
    /// The task aborted (cancellation or downstream failure).
    Aborted,
}

/// A runnable unit produced by a step.
///
/// A task runs without preemption but must yield cooperatively when its
/// cancel handle fires or its slice budget is exhausted.
pub trait Task: Send {
    /// Runs one slice.
    fn run(&mut self) -> TaskResult;

    /// Scheduling weight; jobs below the configured lightweight level run
    /// inline on the submitting thread when the hybrid scheduler is on.
    fn job_level(&self) -> u32 {
        10
    }

    /// Preferred worker for affinity routing.
    fn preferred_worker(&self) -> Option<usize> {
        None
    }
}

/// Requester-side handle that triggers cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancellationSource {
    flag: Arc<AtomicBool>,
}

impl CancellationSource {
    /// Creates an untriggered source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every task holding a handle.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// A handle for tasks to poll.
    pub fn handle(&self) -> CancelHandle {
        CancelHandle { flag: Arc::clone(&self.flag) }
    }

    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Task-side cancellation probe; polled at least once per task slice.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_propagates_to_handles() {
        let source = CancellationSource::new();
        let handle = source.handle();
        assert!(!handle.is_cancelled());
        source.cancel();
        assert!(handle.is_cancelled());
        assert!(source.is_cancelled());
    }
}
