//! # Fibonacci Backoff
//!
//! Retry intervals for failed reconciliations.
//!
//! Sequence in units of `min_secs`: 1, 1, 2, 3, 5, 8, ... capped at `max_secs`.

/// Fibonacci backoff state for a single resource
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    max_secs: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
            previous: 0,
            current: 1,
        }
    }

    /// Next interval in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let seconds = self.current.saturating_mul(self.min_secs).min(self.max_secs);
        let next = self.previous.saturating_add(self.current);
        self.previous = self.current;
        self.current = next;
        seconds
    }

    pub fn reset(&mut self) {
        self.previous = 0;
        self.current = 1;
    }
}

/// Per-resource error tracking
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.backoff.reset();
        self.error_count = 0;
    }
}
