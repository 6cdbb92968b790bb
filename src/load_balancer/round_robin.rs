//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin position of one backend.
///
/// Lives on the runtime backend so the rotation continues across reloads.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next candidate out of `len`. `len` must be non-zero.
    pub fn next_index(&self, len: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % len
    }
}
