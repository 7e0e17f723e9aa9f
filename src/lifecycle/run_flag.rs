//! Shared "running" flag observed by every long-lived loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Cloneable handle to the process-wide running flag.
///
/// Loops check it at the start of each cycle; nothing is forcibly
/// interrupted when it is cleared.
#[derive(Debug, Clone)]
pub struct RunFlag {
    running: Arc<AtomicBool>,
}

impl RunFlag {
    /// Create a flag in the running state
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the flag. Returns true if this call performed the transition.
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    /// Sleep for up to `total`, waking early once the flag is cleared.
    ///
    /// Returns false if the flag was cleared during the wait.
    pub fn sleep(&self, total: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(100);

        let deadline = Instant::now() + total;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLICE.min(deadline - now));
        }
        false
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}
