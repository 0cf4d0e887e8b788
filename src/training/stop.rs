//! Cooperative stop flag for long training runs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag asking the trainer to stop after the current episode
///
/// Clones share the same flag, so one handle can live in a signal handler
/// while the trainer polls another.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask training to stop. Safe to call from any thread.
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the next `train` call runs
    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let signal = StopSignal::new();
        let handle = signal.clone();
        assert!(!signal.should_stop());

        handle.request_stop();
        assert!(signal.should_stop());

        signal.reset();
        assert!(!handle.should_stop());
    }

    #[test]
    fn test_request_from_other_thread() {
        let signal = StopSignal::new();
        let handle = signal.clone();
        std::thread::spawn(move || handle.request_stop())
            .join()
            .unwrap();
        assert!(signal.should_stop());
    }
}
