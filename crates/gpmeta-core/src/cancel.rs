use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CancelledError;

const PAUSE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Flags {
    cancelled: AtomicBool,
    paused: AtomicBool,
}

/// Shared cancel/pause switch. Clones observe the same state, so one copy
/// can live in a signal handler while the run polls another.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flags: Arc<Flags>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.flags.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    /// Blocks while paused. `Err` once cancellation has been requested.
    pub fn check(&self) -> Result<(), CancelledError> {
        loop {
            if self.is_cancelled() {
                return Err(CancelledError);
            }
            if !self.is_paused() {
                return Ok(());
            }
            std::thread::sleep(PAUSE_POLL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        assert!(token.is_cancelled());
        assert!(token.check().is_err());
    }

    #[test]
    fn check_waits_out_a_pause() {
        let token = CancellationToken::new();
        token.set_paused(true);

        let resumer = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            resumer.set_paused(false);
        });

        let start = Instant::now();
        assert!(token.check().is_ok());
        assert!(start.elapsed() >= Duration::from_millis(100));
        handle.join().unwrap();
    }

    #[test]
    fn cancel_breaks_a_pause() {
        let token = CancellationToken::new();
        token.set_paused(true);
        token.cancel();
        assert!(token.check().is_err());
    }
}
