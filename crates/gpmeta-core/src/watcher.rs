//! Completion detection for downloads written by another process.
//!
//! The transfer engine writes into `<target>.crdownload` and renames it
//! away when done, but the final size may settle before or after the
//! rename. A download counts as finished only once the target exists, the
//! marker is gone, and the size has held still for the stability window.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::cancel::CancellationToken;

/// Suffix of the sibling file that marks an in-flight transfer.
pub const PARTIAL_SUFFIX: &str = ".crdownload";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// `<target>.crdownload`
pub fn partial_marker(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// True when `target` exists and no partial marker sits next to it.
pub fn is_present_and_complete(target: &Path) -> bool {
    target.is_file() && !partial_marker(target).exists()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Complete,
    TimedOut,
    Cancelled,
}

impl TransferStatus {
    pub fn is_complete(self) -> bool {
        self == TransferStatus::Complete
    }
}

/// The transient state of one download being watched.
#[derive(Debug)]
pub struct PendingDownload {
    pub target: PathBuf,
    pub marker: PathBuf,
    pub observed_size: Option<u64>,
    pub last_changed: Instant,
}

impl PendingDownload {
    pub fn new(target: PathBuf, marker: PathBuf) -> Self {
        Self {
            target,
            marker,
            observed_size: None,
            last_changed: Instant::now(),
        }
    }

    /// Take one observation. Returns how long the file has been stable,
    /// or `None` if it is not a candidate right now (clock reset).
    fn observe(&mut self, now: Instant) -> Option<Duration> {
        let size = if self.marker.exists() {
            None
        } else {
            fs::metadata(&self.target)
                .ok()
                .filter(|m| m.is_file())
                .map(|m| m.len())
        };

        match size {
            Some(size) if self.observed_size == Some(size) => {
                Some(now.duration_since(self.last_changed))
            }
            Some(size) => {
                trace!(path = %self.target.display(), size, "download size changed");
                self.observed_size = Some(size);
                self.last_changed = now;
                None
            }
            None => {
                self.observed_size = None;
                self.last_changed = now;
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StabilityWatcher {
    pub stability_window: Duration,
    pub poll_interval: Duration,
}

impl StabilityWatcher {
    pub fn new(stability_window: Duration) -> Self {
        Self {
            stability_window,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Block until `target` is fully transferred.
    ///
    /// With `timeout == None` this waits indefinitely; only `cancel` can
    /// end it early.
    pub fn await_completion(
        &self,
        target: &Path,
        marker: &Path,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> TransferStatus {
        let start = Instant::now();
        let mut pending = PendingDownload::new(target.to_path_buf(), marker.to_path_buf());

        loop {
            if let Some(stable_for) = pending.observe(Instant::now()) {
                if stable_for >= self.stability_window {
                    debug!(
                        path = %target.display(),
                        size = ?pending.observed_size,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "download stable"
                    );
                    return TransferStatus::Complete;
                }
            }

            if let Some(limit) = timeout {
                if start.elapsed() > limit {
                    return TransferStatus::TimedOut;
                }
            }
            if cancel.is_some_and(|t| t.check().is_err()) {
                return TransferStatus::Cancelled;
            }

            std::thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    fn fast(window_ms: u64) -> StabilityWatcher {
        StabilityWatcher::new(Duration::from_millis(window_ms))
            .with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn marker_is_sibling_with_suffix() {
        let marker = partial_marker(Path::new("/d/VID 1.mp4"));
        assert_eq!(marker, PathBuf::from("/d/VID 1.mp4.crdownload"));
    }

    #[test]
    fn stable_file_completes_after_window() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a.mp4");
        fs::write(&target, b"payload").unwrap();

        let start = Instant::now();
        let status = fast(60).await_completion(&target, &partial_marker(&target), None, None);
        assert_eq!(status, TransferStatus::Complete);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn present_marker_never_completes() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a.mp4");
        fs::write(&target, b"payload").unwrap();
        fs::write(partial_marker(&target), b"").unwrap();

        let status = fast(10).await_completion(
            &target,
            &partial_marker(&target),
            Some(Duration::from_millis(120)),
            None,
        );
        assert_eq!(status, TransferStatus::TimedOut);
        assert!(!is_present_and_complete(&target));
    }

    #[test]
    fn missing_target_times_out() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("never.mp4");
        let status = fast(10).await_completion(
            &target,
            &partial_marker(&target),
            Some(Duration::from_millis(50)),
            None,
        );
        assert_eq!(status, TransferStatus::TimedOut);
    }

    #[test]
    fn size_change_resets_clock() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("growing.mp4");
        fs::write(&target, b"x").unwrap();

        let writer_target = target.clone();
        let writer = std::thread::spawn(move || {
            for _ in 0..5 {
                std::thread::sleep(Duration::from_millis(40));
                let mut f = OpenOptions::new().append(true).open(&writer_target).unwrap();
                f.write_all(b"y").unwrap();
            }
            Instant::now()
        });

        let status = fast(150).await_completion(&target, &partial_marker(&target), None, None);
        let last_write = writer.join().unwrap();
        assert_eq!(status, TransferStatus::Complete);
        assert!(last_write.elapsed() >= Duration::from_millis(140));
        assert_eq!(fs::metadata(&target).unwrap().len(), 6);
    }

    #[test]
    fn marker_removal_restarts_window() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("renamed.mp4");
        let marker = partial_marker(&target);
        fs::write(&target, b"done").unwrap();
        fs::write(&marker, b"").unwrap();

        let remover_marker = marker.clone();
        let remover = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(80));
            fs::remove_file(&remover_marker).unwrap();
            Instant::now()
        });

        let status = fast(60).await_completion(&target, &marker, None, None);
        let removed_at = remover.join().unwrap();
        assert_eq!(status, TransferStatus::Complete);
        assert!(removed_at.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn marker_appearing_mid_window_restarts_it() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a.mp4");
        let marker = partial_marker(&target);
        fs::write(&target, b"done").unwrap();

        let flapping_marker = marker.clone();
        let browser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            fs::write(&flapping_marker, b"").unwrap();
            std::thread::sleep(Duration::from_millis(60));
            fs::remove_file(&flapping_marker).unwrap();
            Instant::now()
        });

        let status = fast(150).await_completion(&target, &marker, None, None);
        let removed_at = browser.join().unwrap();
        assert_eq!(status, TransferStatus::Complete);
        assert!(removed_at.elapsed() >= Duration::from_millis(140));
    }

    #[test]
    fn cancellation_ends_unbounded_wait() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("never.mp4");
        let token = CancellationToken::new();
        token.cancel();

        let status = fast(10).await_completion(&target, &partial_marker(&target), None, Some(&token));
        assert_eq!(status, TransferStatus::Cancelled);
    }
}
