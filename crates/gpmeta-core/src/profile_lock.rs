//! Startup guard for browser profiles shared between runs.
//!
//! A running browser keeps a `SingletonLock` entry in its user-data
//! directory. Two crawls must not drive the same profile, so a crawl waits
//! briefly for the entry to clear before opening a session.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::LockError;

pub const LOCK_FILENAME: &str = "SingletonLock";
pub const DEFAULT_ATTEMPTS: u32 = 40;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(300);

/// Lock entry for `profile` inside `user_data_dir`, or for the user-data
/// directory itself when no profile is named.
pub fn lock_path(user_data_dir: &Path, profile: Option<&str>) -> PathBuf {
    match profile {
        Some(p) if !p.is_empty() => user_data_dir.join(p).join(LOCK_FILENAME),
        _ => user_data_dir.join(LOCK_FILENAME),
    }
}

fn lock_present(path: &Path) -> bool {
    // The lock is usually a dangling symlink, which `exists()` reports as absent.
    path.symlink_metadata().is_ok()
}

/// Poll until `lock` disappears, up to `attempts` checks spaced by
/// `interval`.
pub fn wait_for_unlock(lock: &Path, attempts: u32, interval: Duration) -> Result<(), LockError> {
    for attempt in 0..attempts {
        if !lock_present(lock) {
            if attempt > 0 {
                info!(path = %lock.display(), "profile lock released");
            }
            return Ok(());
        }
        debug!(path = %lock.display(), attempt, "profile lock held");
        std::thread::sleep(interval);
    }
    if lock_present(lock) {
        return Err(LockError::Held {
            path: lock.to_path_buf(),
            waited: interval * attempts,
        });
    }
    Ok(())
}
