//! Crawl cursor persisted between runs so `--resume` can pick up where an
//! interrupted crawl stopped.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::CrawlOptions;

/// Bump when the file layout changes; older files are then ignored.
const CHECKPOINT_VERSION: u32 = 1;

/// Stored next to the ledger
pub const CHECKPOINT_FILENAME: &str = ".gpmeta-cursor.json";

/// The crawl's only mutable state: where to go next and how far we got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub link: String,
    pub item_no: u64,
}

impl Cursor {
    pub fn start(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            item_no: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    /// Identifies the crawl (start link + ledger) this cursor belongs to
    pub start_hash: String,
    pub cursor: Cursor,
    pub completed: bool,
}

impl Checkpoint {
    pub fn new(options: &CrawlOptions) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            timestamp: Utc::now(),
            start_hash: start_hash(options),
            cursor: Cursor::start(&options.start_link),
            completed: false,
        }
    }

    pub fn path_for(ledger_path: &Path) -> PathBuf {
        ledger_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(CHECKPOINT_FILENAME)
    }

    /// `Ok(None)` when no checkpoint has been written.
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Written to a sibling temp file and renamed into place, so a reader
    /// never sees a half-written cursor.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn delete(path: &Path) -> anyhow::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// True when this unfinished cursor was written by a crawl with the
    /// same start link and ledger.
    pub fn is_compatible(&self, options: &CrawlOptions) -> bool {
        self.version == CHECKPOINT_VERSION && !self.completed && self.start_hash == start_hash(options)
    }

    pub fn advance(&mut self, cursor: &Cursor) {
        self.cursor = cursor.clone();
        self.timestamp = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
        self.timestamp = Utc::now();
    }
}

fn start_hash(options: &CrawlOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(options.start_link.as_bytes());
    hasher.update([0u8]);
    hasher.update(options.ledger_path.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_options(dir: &Path) -> CrawlOptions {
        CrawlOptions {
            start_link: "https://photos.example/photo/A".to_string(),
            ledger_path: dir.join("ledger.csv"),
            ..CrawlOptions::default()
        }
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let options = test_options(dir.path());
        let path = Checkpoint::path_for(&options.ledger_path);
        assert_eq!(path, dir.path().join(CHECKPOINT_FILENAME));

        let mut checkpoint = Checkpoint::new(&options);
        checkpoint.advance(&Cursor {
            link: "https://photos.example/photo/B".into(),
            item_no: 1,
        });
        checkpoint.save(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap().unwrap();
        assert_eq!(loaded.cursor.link, "https://photos.example/photo/B");
        assert_eq!(loaded.cursor.item_no, 1);
        assert!(loaded.is_compatible(&options));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn missing_file_is_none_and_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILENAME);
        assert!(Checkpoint::load(&path).unwrap().is_none());
        Checkpoint::delete(&path).unwrap();
    }

    #[test]
    fn other_start_link_is_incompatible() {
        let dir = tempdir().unwrap();
        let opts1 = test_options(dir.path());
        let mut opts2 = test_options(dir.path());
        opts2.start_link = "https://photos.example/photo/Z".into();

        assert!(!Checkpoint::new(&opts1).is_compatible(&opts2));
    }

    #[test]
    fn completed_checkpoint_not_resumable() {
        let dir = tempdir().unwrap();
        let options = test_options(dir.path());
        let mut checkpoint = Checkpoint::new(&options);
        checkpoint.mark_completed();
        assert!(!checkpoint.is_compatible(&options));
    }
}
