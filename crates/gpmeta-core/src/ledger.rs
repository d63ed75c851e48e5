//! Append-only CSV ledger of committed items.
//!
//! The ledger doubles as the crawl's resume checkpoint: a link present in
//! the file is never committed again.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::item::{Item, LedgerRecord};

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

pub struct Ledger {
    path: PathBuf,
    file: File,
    seen: HashSet<String>,
}

impl Ledger {
    /// Open (or create) the ledger at `path` and index the links it holds.
    ///
    /// An empty store gets the header row before anything else. Bytes after
    /// the last newline can only come from an append that never returned,
    /// so they are cut off.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| LedgerError::io(&path, e))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| LedgerError::io(&path, e))?;

        let complete = bytes
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        if complete < bytes.len() {
            warn!(
                path = %path.display(),
                dropped = bytes.len() - complete,
                "discarding torn record at end of ledger"
            );
            file.set_len(complete as u64)
                .map_err(|e| LedgerError::io(&path, e))?;
            bytes.truncate(complete);
        }

        let mut ledger = Self {
            path,
            file,
            seen: HashSet::new(),
        };

        if bytes.is_empty() {
            ledger.write_header()?;
        } else {
            ledger.index(&bytes)?;
        }
        info!(path = %ledger.path.display(), records = ledger.seen.len(), "ledger opened");
        Ok(ledger)
    }

    fn index(&mut self, bytes: &[u8]) -> Result<(), LedgerError> {
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(body);
        for record in reader.deserialize::<LedgerRecord>() {
            let record = record?;
            self.seen.insert(record.link);
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), LedgerError> {
        let mut writer = row_writer();
        writer.write_record(LedgerRecord::HEADER)?;
        self.append(writer)
    }

    /// Serialize fully in memory, then hand the bytes to the OS in one write
    /// and flush to disk before returning.
    fn append(&mut self, writer: csv::Writer<Vec<u8>>) -> Result<(), LedgerError> {
        let bytes = writer
            .into_inner()
            .map_err(|e| LedgerError::io(&self.path, e.into_error()))?;
        self.file
            .write_all(&bytes)
            .and_then(|()| self.file.sync_data())
            .map_err(|e| LedgerError::io(&self.path, e))
    }

    pub fn already_processed(&self, link: &str) -> bool {
        self.seen.contains(link)
    }

    /// Append `item`. Returns [`LedgerError::AlreadyCommitted`] without
    /// touching the file when the link is already recorded.
    pub fn commit(&mut self, item: &Item) -> Result<(), LedgerError> {
        if self.seen.contains(&item.link) {
            return Err(LedgerError::AlreadyCommitted(item.link.clone()));
        }

        let mut writer = row_writer();
        writer.serialize(LedgerRecord::from(item))?;
        self.append(writer)?;

        self.seen.insert(item.link.clone());
        debug!(link = %item.link, filename = %item.filename, "ledger record committed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn row_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}
