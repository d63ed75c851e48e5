//! Per-item crawl state machine.
//!
//! ```text
//! NavigateToItem(link)
//!   -> LocateDownloadControl
//!   -> AwaitDownload        (skipped: disabled, or file already complete)
//!   -> ExtractAndCommit     (skipped: link in ledger, or no completed download)
//!   -> LocateNextControl
//!   -> NavigateToItem(next) | Terminal
//! ```
//!
//! A page that fails to load ends the whole crawl: without the page there
//! is no next link to follow.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::checkpoint::{Checkpoint, Cursor};
use crate::error::{CancelledError, LedgerError};
use crate::extract;
use crate::ledger::Ledger;
use crate::navigator::{Navigator, SessionFactory, DOWNLOAD_LABEL};
use crate::watcher::{is_present_and_complete, partial_marker, StabilityWatcher, TransferStatus};
use crate::{CrawlOptions, ThrottledProgress};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub items_visited: u64,
    pub items_committed: u64,
    /// Items whose link was already in the ledger
    pub already_committed: u64,
    pub downloads_completed: u64,
    /// Downloads that timed out, failed to start, or had no control
    pub downloads_failed: u64,
    /// The crawl ended because an item page never loaded
    pub stopped_on_navigation_error: bool,
}

/// How the download step of one item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Disabled,
    AlreadyPresent,
    Completed,
    NoControl,
    NoFilename,
    TriggerFailed,
    TimedOut,
    Cancelled,
}

impl DownloadOutcome {
    /// Metadata is only worth keeping for items whose media we have.
    pub fn allows_commit(self) -> bool {
        matches!(
            self,
            DownloadOutcome::Disabled | DownloadOutcome::AlreadyPresent | DownloadOutcome::Completed
        )
    }
}

enum Step {
    Next(String),
    Terminal,
    Interrupted,
}

pub struct Crawler<'a, F: SessionFactory> {
    options: &'a CrawlOptions,
    ledger: Ledger,
    sessions: &'a mut F,
    watcher: StabilityWatcher,
    cancel: Option<CancellationToken>,
    report: CrawlReport,
}

impl<'a, F: SessionFactory> Crawler<'a, F> {
    pub fn new(
        options: &'a CrawlOptions,
        ledger: Ledger,
        sessions: &'a mut F,
        cancel: Option<CancellationToken>,
    ) -> Self {
        let watcher = StabilityWatcher::new(options.stability_window)
            .with_poll_interval(options.poll_interval);
        Self {
            options,
            ledger,
            sessions,
            watcher,
            cancel,
            report: CrawlReport::default(),
        }
    }

    pub fn run(mut self, resume: bool, progress: &ThrottledProgress) -> anyhow::Result<CrawlReport> {
        if self.options.download_enabled {
            fs::create_dir_all(&self.options.download_dir)?;
        }

        let checkpoint_path = Checkpoint::path_for(&self.options.ledger_path);
        let mut checkpoint = self.load_checkpoint(resume, &checkpoint_path)?;
        let mut cursor = checkpoint.cursor.clone();

        loop {
            if self.is_cancelled() {
                save_checkpoint(&checkpoint, &checkpoint_path);
                return Err(CancelledError.into());
            }

            info!(item_no = cursor.item_no + 1, link = %cursor.link, "processing item");
            progress.report("crawl", cursor.item_no, 0, &cursor.link);

            match self.process_link(&cursor.link)? {
                Step::Next(next) => {
                    cursor.item_no += 1;
                    cursor.link = next;
                    checkpoint.advance(&cursor);
                    save_checkpoint(&checkpoint, &checkpoint_path);
                }
                Step::Terminal if self.report.stopped_on_navigation_error => {
                    // Keep the cursor on the failed link for a later --resume.
                    save_checkpoint(&checkpoint, &checkpoint_path);
                    break;
                }
                Step::Terminal => {
                    checkpoint.mark_completed();
                    if let Err(e) = Checkpoint::delete(&checkpoint_path) {
                        warn!(error = %e, "could not remove cursor checkpoint");
                    }
                    break;
                }
                Step::Interrupted => {
                    save_checkpoint(&checkpoint, &checkpoint_path);
                    return Err(CancelledError.into());
                }
            }
        }

        info!(
            visited = self.report.items_visited,
            committed = self.report.items_committed,
            already = self.report.already_committed,
            "crawl finished"
        );
        Ok(self.report)
    }

    fn load_checkpoint(&self, resume: bool, path: &Path) -> anyhow::Result<Checkpoint> {
        if resume {
            if let Some(existing) = Checkpoint::load(path)? {
                if existing.is_compatible(self.options) {
                    info!(
                        link = %existing.cursor.link,
                        item_no = existing.cursor.item_no,
                        "resuming from cursor checkpoint"
                    );
                    return Ok(existing);
                }
                info!("cursor checkpoint belongs to another crawl, starting fresh");
            }
        }
        Ok(Checkpoint::new(self.options))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.check().is_err())
    }

    /// One item, one navigator session.
    fn process_link(&mut self, link: &str) -> anyhow::Result<Step> {
        let mut nav = self.sessions.open_session()?;
        let step = self.drive(&mut nav, link);
        nav.close();
        step
    }

    fn drive(&mut self, nav: &mut F::Session, link: &str) -> anyhow::Result<Step> {
        if let Err(e) = nav.load_item(link, self.options.wait_timeout) {
            warn!(%link, error = %e, "failed to load item page; stopping crawl");
            self.report.stopped_on_navigation_error = true;
            return Ok(Step::Terminal);
        }
        self.report.items_visited += 1;

        let download = self.download(nav);
        if download == DownloadOutcome::Cancelled {
            return Ok(Step::Interrupted);
        }

        if download.allows_commit() {
            self.commit(nav, link)?;
        } else {
            warn!(%link, outcome = ?download, "skipping metadata because download did not complete");
        }

        Ok(match self.next_link(nav, link) {
            Some(next) => Step::Next(next),
            None => Step::Terminal,
        })
    }

    fn download(&mut self, nav: &mut F::Session) -> DownloadOutcome {
        if !self.options.download_enabled {
            return DownloadOutcome::Disabled;
        }

        let Some(control) = nav.find_labeled_control(DOWNLOAD_LABEL) else {
            warn!("no download control on page");
            self.report.downloads_failed += 1;
            return DownloadOutcome::NoControl;
        };

        let Some(filename) = extract::filename(&*nav) else {
            warn!("page has no filename; cannot watch for its download");
            self.report.downloads_failed += 1;
            return DownloadOutcome::NoFilename;
        };

        let target = self.options.download_dir.join(filename);
        if is_present_and_complete(&target) {
            info!(file = %target.display(), "file exists, skipping download");
            return DownloadOutcome::AlreadyPresent;
        }

        if let Err(e) = nav.trigger_download(&control) {
            warn!(error = %e, "download error");
            self.report.downloads_failed += 1;
            return DownloadOutcome::TriggerFailed;
        }
        info!(file = %target.display(), "download started");

        match self.watcher.await_completion(
            &target,
            &partial_marker(&target),
            self.options.download_timeout,
            self.cancel.as_ref(),
        ) {
            TransferStatus::Complete => {
                info!(file = %target.display(), "download finished");
                self.report.downloads_completed += 1;
                DownloadOutcome::Completed
            }
            TransferStatus::TimedOut => {
                warn!(file = %target.display(), "download timeout");
                self.report.downloads_failed += 1;
                DownloadOutcome::TimedOut
            }
            TransferStatus::Cancelled => DownloadOutcome::Cancelled,
        }
    }

    fn commit(&mut self, nav: &F::Session, link: &str) -> anyhow::Result<()> {
        if self.ledger.already_processed(link) {
            info!(%link, "already in ledger");
            self.report.already_committed += 1;
            return Ok(());
        }

        let item = extract::extract(nav, link);
        match self.ledger.commit(&item) {
            Ok(()) => {
                info!(%link, filename = %item.filename, "metadata saved");
                self.report.items_committed += 1;
                Ok(())
            }
            Err(LedgerError::AlreadyCommitted(_)) => {
                self.report.already_committed += 1;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn next_link(&mut self, nav: &mut F::Session, link: &str) -> Option<String> {
        let Some(control) = nav.find_next_control() else {
            info!("no next control; end of collection");
            return None;
        };
        if let Err(e) = nav.activate(&control) {
            warn!(error = %e, "could not activate next control");
            return None;
        }
        match nav.wait_for_url_change(link, self.options.wait_timeout) {
            Ok(next) => Some(next),
            Err(e) => {
                warn!(error = %e, "next item never loaded");
                None
            }
        }
    }
}

fn save_checkpoint(checkpoint: &Checkpoint, path: &Path) {
    if let Err(e) = checkpoint.save(path) {
        warn!(error = %e, "could not save cursor checkpoint");
    }
}
