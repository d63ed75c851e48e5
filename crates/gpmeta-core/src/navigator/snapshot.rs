//! A [`Navigator`] that replays item pages from a JSON capture instead of
//! driving a browser.
//!
//! Downloads are copied from the capture's payload files into the download
//! directory through a `.crdownload` marker, the same way a browser lands
//! them.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{Control, ItemView, ListBlock, Navigator, NEXT_LABEL};
use crate::error::NavError;
use crate::extract;
use crate::watcher::partial_marker;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageSnapshot {
    pub link: String,
    /// Labels of read-only fields, e.g. `Date taken: Jan 5, 2023`
    #[serde(default)]
    pub fields: Vec<String>,
    /// Labels of clickable controls, e.g. `Download`, `View next photo`
    #[serde(default)]
    pub controls: Vec<String>,
    #[serde(default)]
    pub hrefs: Vec<String>,
    #[serde(default)]
    pub location_text: Option<String>,
    #[serde(default)]
    pub lists: Vec<ListBlock>,
    /// Payload served by the download control, relative to the capture file
    #[serde(default)]
    pub download: Option<PathBuf>,
    /// Where the next control leads
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    items: Vec<PageSnapshot>,
}

/// A loaded capture; hands out independent sessions over the same pages.
#[derive(Debug, Clone)]
pub struct SnapshotSite {
    pages: Arc<HashMap<String, PageSnapshot>>,
    base_dir: PathBuf,
    download_dir: PathBuf,
}

impl SnapshotSite {
    pub fn load(capture_path: &Path, download_dir: &Path) -> anyhow::Result<Self> {
        let file = File::open(capture_path)?;
        let capture: Capture = serde_json::from_reader(BufReader::new(file))?;
        let base_dir = capture_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .to_path_buf();
        Ok(Self::from_pages(capture.items, base_dir, download_dir.to_path_buf()))
    }

    pub fn from_pages(pages: Vec<PageSnapshot>, base_dir: PathBuf, download_dir: PathBuf) -> Self {
        let pages = pages.into_iter().map(|p| (p.link.clone(), p)).collect();
        Self {
            pages: Arc::new(pages),
            base_dir,
            download_dir,
        }
    }

    pub fn session(&self) -> SnapshotNavigator {
        SnapshotNavigator {
            site: self.clone(),
            current: None,
        }
    }
}

pub struct SnapshotNavigator {
    site: SnapshotSite,
    current: Option<String>,
}

impl SnapshotNavigator {
    fn page(&self) -> Option<&PageSnapshot> {
        self.current.as_ref().and_then(|link| self.site.pages.get(link))
    }

    fn require_control(&self, control: &Control) -> Result<&PageSnapshot, NavError> {
        self.page()
            .filter(|p| p.controls.iter().any(|c| c == &control.label))
            .ok_or_else(|| NavError::Session(format!("no control labelled {:?}", control.label)))
    }
}

impl ItemView for SnapshotNavigator {
    fn read_labeled_field(&self, label_prefix: &str) -> Option<String> {
        self.page()?
            .fields
            .iter()
            .find(|f| f.starts_with(label_prefix))
            .cloned()
    }

    fn link_href_containing(&self, fragment: &str) -> Option<String> {
        self.page()?.hrefs.iter().find(|h| h.contains(fragment)).cloned()
    }

    fn location_text(&self) -> Option<String> {
        self.page()?.location_text.clone()
    }

    fn list_blocks(&self) -> Vec<ListBlock> {
        self.page().map(|p| p.lists.clone()).unwrap_or_default()
    }
}

impl Navigator for SnapshotNavigator {
    fn load_item(&mut self, link: &str, timeout: Duration) -> Result<(), NavError> {
        if !self.site.pages.contains_key(link) {
            return Err(NavError::timeout(format!("item page {link}"), timeout));
        }
        self.current = Some(link.to_string());
        Ok(())
    }

    fn find_labeled_control(&self, label_substring: &str) -> Option<Control> {
        let needle = label_substring.to_lowercase();
        self.page()?
            .controls
            .iter()
            .find(|c| c.to_lowercase().contains(&needle))
            .map(Control::new)
    }

    fn trigger_download(&mut self, control: &Control) -> Result<(), NavError> {
        let page = self.require_control(control)?;
        let source = page
            .download
            .as_ref()
            .map(|p| self.site.base_dir.join(p))
            .ok_or_else(|| NavError::Session(format!("{} has no download payload", page.link)))?;

        // Same naming rule the crawl uses to find the finished file.
        let filename = extract::filename(&*self)
            .or_else(|| source.file_name().map(|n| n.to_string_lossy().into_owned()))
            .ok_or_else(|| NavError::Session(format!("cannot name download {:?}", source)))?;

        let target = self.site.download_dir.join(filename);
        let marker = partial_marker(&target);
        let session_err = |e: std::io::Error| NavError::Session(format!("download failed: {e}"));
        fs::create_dir_all(&self.site.download_dir).map_err(session_err)?;
        fs::copy(&source, &marker).map_err(session_err)?;
        fs::rename(&marker, &target).map_err(session_err)?;
        debug!(source = %source.display(), target = %target.display(), "snapshot download landed");
        Ok(())
    }

    fn activate(&mut self, control: &Control) -> Result<(), NavError> {
        let page = self.require_control(control)?;
        if control.label.to_lowercase().contains(NEXT_LABEL) {
            if let Some(next) = page.next.clone() {
                self.current = Some(next);
            }
        }
        Ok(())
    }

    fn wait_for_url_change(
        &mut self,
        from_link: &str,
        timeout: Duration,
    ) -> Result<String, NavError> {
        match &self.current {
            Some(link) if link != from_link => Ok(link.clone()),
            _ => Err(NavError::timeout(format!("url change from {from_link}"), timeout)),
        }
    }

    fn close(&mut self) {
        self.current = None;
    }
}
