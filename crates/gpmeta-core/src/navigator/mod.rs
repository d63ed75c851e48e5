//! The capability surface the crawl needs from whatever renders item pages.
//!
//! A session is loaded with one item at a time; while loaded it acts as the
//! item's view ([`ItemView`]) as well as the thing that clicks controls.

pub mod snapshot;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NavError;

/// Substring identifying the control that advances to the next item.
pub const NEXT_LABEL: &str = "next";

/// Substring identifying the download control.
pub const DOWNLOAD_LABEL: &str = "download";

/// A clickable element, identified by its accessible label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub label: String,
}

impl Control {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// A list element on the page plus the text of its preceding siblings,
/// nearest sibling first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBlock {
    #[serde(default)]
    pub preceding: Vec<String>,
    #[serde(default)]
    pub entries: Vec<String>,
}

/// Read access to the currently loaded item.
pub trait ItemView {
    /// Full label text of the first field whose label starts with `label_prefix`.
    fn read_labeled_field(&self, label_prefix: &str) -> Option<String>;

    /// Target of the first link whose href contains `fragment`.
    fn link_href_containing(&self, fragment: &str) -> Option<String>;

    /// Text of the place-name block, possibly several lines.
    fn location_text(&self) -> Option<String>;

    /// Every list element in document order.
    fn list_blocks(&self) -> Vec<ListBlock>;
}

pub trait Navigator: ItemView {
    fn load_item(&mut self, link: &str, timeout: Duration) -> Result<(), NavError>;

    /// First control whose label contains `label_substring`, ignoring case.
    fn find_labeled_control(&self, label_substring: &str) -> Option<Control>;

    /// Start the download behind `control`; returns once the transfer is
    /// handed off, not when it finishes.
    fn trigger_download(&mut self, control: &Control) -> Result<(), NavError>;

    fn find_next_control(&self) -> Option<Control> {
        self.find_labeled_control(NEXT_LABEL)
    }

    fn activate(&mut self, control: &Control) -> Result<(), NavError>;

    /// Wait until the current link differs from `from_link` and return it.
    fn wait_for_url_change(&mut self, from_link: &str, timeout: Duration)
        -> Result<String, NavError>;

    /// Tear the session down.
    fn close(&mut self) {}
}

/// Builds a fresh navigator session for each item.
pub trait SessionFactory {
    type Session: Navigator;

    fn open_session(&mut self) -> Result<Self::Session, NavError>;
}

impl<F, N> SessionFactory for F
where
    F: FnMut() -> Result<N, NavError>,
    N: Navigator,
{
    type Session = N;

    fn open_session(&mut self) -> Result<N, NavError> {
        self()
    }
}
