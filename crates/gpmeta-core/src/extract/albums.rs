//! Album membership discovery.
//!
//! A list holds album names when one of its preceding siblings reads
//! exactly `Albums`. Lists are tried in document order and the first one
//! that yields at least one name wins; later lists are never merged in.
//! Each entry contributes its first non-blank text line. Blank lines ahead
//! of the name are skipped rather than yielding an empty album name; an
//! entry with no text at all contributes nothing.

use crate::navigator::ListBlock;

pub const ALBUMS_HEADING: &str = "Albums";

pub fn discover(lists: &[ListBlock]) -> Vec<String> {
    lists
        .iter()
        .filter(|list| list.preceding.iter().any(|t| t.trim() == ALBUMS_HEADING))
        .map(|list| {
            list.entries
                .iter()
                .filter_map(|entry| entry.lines().map(str::trim).find(|l| !l.is_empty()))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .find(|names| !names.is_empty())
        .unwrap_or_default()
}
