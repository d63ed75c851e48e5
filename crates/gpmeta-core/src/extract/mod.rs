//! Field extraction from a loaded item page.
//!
//! Each field is read on its own and resolves to an empty value when the
//! page does not expose it, so one missing field never costs the others.

pub mod albums;

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::item::Item;
use crate::navigator::ItemView;

pub const FILENAME_LABEL: &str = "Filename:";
pub const DATE_LABEL: &str = "Date taken:";
pub const TIME_LABEL: &str = "Time taken:";

/// Map links carry the coordinates as `q=loc:<lat>,<lon>`.
pub const LOCATION_QUERY: &str = "q=loc:";

static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"q=loc:\s*([+-]?\d+(?:\.\d+)?)\s*(?:,|%2C)\s*([+-]?\d+(?:\.\d+)?)").unwrap()
});

/// Build an [`Item`] for `link` from whatever the view exposes.
pub fn extract<V: ItemView + ?Sized>(view: &V, link: &str) -> Item {
    let (latitude, longitude) = match coordinates(view) {
        Some((lat, lon)) => (lat, lon),
        None => {
            miss(link, "coordinates");
            (String::new(), String::new())
        }
    };

    Item {
        link: link.to_string(),
        filename: or_miss(link, "filename", filename(view)),
        date: or_miss(link, "date", date(view)),
        time: or_miss(link, "time", time(view)),
        latitude,
        longitude,
        location: or_miss(link, "location", location_name(view)),
        albums: albums::discover(&view.list_blocks()),
    }
}

/// Value part of a `Label: value` field.
fn field_value<V: ItemView + ?Sized>(view: &V, label: &str) -> Option<String> {
    let raw = view.read_labeled_field(label)?;
    let (_, value) = raw.split_once(": ")?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Final path component of the `Filename:` field. This is the name the
/// download lands under and the name the ledger records.
pub fn filename<V: ItemView + ?Sized>(view: &V) -> Option<String> {
    let value = field_value(view, FILENAME_LABEL)?;
    let name = Path::new(&value).file_name()?.to_str()?.trim();
    (!name.is_empty()).then(|| name.to_string())
}

pub fn date<V: ItemView + ?Sized>(view: &V) -> Option<String> {
    field_value(view, DATE_LABEL).and_then(|v| crate::date::parse_date_label(&v))
}

pub fn time<V: ItemView + ?Sized>(view: &V) -> Option<String> {
    field_value(view, TIME_LABEL).and_then(|v| crate::date::parse_time_label(&v))
}

/// Signed decimal `(latitude, longitude)` from the map link.
pub fn coordinates<V: ItemView + ?Sized>(view: &V) -> Option<(String, String)> {
    let href = view.link_href_containing(LOCATION_QUERY)?;
    parse_location_href(&href)
}

pub fn parse_location_href(href: &str) -> Option<(String, String)> {
    let caps = LOC_RE.captures(href)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// First line of the place-name block.
pub fn location_name<V: ItemView + ?Sized>(view: &V) -> Option<String> {
    let text = view.location_text()?;
    let first = text.lines().next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

fn or_miss(link: &str, field: &str, value: Option<String>) -> String {
    value.unwrap_or_else(|| {
        miss(link, field);
        String::new()
    })
}

fn miss(link: &str, field: &str) {
    debug!(link, field, "extraction miss");
}
