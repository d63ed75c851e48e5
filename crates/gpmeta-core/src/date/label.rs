//! Parsing of the human-readable date/time labels shown on item pages.

use chrono::{NaiveDate, NaiveTime};

/// Page date labels look like `Jan 5, 2023`.
const DATE_LABEL_FORMAT: &str = "%b %d, %Y";

const TIME_FORMATS: &[&str] = &["%I:%M %p", "%H:%M"];

/// `Jan 5, 2023` -> `2023-01-05`.
pub fn parse_date_label(label: &str) -> Option<String> {
    let cleaned = normalize_spaces(label);
    NaiveDate::parse_from_str(cleaned.trim(), DATE_LABEL_FORMAT)
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Takes the token after the last comma (`Thu, 9:05 PM` -> `9:05 PM`)
/// and returns it as 24-hour `HH:MM:SS`.
pub fn parse_time_label(label: &str) -> Option<String> {
    let cleaned = normalize_spaces(label);
    let token = cleaned.rsplit(',').next()?.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(token, fmt).ok())
        .map(|t| t.format("%H:%M:%S").to_string())
}

/// Pages render `9:05\u{202f}PM` with a narrow no-break space.
fn normalize_spaces(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{202f}' | '\u{a0}' | '\u{2009}' => ' ',
            c => c,
        })
        .collect()
}
