pub mod clock;
pub mod label;

use chrono::NaiveDateTime;

pub use clock::{format_time, DEFAULT_TIME};
pub use label::{parse_date_label, parse_time_label};

/// Combined form handed to the transcoder: `YYYY-MM-DDTHH:MM:SS`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Join a ledger date and a raw ledger time into a capture timestamp.
/// The time goes through [`format_time`] first, so a blank time means 13:00.
pub fn combine(date: &str, raw_time: Option<&str>) -> Option<NaiveDateTime> {
    let iso = format!("{}T{}", date.trim(), format_time(raw_time));
    NaiveDateTime::parse_from_str(&iso, TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_defaults_to_one_pm() {
        let dt = combine("2023-01-05", None).unwrap();
        assert_eq!(dt.format(TIMESTAMP_FORMAT).to_string(), "2023-01-05T13:00:00");
    }

    #[test]
    fn combine_pads_short_time() {
        let dt = combine("2023-01-05", Some("9:5")).unwrap();
        assert_eq!(dt.format(TIMESTAMP_FORMAT).to_string(), "2023-01-05T09:05:00");
    }

    #[test]
    fn combine_rejects_garbage() {
        assert!(combine("Jan 5", Some("9:05")).is_none());
        assert!(combine("2023-01-05", Some("25:00")).is_none());
    }
}
