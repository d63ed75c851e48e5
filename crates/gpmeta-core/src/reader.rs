//! Reads the ledger back as [`VideoRecord`] rows for the tagging stage.
//!
//! Ledgers may have been round-tripped through a spreadsheet, so a UTF-8
//! BOM and whitespace around fields are tolerated.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::LedgerError;
use crate::item::VideoRecord;

pub fn read_records(path: &Path) -> Result<Vec<VideoRecord>, LedgerError> {
    let text = fs::read_to_string(path).map_err(|e| LedgerError::io(path, e))?;
    Ok(parse_records(&text))
}

/// Rows that cannot be decoded are logged and dropped.
pub fn parse_records(text: &str) -> Vec<VideoRecord> {
    let body = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<VideoRecord>().enumerate() {
        match row {
            Ok(record) => records.push(record),
            // +2: header line, 1-based numbering
            Err(e) => warn!(line = i + 2, error = %e, "unreadable ledger row"),
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_subset_of_columns() {
        let text = "link,filename,date,time,latitude,longitude,location,albums\n\
                    https://p/1,a.mp4,2023-01-05,21:05:00,48.85,2.29,Paris,Trip\n";
        let rows = parse_records(text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].filename.as_deref(), Some("a.mp4"));
        assert_eq!(rows[0].time.as_deref(), Some("21:05:00"));
        assert_eq!(rows[0].location.as_deref(), Some("Paris"));
    }

    #[test]
    fn empty_fields_are_none() {
        let text = "link,filename,date,time,latitude,longitude,location,albums\n\
                    https://p/1,a.mp4,2023-01-05,,,,Paris,\n";
        let rows = parse_records(text);
        assert_eq!(rows[0].time, None);
        assert_eq!(rows[0].latitude, None);
        assert_eq!(rows[0].longitude, None);
    }

    #[test]
    fn tolerates_bom_and_padding() {
        let text = "\u{feff}filename, date, time, latitude, longitude, location\n\
                    b.mov, 2022-07-01, 8:30, -33.86, 151.2, Sydney\n";
        let rows = parse_records(text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].filename.as_deref(), Some("b.mov"));
        assert_eq!(rows[0].latitude.as_deref(), Some("-33.86"));
        assert_eq!(rows[0].location.as_deref(), Some("Sydney"));
    }

    #[test]
    fn short_rows_fill_missing_columns() {
        let text = "filename,date,time,latitude,longitude,location\nc.mp4,2021-01-01\n";
        let rows = parse_records(text);
        assert_eq!(rows[0].filename.as_deref(), Some("c.mp4"));
        assert_eq!(rows[0].location, None);
    }
}
