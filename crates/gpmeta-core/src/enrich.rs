//! Tagging stage: walk the ledger, validate each row, tag the matching
//! video and move it to the ready directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::error::RowError;
use crate::item::VideoRecord;
use crate::tagger::{Tagger, Transcoder};
use crate::{date, reader, EnrichOptions, ThrottledProgress};

/// Extensions (lowercase, no dot) that the tagging stage handles.
pub const VIDEO_EXTS: [&str; 2] = ["mp4", "mov"];

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct EnrichReport {
    pub rows: u64,
    pub tagged: u64,
    /// Rows naming a file that is not a video
    pub ignored: u64,
    pub skipped: Vec<SkippedRow>,
    pub failed: Vec<SkippedRow>,
    pub ready_dir: PathBuf,
}

/// A row that passed validation and is ready to tag.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRow {
    pub path: PathBuf,
    pub latitude: f64,
    pub longitude: f64,
    pub taken: NaiveDateTime,
}

pub fn is_video(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| VIDEO_EXTS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Resolve a place name to coordinates.
///
/// No geocoding backend exists, so this always fails; rows need explicit
/// latitude and longitude.
pub fn geocode_location(location: &str, _max_fallbacks: u32) -> Result<(f64, f64), RowError> {
    Err(RowError::GeocodeUnavailable(location.to_string()))
}

/// A ledger filename must name an entry directly inside the source
/// directory.
fn is_plain_file_name(filename: &str) -> bool {
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Check one row and resolve everything the tagger needs.
pub fn prepare_row(
    record: &VideoRecord,
    source_dir: &Path,
    geocode_fallbacks: u32,
) -> Result<PreparedRow, RowError> {
    let filename = present(&record.filename);
    let day = present(&record.date);
    let lat = present(&record.latitude);
    let lon = present(&record.longitude);
    let location = present(&record.location);

    let (Some(filename), Some(day)) = (filename, day) else {
        return Err(RowError::Validation("filename and date are required".into()));
    };
    if !is_plain_file_name(filename) {
        return Err(RowError::Validation(format!(
            "filename {filename:?} is not a plain file name"
        )));
    }
    let has_coordinates = lat.is_some() && lon.is_some();
    if !has_coordinates && location.is_none() {
        return Err(RowError::Validation(
            "latitude/longitude or location is required".into(),
        ));
    }

    let taken = date::combine(day, record.time.as_deref()).ok_or_else(|| {
        RowError::Validation(format!(
            "unreadable date/time {:?} {:?}",
            day,
            record.time.as_deref().unwrap_or("")
        ))
    })?;

    let (latitude, longitude) = match (lat, lon) {
        (Some(lat), Some(lon)) => match (lat.parse::<f64>(), lon.parse::<f64>()) {
            (Ok(a), Ok(b)) if a.is_finite() && b.is_finite() => (a, b),
            _ => {
                return Err(RowError::CoordinateParse {
                    latitude: lat.to_string(),
                    longitude: lon.to_string(),
                })
            }
        },
        _ => geocode_location(location.unwrap_or_default(), geocode_fallbacks)?,
    };

    let path = source_dir.join(filename);
    if !path.is_file() {
        return Err(RowError::FileNotFound(path));
    }

    Ok(PreparedRow {
        path,
        latitude,
        longitude,
        taken,
    })
}

/// `ready_dir_name` placed next to `source_dir`, not inside it.
pub fn ready_dir_for(source_dir: &Path, ready_dir_name: &str) -> anyhow::Result<PathBuf> {
    let absolute = fs::canonicalize(source_dir)
        .with_context(|| format!("cannot resolve {}", source_dir.display()))?;
    let parent = absolute.parent().unwrap_or(&absolute);
    Ok(parent.join(ready_dir_name))
}

pub(crate) fn run<T: Transcoder + ?Sized>(
    options: &EnrichOptions,
    transcoder: &T,
    cancel: Option<&CancellationToken>,
    progress: &ThrottledProgress,
) -> anyhow::Result<EnrichReport> {
    if !options.source_dir.is_dir() {
        bail!("directory not found: {}", options.source_dir.display());
    }
    let ready_dir = ready_dir_for(&options.source_dir, &options.ready_dir_name)?;
    fs::create_dir_all(&ready_dir)
        .with_context(|| format!("cannot create {}", ready_dir.display()))?;

    let records = reader::read_records(&options.ledger_path)?;
    let total = records.len() as u64;
    let tagger = Tagger::new(transcoder, &ready_dir);
    let mut report = EnrichReport {
        rows: total,
        ready_dir: ready_dir.clone(),
        ..EnrichReport::default()
    };

    info!(rows = total, ready_dir = %ready_dir.display(), "tagging videos");

    for (i, record) in records.iter().enumerate() {
        if let Some(token) = cancel {
            token.check()?;
        }

        let name = present(&record.filename).unwrap_or("<no filename>").to_string();
        progress.report("tag", i as u64, total, &name);

        if record.filename.as_deref().is_some_and(|f| !f.trim().is_empty() && !is_video(f)) {
            report.ignored += 1;
            continue;
        }

        let row = match prepare_row(record, &options.source_dir, options.geocode_fallbacks) {
            Ok(row) => row,
            Err(reason) => {
                warn!(file = %name, %reason, "row skipped");
                report.skipped.push(SkippedRow {
                    filename: name,
                    reason: reason.to_string(),
                });
                continue;
            }
        };

        match tagger.tag(&row.path, row.latitude, row.longitude, row.taken) {
            Ok(dest) => {
                info!(file = %name, dest = %dest.display(), "tagged and moved");
                report.tagged += 1;
            }
            Err(e) => {
                warn!(file = %name, error = %e, "tagging failed");
                report.failed.push(SkippedRow {
                    filename: name,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
