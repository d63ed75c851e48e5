//! Embeds capture time and location into a video, then files it under the
//! ready directory.
//!
//! The transcoder writes a tagged copy next to the original
//! (`<name>.tmp.mp4`). Only after it succeeds is the original replaced and
//! moved, so an interrupted run leaves either the untouched original or a
//! finished file in the ready directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::date::TIMESTAMP_FORMAT;
use crate::error::{TagError, TranscodeError};

pub const TEMP_SUFFIX: &str = ".tmp.mp4";

/// Metadata written into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTags {
    /// `YYYY-MM-DDTHH:MM:SS`
    pub creation_time: String,
    /// Signed decimal degrees, e.g. `+48.8584+2.2945/`
    pub iso6709: String,
}

impl MediaTags {
    pub fn new(lat: f64, lon: f64, taken: NaiveDateTime) -> Self {
        Self {
            creation_time: taken.format(TIMESTAMP_FORMAT).to_string(),
            iso6709: iso6709(lat, lon),
        }
    }
}

/// `+lat+lon/` with an explicit sign on each component.
pub fn iso6709(lat: f64, lon: f64) -> String {
    format!("{:+}{:+}/", lat, lon)
}

/// `<path>.tmp.mp4`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Rewrites container metadata without re-encoding the streams.
pub trait Transcoder {
    fn rewrite_metadata(
        &self,
        input: &Path,
        output: &Path,
        tags: &MediaTags,
    ) -> Result<(), TranscodeError>;
}

/// Shells out to `ffmpeg` with stream copy.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    pub program: String,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, input: &Path, output: &Path, tags: &MediaTags) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-metadata")
            .arg(format!("creation_time={}", tags.creation_time))
            .arg("-metadata")
            .arg(format!("com.apple.quicktime.location.ISO6709={}", tags.iso6709))
            .args(["-movflags", "use_metadata_tags"])
            .args(["-map_metadata", "0"])
            .args(["-codec", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl Transcoder for FfmpegTranscoder {
    fn rewrite_metadata(
        &self,
        input: &Path,
        output: &Path,
        tags: &MediaTags,
    ) -> Result<(), TranscodeError> {
        let status = self
            .command(input, output, tags)
            .status()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(TranscodeError::Failed {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

pub struct Tagger<'a, T: Transcoder + ?Sized> {
    transcoder: &'a T,
    ready_dir: PathBuf,
}

impl<'a, T: Transcoder + ?Sized> Tagger<'a, T> {
    pub fn new(transcoder: &'a T, ready_dir: impl Into<PathBuf>) -> Self {
        Self {
            transcoder,
            ready_dir: ready_dir.into(),
        }
    }

    pub fn ready_dir(&self) -> &Path {
        &self.ready_dir
    }

    /// Tag `path` and move it into the ready directory. Returns the new
    /// location.
    ///
    /// If the transcode or the in-place replace fails, the original is left
    /// as it was and the temporary copy is removed.
    pub fn tag(
        &self,
        path: &Path,
        lat: f64,
        lon: f64,
        taken: NaiveDateTime,
    ) -> Result<PathBuf, TagError> {
        let tags = MediaTags::new(lat, lon, taken);
        let tmp = temp_path(path);

        if let Err(e) = self.transcoder.rewrite_metadata(path, &tmp, &tags) {
            discard(&tmp);
            return Err(e.into());
        }
        if let Err(source) = fs::rename(&tmp, path) {
            discard(&tmp);
            return Err(TagError::Replace {
                path: path.to_path_buf(),
                source,
            });
        }
        debug!(path = %path.display(), location = %tags.iso6709, "tagged");

        let file_name = path.file_name().unwrap_or(path.as_os_str());
        let dest = self.ready_dir.join(file_name);
        relocate(path, &dest).map_err(|source| TagError::Relocate {
            from: path.to_path_buf(),
            to: dest.clone(),
            source,
        })?;

        set_capture_mtime(&dest, taken);
        Ok(dest)
    }
}

fn discard(tmp: &Path) {
    if tmp.exists() {
        if let Err(e) = fs::remove_file(tmp) {
            warn!(path = %tmp.display(), error = %e, "could not remove temporary file");
        }
    }
}

/// Rename, falling back to copy + remove across filesystems.
/// Rename, or copy then remove when the rename fails (e.g. across devices).
/// On failure the file exists only at `from`.
fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    let rename_err = match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    debug!(from = %from.display(), error = %rename_err, "rename failed, copying instead");
    let copied = fs::copy(from, to).and_then(|_| fs::remove_file(from));
    if let Err(e) = copied {
        if to.exists() {
            let _ = fs::remove_file(to);
        }
        return Err(e);
    }
    Ok(())
}

/// Capture time is local wall-clock time.
fn set_capture_mtime(path: &Path, taken: NaiveDateTime) {
    // Ambiguous times (DST fall-back) take the earlier instant.
    let Some(local) = taken.and_local_timezone(chrono::Local).earliest() else {
        warn!(
            path = %path.display(),
            taken = %taken,
            "capture time does not exist in local time, modification time left unchanged"
        );
        return;
    };
    let ft = filetime::FileTime::from_unix_time(local.timestamp(), 0);
    if let Err(e) = filetime::set_file_mtime(path, ft) {
        warn!(path = %path.display(), error = %e, "could not set modification time");
    }
}
