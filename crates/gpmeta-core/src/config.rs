//! File-based settings for both stages.
//!
//! Looked up as `gpmeta.toml` in the working directory unless a path is
//! given. CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{CrawlOptions, EnrichOptions, DEFAULT_DOWNLOAD_DIR, DEFAULT_LEDGER, READY_DIR_NAME};

pub const CONFIG_FILE_NAME: &str = "gpmeta.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub crawl: CrawlSection,

    #[serde(default)]
    pub enrich: EnrichSection,
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSection {
    #[serde(default)]
    pub start_link: Option<String>,

    /// Ledger CSV; also the tagging stage's input unless `[enrich].csv` is set.
    #[serde(default = "default_ledger")]
    pub ledger: String,

    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    #[serde(default = "default_true")]
    pub download_enabled: bool,

    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// Unset waits for each download indefinitely.
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,

    #[serde(default = "default_stability_secs")]
    pub stability_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Recorded page snapshots to crawl.
    #[serde(default)]
    pub capture: Option<String>,

    /// Browser user-data directory guarded by the profile lock.
    #[serde(default)]
    pub user_data_dir: Option<String>,

    #[serde(default)]
    pub profile: Option<String>,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            start_link: None,
            ledger: default_ledger(),
            download_dir: default_download_dir(),
            download_enabled: true,
            wait_timeout_secs: default_wait_timeout_secs(),
            download_timeout_secs: None,
            stability_secs: default_stability_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            capture: None,
            user_data_dir: None,
            profile: None,
        }
    }
}

fn default_ledger() -> String {
    DEFAULT_LEDGER.into()
}
fn default_download_dir() -> String {
    DEFAULT_DOWNLOAD_DIR.into()
}
fn default_true() -> bool {
    true
}
fn default_wait_timeout_secs() -> u64 {
    10
}
fn default_stability_secs() -> u64 {
    30
}
fn default_poll_interval_ms() -> u64 {
    500
}

/// `[enrich]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichSection {
    #[serde(default)]
    pub csv: Option<String>,

    #[serde(default = "default_download_dir")]
    pub source_dir: String,

    #[serde(default = "default_ready_dir_name")]
    pub ready_dir_name: String,

    #[serde(default = "default_fallbacks")]
    pub geocode_fallbacks: u32,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

impl Default for EnrichSection {
    fn default() -> Self {
        Self {
            csv: None,
            source_dir: default_download_dir(),
            ready_dir_name: default_ready_dir_name(),
            geocode_fallbacks: default_fallbacks(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

fn default_ready_dir_name() -> String {
    READY_DIR_NAME.into()
}
fn default_fallbacks() -> u32 {
    3
}
fn default_ffmpeg() -> String {
    "ffmpeg".into()
}

impl From<&AppConfig> for CrawlOptions {
    fn from(config: &AppConfig) -> Self {
        let c = &config.crawl;
        Self {
            start_link: c.start_link.clone().unwrap_or_default(),
            ledger_path: PathBuf::from(&c.ledger),
            download_dir: PathBuf::from(&c.download_dir),
            download_enabled: c.download_enabled,
            wait_timeout: Duration::from_secs(c.wait_timeout_secs),
            download_timeout: c.download_timeout_secs.map(Duration::from_secs),
            stability_window: Duration::from_secs(c.stability_secs),
            poll_interval: Duration::from_millis(c.poll_interval_ms),
        }
    }
}

impl From<&AppConfig> for EnrichOptions {
    fn from(config: &AppConfig) -> Self {
        let e = &config.enrich;
        Self {
            ledger_path: PathBuf::from(e.csv.as_ref().unwrap_or(&config.crawl.ledger)),
            source_dir: PathBuf::from(&e.source_dir),
            ready_dir_name: e.ready_dir_name.clone(),
            geocode_fallbacks: e.geocode_fallbacks,
        }
    }
}

/// Load `path`, or `gpmeta.toml` in the working directory. A missing
/// default file yields defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(p) => load_config_from(p),
        None => {
            let default_path = Path::new(CONFIG_FILE_NAME);
            if !default_path.exists() {
                tracing::debug!(path = ?default_path, "config file not found, using defaults");
                return Ok(AppConfig::default());
            }
            load_config_from(default_path)
        }
    }
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_options_defaults() {
        let app = AppConfig::default();
        let crawl = CrawlOptions::from(&app);
        let base = CrawlOptions::default();
        assert_eq!(crawl.ledger_path, base.ledger_path);
        assert_eq!(crawl.wait_timeout, base.wait_timeout);
        assert_eq!(crawl.stability_window, base.stability_window);
        assert_eq!(crawl.download_timeout, None);

        let enrich = EnrichOptions::from(&app);
        assert_eq!(enrich.ready_dir_name, "ready_for_upload");
        assert_eq!(enrich.geocode_fallbacks, 3);
        assert_eq!(enrich.ledger_path, PathBuf::from(DEFAULT_LEDGER));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let toml_str = r#"
[crawl]
start_link = "https://photos.example/photo/A"
download_timeout_secs = 600

[enrich]
csv = "other.csv"
"#;
        let app: AppConfig = toml::from_str(toml_str).expect("parse");
        let crawl = CrawlOptions::from(&app);
        assert_eq!(crawl.start_link, "https://photos.example/photo/A");
        assert_eq!(crawl.download_timeout, Some(Duration::from_secs(600)));
        assert!(crawl.download_enabled);
        assert_eq!(EnrichOptions::from(&app).ledger_path, PathBuf::from("other.csv"));
    }

    #[test]
    fn default_config_roundtrip() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.crawl.stability_secs, 30);
        assert_eq!(parsed.enrich.ffmpeg, "ffmpeg");
    }

    #[test]
    fn load_errors_name_the_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(load_config(Some(&missing)), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[crawl\n").unwrap();
        let err = load_config_from(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }
}
