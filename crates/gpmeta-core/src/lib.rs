pub mod cancel;
pub mod checkpoint;
pub mod config;
pub mod crawl;
pub mod date;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod item;
pub mod ledger;
pub mod navigator;
pub mod profile_lock;
pub mod reader;
pub mod tagger;
pub mod watcher;

use std::path::PathBuf;
use std::time::{Duration, Instant};

pub const DEFAULT_LEDGER: &str = "google_photos_videos.csv";
pub const DEFAULT_DOWNLOAD_DIR: &str = "gp_downloads";
pub const READY_DIR_NAME: &str = "ready_for_upload";

/// Settings for the crawl stage.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// First item page to visit
    pub start_link: String,
    pub ledger_path: PathBuf,
    /// Where the navigator's downloads land
    pub download_dir: PathBuf,
    /// When false, metadata is committed without downloading anything
    pub download_enabled: bool,
    /// Budget for each page load and each page transition
    pub wait_timeout: Duration,
    /// `None` waits for a download indefinitely
    pub download_timeout: Option<Duration>,
    /// How long a download's size must hold still to count as finished
    pub stability_window: Duration,
    pub poll_interval: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            start_link: String::new(),
            ledger_path: PathBuf::from(DEFAULT_LEDGER),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            download_enabled: true,
            wait_timeout: Duration::from_secs(10),
            download_timeout: None,
            stability_window: Duration::from_secs(30),
            poll_interval: watcher::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Settings for the tagging stage.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub ledger_path: PathBuf,
    /// Directory holding the downloaded videos
    pub source_dir: PathBuf,
    /// Name of the output directory created next to `source_dir`
    pub ready_dir_name: String,
    /// Accepted for geocoding, which is not implemented
    pub geocode_fallbacks: u32,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER),
            source_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            ready_dir_name: READY_DIR_NAME.to_string(),
            geocode_fallbacks: 3,
        }
    }
}

/// Control options for a run (resume, cancellation).
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    /// Whether to resume the crawl from an existing cursor checkpoint.
    pub resume: bool,
    /// Cancellation token for pause/cancel support.
    pub cancel_token: Option<CancellationToken>,
}

impl RunControl {
    /// Create a new RunControl with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create RunControl with resume enabled.
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Create RunControl with a cancellation token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

pub use cancel::CancellationToken;
pub use checkpoint::{Checkpoint, Cursor, CHECKPOINT_FILENAME};
pub use error::CancelledError;
pub use crawl::CrawlReport;
pub use enrich::EnrichReport;
pub use item::{Item, VideoRecord};
pub use ledger::Ledger;

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter: emits at most every 200ms, and always on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: std::sync::Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: std::sync::Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    /// A `total` of zero means the amount of work is unknown; every
    /// report is emitted.
    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = match self.last_emit.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Crawl from `options.start_link` until no next item exists.
pub fn crawl<F: navigator::SessionFactory>(
    options: &CrawlOptions,
    sessions: &mut F,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<CrawlReport> {
    crawl_with_control(options, &RunControl::default(), sessions, progress_callback)
}

/// Crawl with resume and cancellation support.
pub fn crawl_with_control<F: navigator::SessionFactory>(
    options: &CrawlOptions,
    control: &RunControl,
    sessions: &mut F,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<CrawlReport> {
    let tp = ThrottledProgress::new(progress_callback);

    // Check for cancellation early
    if let Some(ref token) = control.cancel_token {
        token.check()?;
    }

    let ledger = Ledger::open(&options.ledger_path)?;
    crawl::Crawler::new(options, ledger, sessions, control.cancel_token.clone())
        .run(control.resume, &tp)
}

/// Tag and relocate every video the ledger has usable metadata for.
pub fn enrich<T: tagger::Transcoder>(
    options: &EnrichOptions,
    transcoder: &T,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<EnrichReport> {
    enrich_with_control(options, &RunControl::default(), transcoder, progress_callback)
}

/// Tagging stage with cancellation support. `control.resume` is ignored;
/// tagging is naturally resumable because finished files leave the source
/// directory.
pub fn enrich_with_control<T: tagger::Transcoder>(
    options: &EnrichOptions,
    control: &RunControl,
    transcoder: &T,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<EnrichReport> {
    let tp = ThrottledProgress::new(progress_callback);

    if let Some(ref token) = control.cancel_token {
        token.check()?;
    }

    enrich::run(options, transcoder, control.cancel_token.as_ref(), &tp)
}
