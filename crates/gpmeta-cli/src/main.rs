use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use gpmeta_core::config::{self, AppConfig};
use gpmeta_core::error::NavError;
use gpmeta_core::navigator::snapshot::{SnapshotNavigator, SnapshotSite};
use gpmeta_core::profile_lock;
use gpmeta_core::tagger::FfmpegTranscoder;
use gpmeta_core::{CancellationToken, CancelledError, CrawlOptions, EnrichOptions, RunControl};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gpmeta", version, about = "Collect Google Photos metadata into a CSV ledger and tag downloaded videos with it")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: ./gpmeta.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Walk items from a start link, download each and record its metadata
    Crawl(CrawlArgs),
    /// Embed ledger metadata into downloaded videos and move them to ready_for_upload
    Tag(TagArgs),
}

#[derive(clap::Args)]
struct CrawlArgs {
    /// Recorded page snapshots (JSON) to crawl
    #[arg(long)]
    capture: Option<PathBuf>,

    /// First item page
    #[arg(long)]
    start_link: Option<String>,

    /// Ledger CSV
    #[arg(short, long)]
    csv: Option<PathBuf>,

    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Record metadata without downloading
    #[arg(long)]
    no_download: bool,

    /// Seconds to wait for each page load
    #[arg(long)]
    wait_timeout: Option<u64>,

    /// Give up on a download after this many seconds (default: wait forever)
    #[arg(long)]
    download_timeout: Option<u64>,

    /// Seconds a download's size must stay unchanged
    #[arg(long)]
    stability: Option<u64>,

    /// Browser user-data directory to check for a running instance
    #[arg(long)]
    user_data_dir: Option<PathBuf>,

    #[arg(long)]
    profile: Option<String>,

    /// Continue from the saved cursor instead of the start link
    #[arg(long)]
    resume: bool,
}

#[derive(clap::Args)]
struct TagArgs {
    /// Input CSV file
    #[arg(short, long)]
    csv: Option<PathBuf>,

    /// Directory containing the video files
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Geocoding fallback count
    #[arg(short, long)]
    fallbacks: Option<u32>,

    /// ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<String>,
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "gpmeta=info,gpmeta_core=info",
        1 => "gpmeta=debug,gpmeta_core=debug",
        _ => "gpmeta=trace,gpmeta_core=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let app = config::load_config(cli.config.as_deref())?;

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })?;
    let control = RunControl::new().with_cancel_token(token);

    let result = match &cli.command {
        Command::Crawl(args) => cmd_crawl(&app, args, control),
        Command::Tag(args) => cmd_tag(&app, args, &control),
    };

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) if e.is::<CancelledError>() => {
            warn!("interrupted");
            Ok(ExitCode::from(130))
        }
        Err(e) => Err(e),
    }
}

fn crawl_options(app: &AppConfig, args: &CrawlArgs) -> CrawlOptions {
    let mut options = CrawlOptions::from(app);
    if let Some(link) = &args.start_link {
        options.start_link = link.clone();
    }
    if let Some(csv) = &args.csv {
        options.ledger_path = csv.clone();
    }
    if let Some(dir) = &args.download_dir {
        options.download_dir = dir.clone();
    }
    if args.no_download {
        options.download_enabled = false;
    }
    if let Some(secs) = args.wait_timeout {
        options.wait_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.download_timeout {
        options.download_timeout = Some(Duration::from_secs(secs));
    }
    if let Some(secs) = args.stability {
        options.stability_window = Duration::from_secs(secs);
    }
    options
}

fn check_profile_lock(app: &AppConfig, args: &CrawlArgs) -> anyhow::Result<()> {
    let user_data_dir = args
        .user_data_dir
        .clone()
        .or_else(|| app.crawl.user_data_dir.as_ref().map(PathBuf::from));
    let Some(user_data_dir) = user_data_dir else {
        return Ok(());
    };
    let profile = args.profile.as_deref().or(app.crawl.profile.as_deref());
    let lock = profile_lock::lock_path(&user_data_dir, profile);
    info!(path = %lock.display(), "checking profile lock");
    profile_lock::wait_for_unlock(
        &lock,
        profile_lock::DEFAULT_ATTEMPTS,
        profile_lock::DEFAULT_INTERVAL,
    )?;
    Ok(())
}

fn cmd_crawl(app: &AppConfig, args: &CrawlArgs, control: RunControl) -> anyhow::Result<()> {
    let options = crawl_options(app, args);
    let capture = args
        .capture
        .clone()
        .or_else(|| app.crawl.capture.as_ref().map(PathBuf::from))
        .ok_or_else(|| anyhow::anyhow!("no capture file given (--capture or [crawl].capture)"))?;
    let control = control.with_resume(args.resume);
    if options.start_link.is_empty() {
        anyhow::bail!("no start link given (--start-link or [crawl].start_link)");
    }

    check_profile_lock(app, args)?;

    let site = SnapshotSite::load(&capture, &options.download_dir)?;
    let mut sessions = || -> Result<SnapshotNavigator, NavError> { Ok(site.session()) };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{pos}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let t_total = std::time::Instant::now();
    let progress = spinner.clone();
    let result = gpmeta_core::crawl_with_control(&options, &control, &mut sessions, &move |_, current, _, message| {
        progress.set_position(current + 1);
        progress.set_message(message.to_string());
    });
    spinner.finish_and_clear();
    let report = result?;

    eprintln!(
        "Done! {} items visited, {} committed, {} already in ledger, {} downloads failed ({:.2}s)",
        report.items_visited,
        report.items_committed,
        report.already_committed,
        report.downloads_failed,
        t_total.elapsed().as_secs_f64()
    );
    if report.stopped_on_navigation_error {
        eprintln!("Stopped early: an item page did not load. Rerun with --resume to continue.");
    }
    Ok(())
}

fn enrich_options(app: &AppConfig, args: &TagArgs) -> EnrichOptions {
    let mut options = EnrichOptions::from(app);
    if let Some(csv) = &args.csv {
        options.ledger_path = csv.clone();
    }
    if let Some(dir) = &args.dir {
        options.source_dir = dir.clone();
    }
    if let Some(n) = args.fallbacks {
        options.geocode_fallbacks = n;
    }
    options
}

fn cmd_tag(app: &AppConfig, args: &TagArgs, control: &RunControl) -> anyhow::Result<()> {
    let options = enrich_options(app, args);
    let program = args.ffmpeg.clone().unwrap_or_else(|| app.enrich.ffmpeg.clone());
    let transcoder = FfmpegTranscoder::new(program);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("[{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let t_total = std::time::Instant::now();
    let progress = pb.clone();
    let result = gpmeta_core::enrich_with_control(&options, control, &transcoder, &move |_, current, total, message| {
        progress.set_length(total);
        progress.set_position(current + 1);
        progress.set_message(message.to_string());
    });
    pb.finish_and_clear();
    let report = result?;

    for row in &report.skipped {
        eprintln!("✖ {}: {}", row.filename, row.reason);
    }
    for row in &report.failed {
        eprintln!("✖ {}: {}", row.filename, row.reason);
    }
    eprintln!(
        "Done! {} tagged, {} skipped, {} failed, {} non-video rows ({:.2}s) -> {}",
        report.tagged,
        report.skipped.len(),
        report.failed.len(),
        report.ignored,
        t_total.elapsed().as_secs_f64(),
        report.ready_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_flags_override_config() {
        let cli = Cli::parse_from(["gpmeta", "tag", "-c", "x.csv", "-d", "vids", "-f", "5"]);
        let Command::Tag(args) = &cli.command else {
            panic!("expected tag");
        };
        let options = enrich_options(&AppConfig::default(), args);
        assert_eq!(options.ledger_path, PathBuf::from("x.csv"));
        assert_eq!(options.source_dir, PathBuf::from("vids"));
        assert_eq!(options.geocode_fallbacks, 5);
    }

    #[test]
    fn crawl_defaults_come_from_config() {
        let cli = Cli::parse_from(["gpmeta", "-v", "crawl", "--no-download", "--download-timeout", "60"]);
        assert_eq!(cli.verbose, 1);
        let Command::Crawl(args) = &cli.command else {
            panic!("expected crawl");
        };
        let mut app = AppConfig::default();
        app.crawl.start_link = Some("https://photos.example/photo/A".into());
        let options = crawl_options(&app, args);
        assert_eq!(options.start_link, "https://photos.example/photo/A");
        assert!(!options.download_enabled);
        assert_eq!(options.download_timeout, Some(Duration::from_secs(60)));
        assert_eq!(options.stability_window, Duration::from_secs(30));
    }
}
