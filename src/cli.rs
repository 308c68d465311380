//! CLI parsing and orchestration. Parses args, runs catalog -> download ->
//! render -> merge -> cleanup, and maps errors to exit codes.

use crate::config;
use crate::model::{batch_file_name, OutputPlan, RunSummary, SkipRecord};
use crate::pdf::{self, PdfError};
use crate::scraper::mangainua::MangaInUaScraper;
use crate::scraper::{resolve_manga_url, PoliteClient, ScraperError, DEFAULT_BASE_URL};
use crate::store::{self, ensure_absent, ImageStore, StoreError};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Pdf(#[from] PdfError),

    /// A page or chapter failed permanently while --strict was set.
    #[error("{0}")]
    Strict(String),
}

impl CliRunError {
    /// 1 invalid input/config/conflict, 2 fetch or parse, 3 render/merge/fs.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Store(StoreError::Conflict { .. }) => 1,
            CliRunError::Scraper(_) | CliRunError::Strict(_) => 2,
            CliRunError::Store(_) | CliRunError::Pdf(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "muadl")]
#[command(about = "Download a manga from manga.in.ua and assemble PDF volumes")]
#[command(
    after_help = "Config file keys (user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs, concurrency, strict) are read from ./muadl.toml or $XDG_CONFIG_HOME/muadl/config.toml. CLI flags override config."
)]
pub struct Args {
    /// Manga path relative to <base_url>/mangas/ (e.g. boyovik/2252-berserk-berserk.html) or an absolute listing URL.
    #[arg(long = "manga_url", visible_alias = "url")]
    pub manga_url: String,

    /// Site root.
    #[arg(long = "base_url", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Output directory for chapter/batch PDFs. Default: ./<slug>.
    #[arg(long = "result_folder")]
    pub result_folder: Option<PathBuf>,

    /// Directory for downloaded images. Default: ./<slug>_data.
    #[arg(long = "data_folder", short = 'd')]
    pub data_folder: Option<PathBuf>,

    /// Merge every N consecutive chapter PDFs into one file (1-10.pdf, 11-20.pdf, ...).
    #[arg(long = "join_every", value_parser = parse_join_every)]
    pub join_every: Option<u32>,

    /// Path of the fully merged PDF (with --one_file). Default: ./<slug>.pdf.
    #[arg(long = "result_pdf", visible_alias = "pdf")]
    pub result_pdf: Option<PathBuf>,

    /// Merge the whole manga into a single PDF.
    #[arg(long = "one_file")]
    pub one_file: bool,

    /// Keep the temp folder (intermediate chapter PDFs) on completion.
    #[arg(long = "keep_temp")]
    pub keep_temp: bool,

    /// Keep the downloaded-images folder on completion.
    #[arg(long = "keep_data")]
    pub keep_data: bool,

    /// Delete pre-existing target folders instead of failing.
    #[arg(long)]
    pub force: bool,

    /// PDF rendering resolution (DPI).
    #[arg(long, short = 'r', default_value_t = 100.0, value_parser = parse_resolution)]
    pub resolution: f64,

    /// Log level: 0/10 debug, 20 info, 30 warn, 40/50 error.
    #[arg(long = "log_level", default_value_t = 20, value_parser = parse_log_level)]
    pub log_level: u8,

    /// Abort on any permanently failed page or chapter instead of skipping it.
    #[arg(long)]
    pub strict: bool,

    /// Download worker pool size (overrides config; default 4).
    #[arg(long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// HTTP User-Agent (overrides config).
    #[arg(long = "user_agent")]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds, per worker (overrides config; default 1).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,
}

fn parse_join_every(s: &str) -> Result<u32, String> {
    let n: u32 = s
        .parse()
        .map_err(|_| format!("Invalid --join_every: '{}' is not a number", s))?;
    if n == 0 {
        return Err("Invalid --join_every: batch size must be at least 1".to_string());
    }
    Ok(n)
}

fn parse_resolution(s: &str) -> Result<f64, String> {
    let r: f64 = s
        .parse()
        .map_err(|_| format!("Invalid --resolution: '{}' is not a number", s))?;
    if !r.is_finite() || r <= 0.0 {
        return Err(format!("Invalid --resolution: {} (must be > 0)", s));
    }
    Ok(r)
}

fn parse_log_level(s: &str) -> Result<u8, String> {
    match s.parse::<u8>() {
        Ok(n @ (0 | 10 | 20 | 30 | 40 | 50)) => Ok(n),
        _ => Err(format!(
            "Invalid --log_level: '{}'. Use 0, 10, 20, 30, 40, or 50.",
            s
        )),
    }
}

fn parse_concurrency(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("Invalid --concurrency: '{}' is not a number", s))?;
    if n == 0 {
        return Err("Invalid --concurrency: must be at least 1".to_string());
    }
    Ok(n)
}

/// Numeric log level (Python logging scheme) to a level filter.
pub fn level_filter(level: u8) -> log::LevelFilter {
    match level {
        0 => log::LevelFilter::Trace,
        10 => log::LevelFilter::Debug,
        20 => log::LevelFilter::Info,
        30 => log::LevelFilter::Warn,
        _ => log::LevelFilter::Error,
    }
}

/// Which of the three output modes this run uses. one_file wins over join_every.
fn output_plan(args: &Args) -> OutputPlan {
    match (args.one_file, args.join_every) {
        (true, Some(_)) => {
            log::warn!("--one_file overrides --join_every; writing a single PDF");
            OutputPlan::OneFile
        }
        (true, None) => OutputPlan::OneFile,
        (false, Some(n)) => OutputPlan::JoinEvery(n),
        (false, None) => OutputPlan::PerChapter,
    }
}

/// Entry point for the CLI. Returns the run summary on success (possibly with
/// skipped items); Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<RunSummary, CliRunError> {
    let start = Instant::now();
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;

    const DEFAULT_DELAY_SECS: u64 = 1;
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_RETRY_COUNT: u32 = 5;
    const DEFAULT_CONCURRENCY: usize = 4;
    let delay_secs = args
        .delay
        .or_else(|| config.as_ref().and_then(|c| c.request_delay_secs))
        .unwrap_or(DEFAULT_DELAY_SECS);
    let timeout_secs = args
        .timeout
        .or_else(|| config.as_ref().and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let retry_count = config
        .as_ref()
        .and_then(|c| c.retry_count)
        .unwrap_or(DEFAULT_RETRY_COUNT)
        .max(1);
    let retry_backoff_secs = config
        .as_ref()
        .and_then(|c| c.retry_backoff_secs.clone())
        .unwrap_or_else(|| vec![1, 2, 4, 8]);
    let concurrency = args
        .concurrency
        .or_else(|| config.as_ref().and_then(|c| c.concurrency))
        .unwrap_or(DEFAULT_CONCURRENCY)
        .max(1);
    let strict = args.strict || config.as_ref().and_then(|c| c.strict).unwrap_or(false);
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.user_agent.clone()));

    let manga = resolve_manga_url(&args.manga_url, &args.base_url).map_err(|e| match &e {
        ScraperError::InvalidUrl { input, reason } => CliRunError::InvalidInput(format!(
            "Expected a manga path like boyovik/2252-berserk-berserk.html or an absolute listing URL. Invalid: {}: {}",
            input, reason
        )),
        _ => CliRunError::Scraper(e),
    })?;

    let plan = output_plan(args);
    let data_folder = args
        .data_folder
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}_data", manga.slug)));
    let temp_folder = PathBuf::from(format!("{}_temp", manga.slug));
    let result_folder = args
        .result_folder
        .clone()
        .unwrap_or_else(|| PathBuf::from(&manga.slug));
    let result_pdf = args
        .result_pdf
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.pdf", manga.slug)));

    // Conflict checks come before any network activity so a doomed run costs
    // nothing.
    let image_store = ImageStore::new(&data_folder);
    image_store.prepare(args.force)?;
    let needs_temp = !matches!(plan, OutputPlan::PerChapter);
    if needs_temp {
        ensure_absent(&temp_folder, args.force)?;
        std::fs::create_dir_all(&temp_folder).map_err(|e| StoreError::Io {
            path: temp_folder.clone(),
            source: e,
        })?;
    }
    match plan {
        OutputPlan::OneFile => ensure_absent(&result_pdf, args.force)?,
        _ => {
            ensure_absent(&result_folder, args.force)?;
            std::fs::create_dir_all(&result_folder).map_err(|e| StoreError::Io {
                path: result_folder.clone(),
                source: e,
            })?;
        }
    }

    let mut builder = PoliteClient::builder()
        .delay_secs(delay_secs)
        .timeout_secs(timeout_secs)
        .retry_count(retry_count)
        .retry_backoff_secs(retry_backoff_secs);
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    let mut client = builder
        .clone()
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    log::info!("Fetching chapter list from {}", manga.url);
    let mut site = MangaInUaScraper::new(&mut client, &args.base_url)?;
    let mut chapters = site.fetch_chapters(&manga)?;
    let total = chapters.len() as u32;
    log::info!("Found {} chapters", total);

    let mut summary = RunSummary {
        chapters: total,
        ..RunSummary::default()
    };

    let progress = (args.log_level <= 20).then(|| {
        let bar = indicatif::ProgressBar::new(total as u64);
        bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let mut chapter_pdfs: Vec<(u32, PathBuf)> = Vec::new();
    for chapter in &mut chapters {
        if let Some(ref bar) = progress {
            bar.set_message(format!("Chapter {}/{}", chapter.index, total));
        }

        chapter.pages = match site.fetch_pages(&chapter.url) {
            Ok(pages) => pages,
            Err(e) if strict => return Err(e.into()),
            Err(e) => {
                log::warn!("chapter {} skipped: {}", chapter.index, e);
                summary.skipped.push(SkipRecord {
                    chapter: chapter.index,
                    page: None,
                    reason: e.to_string(),
                });
                if let Some(ref bar) = progress {
                    bar.inc(1);
                }
                continue;
            }
        };
        summary.pages += chapter.pages.len() as u32;

        let outcome = store::download_chapter(chapter, &image_store, &builder, concurrency)?;
        log::info!(
            "Chapter {}/{}: downloaded {} of {} pages",
            chapter.index,
            total,
            outcome.saved,
            chapter.pages.len()
        );
        if strict {
            if let Some(first) = outcome.skipped.first() {
                return Err(CliRunError::Strict(format!("Aborting (strict): {}", first)));
            }
        }
        summary.skipped.extend(outcome.skipped);

        let images = image_store.chapter_images(chapter.index)?;
        if images.is_empty() {
            log::warn!("chapter {} skipped: no pages downloaded", chapter.index);
            summary.skipped.push(SkipRecord {
                chapter: chapter.index,
                page: None,
                reason: "no pages downloaded".to_string(),
            });
            if let Some(ref bar) = progress {
                bar.inc(1);
            }
            continue;
        }

        let pdf_dir = if needs_temp { &temp_folder } else { &result_folder };
        let pdf_path = pdf_dir.join(format!("{:03}.pdf", chapter.index));
        let rendered = pdf::render_pdf(&images, &pdf_path, args.resolution, strict)?;
        for skip in rendered.skipped {
            let ordinal = skip
                .path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse().ok());
            summary.skipped.push(SkipRecord {
                chapter: chapter.index,
                page: ordinal,
                reason: format!("unreadable image: {}", skip.reason),
            });
        }
        chapter_pdfs.push((chapter.index, pdf_path));

        if let Some(ref bar) = progress {
            bar.inc(1);
        }
    }
    if let Some(bar) = progress {
        bar.disable_steady_tick();
        bar.finish_and_clear();
    }

    match plan {
        OutputPlan::PerChapter => {}
        OutputPlan::OneFile => {
            let inputs: Vec<PathBuf> = chapter_pdfs.iter().map(|(_, p)| p.clone()).collect();
            log::info!("Merging {} chapters into {}", inputs.len(), result_pdf.display());
            pdf::merge_pdfs(&inputs, &result_pdf)?;
        }
        OutputPlan::JoinEvery(_) => {
            for (first, last) in plan.batch_ranges(total) {
                let inputs: Vec<PathBuf> = chapter_pdfs
                    .iter()
                    .filter(|(i, _)| *i >= first && *i <= last)
                    .map(|(_, p)| p.clone())
                    .collect();
                if inputs.is_empty() {
                    log::warn!("batch {}-{} skipped: no chapter PDFs", first, last);
                    continue;
                }
                let target = result_folder.join(batch_file_name(first, last));
                log::info!("Merging chapters {}-{} into {}", first, last, target.display());
                pdf::merge_pdfs(&inputs, &target)?;
            }
        }
    }

    if needs_temp && !args.keep_temp {
        log::info!("Deleting temp folder: {}", temp_folder.display());
        std::fs::remove_dir_all(&temp_folder).map_err(|e| StoreError::Io {
            path: temp_folder.clone(),
            source: e,
        })?;
    }
    if !args.keep_data {
        log::info!("Deleting data folder: {}", data_folder.display());
        std::fs::remove_dir_all(&data_folder).map_err(|e| StoreError::Io {
            path: data_folder.clone(),
            source: e,
        })?;
    }

    let secs = start.elapsed().as_secs();
    log::info!(
        "Done in {}h {}m {}s",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    );
    if summary.is_partial() {
        log::warn!("Completed with {} skipped item(s):", summary.skipped.len());
        for skip in &summary.skipped {
            log::warn!("  {}", skip);
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn minimal_invocation_and_defaults() {
        let args = parse_args(&["muadl", "--manga_url", "boyovik/2252-berserk-berserk.html"]);
        assert_eq!(args.manga_url, "boyovik/2252-berserk-berserk.html");
        assert_eq!(args.base_url, "https://manga.in.ua");
        assert_eq!(args.resolution, 100.0);
        assert_eq!(args.log_level, 20);
        assert!(!args.one_file && !args.force && !args.strict);
        assert!(args.join_every.is_none());
    }

    #[test]
    fn url_alias_and_short_flags() {
        let args = parse_args(&[
            "muadl", "--url", "x/1.html", "-d", "imgs", "-r", "150.5",
        ]);
        assert_eq!(args.manga_url, "x/1.html");
        assert_eq!(args.data_folder.as_deref(), Some(std::path::Path::new("imgs")));
        assert_eq!(args.resolution, 150.5);
    }

    #[test]
    fn pdf_alias() {
        let args = parse_args(&["muadl", "--url", "x/1.html", "--pdf", "out.pdf", "--one_file"]);
        assert_eq!(args.result_pdf.as_deref(), Some(std::path::Path::new("out.pdf")));
        assert!(args.one_file);
    }

    #[test]
    fn manga_url_is_required() {
        assert!(Args::try_parse_from(["muadl"]).is_err());
    }

    #[test]
    fn parse_join_every_rejects_zero_and_garbage() {
        assert_eq!(parse_join_every("10").unwrap(), 10);
        assert!(parse_join_every("0").is_err());
        assert!(parse_join_every("x").is_err());
    }

    #[test]
    fn parse_resolution_rejects_non_positive() {
        assert_eq!(parse_resolution("100.0").unwrap(), 100.0);
        assert_eq!(parse_resolution("72").unwrap(), 72.0);
        assert!(parse_resolution("0").is_err());
        assert!(parse_resolution("-1").is_err());
        assert!(parse_resolution("nan").is_err());
    }

    #[test]
    fn parse_log_level_accepts_decades_only() {
        for valid in ["0", "10", "20", "30", "40", "50"] {
            assert!(parse_log_level(valid).is_ok());
        }
        assert!(parse_log_level("25").is_err());
        assert!(parse_log_level("60").is_err());
        assert!(parse_log_level("-10").is_err());
    }

    #[test]
    fn level_filter_mapping() {
        assert_eq!(level_filter(0), log::LevelFilter::Trace);
        assert_eq!(level_filter(10), log::LevelFilter::Debug);
        assert_eq!(level_filter(20), log::LevelFilter::Info);
        assert_eq!(level_filter(30), log::LevelFilter::Warn);
        assert_eq!(level_filter(40), log::LevelFilter::Error);
        assert_eq!(level_filter(50), log::LevelFilter::Error);
    }

    #[test]
    fn output_plan_defaults_to_per_chapter() {
        let args = parse_args(&["muadl", "--url", "x/1.html"]);
        assert_eq!(output_plan(&args), OutputPlan::PerChapter);
    }

    #[test]
    fn output_plan_join_every() {
        let args = parse_args(&["muadl", "--url", "x/1.html", "--join_every", "5"]);
        assert_eq!(output_plan(&args), OutputPlan::JoinEvery(5));
    }

    #[test]
    fn output_plan_one_file_wins_over_join_every() {
        let args = parse_args(&[
            "muadl", "--url", "x/1.html", "--join_every", "5", "--one_file",
        ]);
        assert_eq!(output_plan(&args), OutputPlan::OneFile);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Store(StoreError::Conflict {
                path: PathBuf::from("d")
            })
            .exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Scraper(ScraperError::EmptyChapterList).exit_code(),
            2
        );
        assert_eq!(CliRunError::Strict("x".into()).exit_code(), 2);
        assert_eq!(CliRunError::Pdf(PdfError::NoPages).exit_code(), 3);
        assert_eq!(
            CliRunError::Store(StoreError::Io {
                path: PathBuf::from("d"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "x"),
            })
            .exit_code(),
            3
        );
    }
}
