// Command-line entry: parses flags, wires the pipeline, runs it over the journal

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use crate::capture::utils::output_files;
use crate::capture::{AcquisitionMode, Acquirer, ChromiumEngine, PageRenderer, ThumbnailFetcher};
use crate::config::{expand_home, parse_duration, Config};
use crate::journal::{DayEntry, Journal};
use crate::runner::{RunSummary, Runner};

#[derive(Debug, Parser)]
#[command(name = "screenshot-tweets")]
#[command(about = "Capture screenshots for journal entries and derive social-media images")]
#[command(version)]
pub struct Cli {
    /// Markdown journal to read and update
    #[arg(short, long, default_value = "README.md")]
    pub file: String,

    /// Directory for screenshots (defaults to the journal's directory)
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Only capture this day
    #[arg(short, long)]
    pub day: Option<u32>,

    /// Viewport width in pixels
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Viewport height in pixels
    #[arg(long, default_value_t = 600)]
    pub height: u32,

    /// Per-acquisition timeout, e.g. 30 or 45s (overrides SCREENSHOT_DEFAULT_TIMEOUT)
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Skip thumbnail lookup and always render the page
    #[arg(long)]
    pub render_only: bool,

    /// Retries for retryable failures (overrides SCREENSHOT_MAX_RETRIES)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Output formats, e.g. original,twitter,linkedin
    #[arg(long, value_delimiter = ',')]
    pub formats: Option<Vec<String>>,

    /// HTTP or SOCKS5 proxy for thumbnail requests
    #[arg(long, env = "SCREENSHOT_PROXY")]
    pub proxy: Option<String>,

    /// Run Chromium without its sandbox (containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// List what would be captured and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    match parse_duration(raw) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(format!("invalid timeout: {}", raw)),
    }
}

impl Cli {
    /// Environment config with command-line overrides applied
    pub fn config(&self) -> Config {
        let mut config = Config::load();
        if let Some(timeout) = self.timeout {
            config.default_timeout = timeout;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(formats) = &self.formats {
            config.output_formats = formats.iter().map(|f| f.trim().to_lowercase()).collect();
        }
        config
    }

    pub fn mode(&self) -> AcquisitionMode {
        if self.render_only {
            AcquisitionMode::RenderOnly
        } else {
            AcquisitionMode::Auto
        }
    }
}

/// Entries to work on: every pending one, or the single requested day
fn select(journal: &Journal, day: Option<u32>) -> Result<Vec<DayEntry>> {
    let Some(day) = day else {
        return Ok(journal.pending().into_iter().cloned().collect());
    };

    let Some(entry) = journal.entry(day) else {
        bail!("day {} not found in {}", day, journal.path().display());
    };
    if entry.url.is_none() {
        bail!("day {} has no URL", day);
    }
    if entry.has_screenshot() {
        warn!(day, "day already has a screenshot, nothing to do");
        return Ok(Vec::new());
    }
    Ok(vec![entry.clone()])
}

pub async fn execute(cli: Cli) -> Result<RunSummary> {
    let config = cli.config();
    config.validate().context("invalid configuration")?;

    let journal_path = expand_home(&cli.file);
    let mut journal = Journal::parse(&journal_path)?;
    let entries = select(&journal, cli.day)?;

    let output_dir = match &cli.output_dir {
        Some(dir) => expand_home(dir),
        None => journal_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let targets = config.platform_targets();

    if cli.dry_run {
        for entry in &entries {
            let files: Vec<String> = output_files(entry.day, &targets)
                .into_iter()
                .map(|(_, name)| name)
                .collect();
            info!(
                day = entry.day,
                url = entry.url.as_deref().unwrap_or_default(),
                files = %files.join(", "),
                "would capture"
            );
        }
        info!(entries = entries.len(), "dry run, nothing captured");
        return Ok(RunSummary::default());
    }

    if entries.is_empty() {
        info!("no entries need screenshots");
        return Ok(RunSummary::default());
    }

    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    let screenshot = config
        .screenshot_config()
        .with_viewport(cli.width, cli.height)
        .with_output_dir(&output_dir)
        .with_mode(cli.mode())
        .with_proxy(cli.proxy.clone());

    let engine = ChromiumEngine::new(screenshot.browser_path.clone()).with_sandbox(!cli.no_sandbox);
    let thumbnails = ThumbnailFetcher::with_proxy(screenshot.proxy.as_deref())?;
    let acquirer = Acquirer::new(thumbnails, PageRenderer::new(Arc::new(engine))).with_mode(screenshot.mode);

    info!(
        entries = entries.len(),
        mode = %acquirer.mode(),
        output_dir = %output_dir.display(),
        "starting capture"
    );

    let runner = Runner::new(acquirer, screenshot, config.retry_policy(), targets);
    let summary = runner.run(&mut journal, &entries).await;

    if !summary.captured.is_empty() {
        journal.save()?;
    }

    for failure in &summary.failed {
        let report = serde_json::to_string(failure).unwrap_or_else(|_| failure.to_string());
        warn!(failure = %report, "entry failed");
    }
    for missing in &summary.unrecorded {
        warn!(day = missing.day, reason = %missing.reason, "images written but not recorded in journal");
    }
    info!(
        captured = summary.captured.len(),
        failed = summary.failed.len(),
        unrecorded = summary.unrecorded.len(),
        "capture finished"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "screenshot-tweets",
            "--file",
            "log.md",
            "--day",
            "4",
            "--timeout",
            "45s",
            "--render-only",
            "--formats",
            "original,Twitter",
        ])
        .unwrap();

        assert_eq!(cli.file, "log.md");
        assert_eq!(cli.day, Some(4));
        assert_eq!(cli.timeout, Some(Duration::from_secs(45)));
        assert_eq!(cli.mode(), AcquisitionMode::RenderOnly);

        let config = cli.config();
        assert_eq!(config.default_timeout, Duration::from_secs(45));
        assert_eq!(config.output_formats, vec!["original", "twitter"]);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["screenshot-tweets"]).unwrap();

        assert_eq!(cli.file, "README.md");
        assert_eq!((cli.width, cli.height), (800, 600));
        assert_eq!(cli.mode(), AcquisitionMode::Auto);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(Cli::try_parse_from(["screenshot-tweets", "--timeout", "0"]).is_err());
    }

    #[test]
    fn test_select_single_day() {
        let journal = Journal::parse_str(
            "log.md",
            "## Day 1\n- URL: https://a.example\nScreen Shot: day-1-screenshot.png\n## Day 2\n- URL: https://b.example\n## Day 3\nnothing\n",
        )
        .unwrap();

        assert_eq!(select(&journal, None).unwrap().len(), 1);
        assert_eq!(select(&journal, Some(2)).unwrap()[0].day, 2);
        assert!(select(&journal, Some(1)).unwrap().is_empty());
        assert!(select(&journal, Some(3)).is_err());
        assert!(select(&journal, Some(9)).is_err());
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("log.md");
        let text = "## Day 1\n- URL: https://example.com/article\n";
        std::fs::write(&journal, text).unwrap();

        let cli = Cli::try_parse_from([
            "screenshot-tweets",
            "--file",
            journal.to_str().unwrap(),
            "--dry-run",
        ])
        .unwrap();

        let summary = execute(cli).await.unwrap();

        assert!(summary.captured.is_empty());
        assert_eq!(std::fs::read_to_string(&journal).unwrap(), text);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
