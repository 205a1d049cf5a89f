// Batch runner - captures every pending journal entry
//
// Per entry: acquire (retrying retryable failures with backoff), derive the
// platform images off the async runtime, then record the screenshot line.
// Entries run one after another; each acquisition owns its browser.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::capture::errors::{CaptureError, ClassifiedError};
use crate::capture::resize::derive_targets;
use crate::capture::utils::{base_name, original_file_name};
use crate::capture::{Acquired, AcquisitionSource, Acquirer, PlatformTarget, RetryPolicy, ScreenshotConfig};
use crate::journal::{DayEntry, Journal};

/// A day whose images were all written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Captured {
    pub day: u32,
    pub url: String,
    pub original: PathBuf,
    pub derived: Vec<PathBuf>,
    pub source: AcquisitionSource,
    /// Acquisition calls made, retries included
    pub attempts: u32,
}

/// What a run did
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub captured: Vec<Captured>,
    pub failed: Vec<ClassifiedError>,
    /// Days whose images were written but whose journal line could not be added
    pub unrecorded: Vec<Unrecorded>,
}

/// A captured day the journal does not reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unrecorded {
    pub day: u32,
    pub reason: String,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.unrecorded.is_empty()
    }
}

pub struct Runner {
    acquirer: Acquirer,
    screenshot: ScreenshotConfig,
    policy: RetryPolicy,
    targets: Vec<PlatformTarget>,
}

impl Runner {
    pub fn new(
        acquirer: Acquirer,
        screenshot: ScreenshotConfig,
        policy: RetryPolicy,
        targets: Vec<PlatformTarget>,
    ) -> Self {
        Self {
            acquirer,
            screenshot,
            policy,
            targets,
        }
    }

    /// Acquire with caller-side retries; every call is a fresh acquisition
    pub async fn acquire_with_retry(&self, day: u32, url: &str) -> Result<(Acquired, u32), ClassifiedError> {
        let request = self.screenshot.request_for(url, day, &original_file_name(day));
        let mut attempt = 0;

        loop {
            match self.acquirer.acquire(&request).await {
                Ok(acquired) => return Ok((acquired, attempt + 1)),
                Err(e) if self.policy.should_retry(&e, attempt) => {
                    let delay = self.policy.delay(attempt);
                    info!(
                        day,
                        category = %e.category(),
                        retry = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "retrying acquisition"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Acquire one day and derive its platform images
    pub async fn capture(&self, day: u32, url: &str) -> Result<Captured, ClassifiedError> {
        let (acquired, attempts) = self.acquire_with_retry(day, url).await?;

        let original = acquired.path.clone();
        let base = base_name(day);
        let targets = self.targets.clone();
        let source_path = original.clone();
        let derived = tokio::task::spawn_blocking(move || derive_targets(&source_path, &base, &targets))
            .await
            .map_err(|e| CaptureError::io("resize task failed", std::io::Error::other(e)))
            .and_then(|result| result)
            .map_err(|e| {
                let classified = ClassifiedError::new(url, day, &e);
                warn!(day, url, error = %classified.message(), "deriving platform images failed");
                classified
            })?;

        Ok(Captured {
            day,
            url: url.to_string(),
            original,
            derived,
            source: acquired.source,
            attempts,
        })
    }

    /// Capture `entries` and record each success in `journal`
    pub async fn run(&self, journal: &mut Journal, entries: &[DayEntry]) -> RunSummary {
        let mut summary = RunSummary::default();

        for entry in entries {
            let Some(url) = entry.url.as_deref() else {
                continue;
            };
            info!(day = entry.day, url, "capturing");

            match self.capture(entry.day, url).await {
                Ok(captured) => {
                    let file_name = original_file_name(entry.day);
                    if let Err(e) = journal.record_screenshot(entry.day, &file_name) {
                        warn!(day = entry.day, error = %e, "could not record screenshot in journal");
                        summary.unrecorded.push(Unrecorded {
                            day: entry.day,
                            reason: e.to_string(),
                        });
                    }
                    summary.captured.push(captured);
                }
                Err(e) => summary.failed.push(e),
            }
        }

        summary
    }
}
