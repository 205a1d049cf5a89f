// Page renderer adapter - drives an external rendering engine through one
// capture sequence under a single deadline
//
// Sequence: launch, open page, viewport, user agent, navigate, wait for a
// stable render, capture the viewport, write the file. Page and browser are
// released on every exit path, including deadline expiry. Releasing is the
// only work allowed past the deadline; page and browser share one short budget.

mod chromium;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::errors::CaptureError;
use super::models::AcquisitionRequest;
use super::utils::write_atomically;

pub use chromium::ChromiumEngine;

/// Time the page and browser together get to shut down once the sequence is over
const RELEASE_BUDGET: Duration = Duration::from_secs(2);

/// Named step of the render sequence, used in failure messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Launch,
    OpenPage,
    SetViewport,
    SetUserAgent,
    Navigate,
    WaitDom,
    WaitFonts,
    WaitStable,
    Capture,
    Write,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Launch => "launch browser",
            Self::OpenPage => "create page",
            Self::SetViewport => "set viewport",
            Self::SetUserAgent => "set user agent",
            Self::Navigate => "navigate to URL",
            Self::WaitDom => "wait for DOM load",
            Self::WaitFonts => "wait for fonts",
            Self::WaitStable => "wait for content stability",
            Self::Capture => "capture screenshot",
            Self::Write => "write screenshot file",
        };
        f.write_str(text)
    }
}

/// Rendering capability: launches one exclusive browser instance per call
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    async fn launch(&self) -> Result<Box<dyn BrowserSession>, CaptureError>;
}

/// A launched browser instance
#[async_trait]
pub trait BrowserSession: Send {
    async fn open_page(&mut self) -> Result<Box<dyn RenderPage>, CaptureError>;

    /// Shut the browser down; must be called exactly once
    async fn close(self: Box<Self>);
}

/// A controllable page
#[async_trait]
pub trait RenderPage: Send {
    async fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), CaptureError>;
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), CaptureError>;
    async fn navigate(&mut self, url: &str) -> Result<(), CaptureError>;
    async fn wait_for_dom(&mut self) -> Result<(), CaptureError>;
    async fn wait_for_fonts(&mut self) -> Result<(), CaptureError>;
    /// Resolve once no requests have been in flight for `idle`
    async fn wait_for_network_idle(&mut self, idle: Duration) -> Result<(), CaptureError>;
    /// Resolve once the layout has not changed for `settle`
    async fn wait_for_visual_stability(&mut self, settle: Duration) -> Result<(), CaptureError>;
    /// PNG bytes clipped to the viewport
    async fn capture_viewport(&mut self) -> Result<Vec<u8>, CaptureError>;
    async fn close(self: Box<Self>);
}

/// Timings for the composite "stable" condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityConfig {
    pub network_idle: Duration,
    pub visual_settle: Duration,
    /// Fixed delay absorbing late animations
    pub grace: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            network_idle: Duration::from_secs(3),
            visual_settle: Duration::from_secs(1),
            grace: Duration::from_secs(2),
        }
    }
}

/// Adapter running the capture sequence against a `RenderEngine`
#[derive(Clone)]
pub struct PageRenderer {
    engine: Arc<dyn RenderEngine>,
    stability: StabilityConfig,
    release_budget: Duration,
}

impl PageRenderer {
    pub fn new(engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            engine,
            stability: StabilityConfig::default(),
            release_budget: RELEASE_BUDGET,
        }
    }

    pub fn with_stability(mut self, stability: StabilityConfig) -> Self {
        self.stability = stability;
        self
    }

    pub fn with_release_budget(mut self, budget: Duration) -> Self {
        self.release_budget = budget;
        self
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Render `request.url` into `request.output_path` within `request.timeout`
    pub async fn render(&self, request: &AcquisitionRequest) -> Result<(), CaptureError> {
        self.render_until(request, Instant::now() + request.timeout).await
    }

    /// Render against a deadline the caller already started
    pub async fn render_until(&self, request: &AcquisitionRequest, deadline: Instant) -> Result<(), CaptureError> {
        let limit = request.timeout;
        debug!(url = %request.url, engine = self.engine.name(), "rendering page");

        let mut browser = within(deadline, limit, RenderStage::Launch, self.engine.launch()).await?;

        let result = match within(deadline, limit, RenderStage::OpenPage, browser.open_page()).await {
            Ok(mut page) => {
                let written = match self.drive(page.as_mut(), request, deadline).await {
                    // writing still counts against the deadline
                    Ok(bytes) => {
                        within(
                            deadline,
                            limit,
                            RenderStage::Write,
                            write_atomically(&request.output_path, &bytes),
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
                let release_by = Instant::now() + self.release_budget;
                release("page", release_by, page.close()).await;
                release("browser", release_by, browser.close()).await;
                written
            }
            Err(e) => {
                release("browser", Instant::now() + self.release_budget, browser.close()).await;
                Err(e)
            }
        };
        result?;

        info!(url = %request.url, path = %request.output_path.display(), "page rendered");
        Ok(())
    }

    async fn drive(
        &self,
        page: &mut dyn RenderPage,
        request: &AcquisitionRequest,
        deadline: Instant,
    ) -> Result<Vec<u8>, CaptureError> {
        let limit = request.timeout;

        within(
            deadline,
            limit,
            RenderStage::SetViewport,
            page.set_viewport(request.viewport_width, request.viewport_height),
        )
        .await?;
        within(
            deadline,
            limit,
            RenderStage::SetUserAgent,
            page.set_user_agent(&request.user_agent),
        )
        .await?;
        within(deadline, limit, RenderStage::Navigate, page.navigate(&request.url)).await?;

        self.wait_until_stable(page, deadline, limit).await?;

        within(deadline, limit, RenderStage::Capture, page.capture_viewport()).await
    }

    async fn wait_until_stable(
        &self,
        page: &mut dyn RenderPage,
        deadline: Instant,
        limit: Duration,
    ) -> Result<(), CaptureError> {
        within(deadline, limit, RenderStage::WaitDom, page.wait_for_dom()).await?;
        within(deadline, limit, RenderStage::WaitFonts, page.wait_for_fonts()).await?;

        // Busy pages may never go quiet; the idle wait is bounded, not required
        let idle_deadline = deadline.min(Instant::now() + self.stability.network_idle * 2);
        match timeout_at(idle_deadline, page.wait_for_network_idle(self.stability.network_idle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "network idle wait failed, continuing"),
            Err(_) => debug!("network never went idle, continuing"),
        }
        if Instant::now() >= deadline {
            return Err(CaptureError::Deadline {
                stage: RenderStage::WaitStable,
                limit,
            });
        }

        within(
            deadline,
            limit,
            RenderStage::WaitStable,
            page.wait_for_visual_stability(self.stability.visual_settle),
        )
        .await?;

        within(deadline, limit, RenderStage::WaitStable, async {
            tokio::time::sleep(self.stability.grace).await;
            Ok(())
        })
        .await
    }
}

/// Run one stage against the shared deadline
async fn within<T, F>(
    deadline: Instant,
    limit: Duration,
    stage: RenderStage,
    fut: F,
) -> Result<T, CaptureError>
where
    F: std::future::Future<Output = Result<T, CaptureError>>,
{
    if Instant::now() >= deadline {
        return Err(CaptureError::Deadline { stage, limit });
    }
    match timeout_at(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(CaptureError::Render { message, .. })) => Err(CaptureError::Render { stage, message }),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(CaptureError::Deadline { stage, limit }),
    }
}

async fn release(what: &'static str, by: Instant, fut: impl std::future::Future<Output = ()>) {
    if timeout_at(by, fut).await.is_err() {
        warn!(resource = what, "release did not finish in time");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeEngine;
    use super::*;
    use crate::capture::models::ScreenshotConfig;
    use std::path::Path;

    fn request(dir: &Path, timeout: Duration) -> AcquisitionRequest {
        ScreenshotConfig::default()
            .with_output_dir(dir)
            .with_timeout(timeout)
            .request_for("https://example.com/article", 3, "day-3-screenshot.png")
    }

    fn quick() -> StabilityConfig {
        StabilityConfig {
            network_idle: Duration::from_millis(10),
            visual_settle: Duration::from_millis(10),
            grace: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_full_sequence_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let renderer = PageRenderer::new(engine.clone()).with_stability(quick());
        let request = request(dir.path(), Duration::from_secs(30));

        renderer.render(&request).await.unwrap();

        assert_eq!(
            engine.calls(),
            vec![
                "launch",
                "open_page",
                "set_viewport",
                "set_user_agent",
                "navigate",
                "wait_for_dom",
                "wait_for_fonts",
                "wait_for_network_idle",
                "wait_for_visual_stability",
                "capture_viewport",
                "close_page",
                "close_browser",
            ]
        );
        assert_eq!(std::fs::read(&request.output_path).unwrap(), b"\x89PNG fake");
    }

    #[tokio::test]
    async fn test_failed_stage_releases_resources() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine {
            fail_at: Some("wait_for_fonts"),
            ..Default::default()
        });
        let renderer = PageRenderer::new(engine.clone()).with_stability(quick());
        let request = request(dir.path(), Duration::from_secs(30));

        let err = renderer.render(&request).await.unwrap_err();

        assert_eq!(err.to_string(), "failed to wait for fonts: wait_for_fonts exploded");
        let calls = engine.calls();
        assert!(!calls.contains(&"capture_viewport".to_string()));
        assert_eq!(&calls[calls.len() - 2..], &["close_page", "close_browser"]);
        assert!(!request.output_path.exists());
    }

    #[tokio::test]
    async fn test_launch_failure_is_browser_stage() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine {
            fail_launch: true,
            ..Default::default()
        });
        let renderer = PageRenderer::new(engine.clone());

        let err = renderer.render(&request(dir.path(), Duration::from_secs(30))).await.unwrap_err();

        assert_eq!(err.to_string(), "failed to launch browser: no executable");
        assert_eq!(engine.calls(), vec!["launch"]);
    }

    #[tokio::test]
    async fn test_deadline_aborts_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine {
            hang_at: Some("navigate"),
            ..Default::default()
        });
        let renderer = PageRenderer::new(engine.clone()).with_stability(quick());
        let request = request(dir.path(), Duration::from_millis(200));

        let err = renderer.render(&request).await.unwrap_err();

        assert!(matches!(
            err,
            CaptureError::Deadline {
                stage: RenderStage::Navigate,
                ..
            }
        ));
        assert!(err.to_string().starts_with("timeout"));
        let calls = engine.calls();
        assert_eq!(&calls[calls.len() - 2..], &["close_page", "close_browser"]);
        assert!(!request.output_path.exists());
    }

    #[tokio::test]
    async fn test_network_idle_hang_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine {
            hang_at: Some("wait_for_network_idle"),
            ..Default::default()
        });
        let renderer = PageRenderer::new(engine.clone()).with_stability(quick());
        let request = request(dir.path(), Duration::from_secs(30));

        renderer.render(&request).await.unwrap();

        assert!(engine.calls().contains(&"capture_viewport".to_string()));
        assert!(request.output_path.exists());
    }

    #[tokio::test]
    async fn test_stuck_release_shares_one_budget() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine {
            hang_at: Some("navigate"),
            hang_release: true,
            ..Default::default()
        });
        let renderer = PageRenderer::new(engine.clone())
            .with_stability(quick())
            .with_release_budget(Duration::from_millis(100));
        let request = request(dir.path(), Duration::from_millis(200));
        let started = Instant::now();

        let err = renderer.render(&request).await.unwrap_err();

        assert!(matches!(err, CaptureError::Deadline { .. }));
        // deadline plus one shared release window, not one per resource
        assert!(started.elapsed() < Duration::from_millis(380));
        let calls = engine.calls();
        assert_eq!(&calls[calls.len() - 2..], &["close_page", "close_browser"]);
    }

    #[tokio::test]
    async fn test_expired_deadline_starts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let renderer = PageRenderer::new(engine.clone()).with_stability(quick());
        let request = request(dir.path(), Duration::from_secs(30));

        let err = renderer
            .render_until(&request, Instant::now() - Duration::from_millis(1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CaptureError::Deadline {
                stage: RenderStage::Launch,
                ..
            }
        ));
        assert!(engine.calls().is_empty());
        assert!(!request.output_path.exists());
    }

    #[test]
    fn test_stage_messages() {
        assert_eq!(RenderStage::Launch.to_string(), "launch browser");
        assert_eq!(RenderStage::WaitStable.to_string(), "wait for content stability");
    }
}
