// Headless Chromium engine over the DevTools protocol

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{BrowserSession, RenderEngine, RenderPage, RenderStage};
use crate::capture::errors::CaptureError;

const BROWSER_ARGS: [&str; 5] = [
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Poll interval while waiting for the network to go quiet
const IDLE_POLL: Duration = Duration::from_millis(100);

const DOM_READY_JS: &str = r#"
    new Promise(resolve => {
        if (document.readyState === 'complete') {
            resolve(true);
        } else {
            window.addEventListener('load', () => resolve(true), { once: true });
        }
    })
"#;

const FONTS_READY_JS: &str = "document.fonts.ready.then(() => true)";


/// Resolves after `settle` ms pass without a DOM mutation
fn visual_settle_js(settle: Duration) -> String {
    format!(
        r#"
        new Promise(resolve => {{
            const settle = {};
            let timer;
            const observer = new MutationObserver(() => {{
                clearTimeout(timer);
                timer = setTimeout(done, settle);
            }});
            function done() {{
                observer.disconnect();
                resolve(true);
            }}
            observer.observe(document, {{ subtree: true, childList: true, attributes: true, characterData: true }});
            timer = setTimeout(done, settle);
        }})
        "#,
        settle.as_millis()
    )
}

/// Launches a fresh headless Chromium for every render
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    executable: Option<PathBuf>,
    sandbox: bool,
}

impl ChromiumEngine {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self {
            executable,
            sandbox: true,
        }
    }

    /// Containers without user namespaces need the sandbox off
    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    fn browser_config(&self) -> Result<BrowserConfig, CaptureError> {
        let mut builder = BrowserConfig::builder().args(BROWSER_ARGS);
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        builder
            .build()
            .map_err(|e| CaptureError::render(RenderStage::Launch, e))
    }
}

impl Default for ChromiumEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn launch(&self) -> Result<Box<dyn BrowserSession>, CaptureError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CaptureError::render(RenderStage::Launch, e))?;

        // The CDP connection only makes progress while the handler is polled
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "cdp handler error");
                }
            }
        });

        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
        }))
    }
}

/// Requests the page has sent and not yet finished
#[derive(Debug)]
struct NetworkActivity {
    in_flight: HashSet<String>,
    last_change: Instant,
}

impl NetworkActivity {
    fn new() -> Self {
        Self {
            in_flight: HashSet::new(),
            last_change: Instant::now(),
        }
    }

    fn started(&mut self, request_id: &str) {
        // redirects reuse the id of the request they replace
        self.in_flight.insert(request_id.to_string());
        self.last_change = Instant::now();
    }

    fn ended(&mut self, request_id: &str) {
        if self.in_flight.remove(request_id) {
            self.last_change = Instant::now();
        }
    }

    /// How long nothing has been in flight, if nothing is
    fn quiet_for(&self, now: Instant) -> Option<Duration> {
        self.in_flight
            .is_empty()
            .then(|| now.saturating_duration_since(self.last_change))
    }
}

type SharedActivity = Arc<Mutex<NetworkActivity>>;

fn lock(activity: &SharedActivity) -> std::sync::MutexGuard<'_, NetworkActivity> {
    activity.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Follow the page's request lifecycle events until the page goes away
async fn track_network(page: &Page, activity: SharedActivity) -> Result<JoinHandle<()>, CaptureError> {
    let listen_err = |e: CdpError| CaptureError::render(RenderStage::OpenPage, e);
    let mut sent = page.event_listener::<EventRequestWillBeSent>().await.map_err(listen_err)?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await.map_err(listen_err)?;
    let mut failed = page.event_listener::<EventLoadingFailed>().await.map_err(listen_err)?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = sent.next() => lock(&activity).started(event.request_id.inner()),
                Some(event) = finished.next() => lock(&activity).ended(event.request_id.inner()),
                Some(event) = failed.next() => lock(&activity).ended(event.request_id.inner()),
                else => break,
            }
        }
    }))
}

struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open_page(&mut self) -> Result<Box<dyn RenderPage>, CaptureError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| CaptureError::render(RenderStage::OpenPage, e))?;
        let network = Arc::new(Mutex::new(NetworkActivity::new()));
        let tracker = track_network(&page, network.clone()).await?;
        Ok(Box::new(ChromiumPage {
            page,
            network,
            tracker,
        }))
    }

    async fn close(mut self: Box<Self>) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "failed to close browser cleanly");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "failed to reap browser process");
        }
        self.handler_task.abort();
    }
}

struct ChromiumPage {
    page: Page,
    network: SharedActivity,
    tracker: JoinHandle<()>,
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(&self, stage: RenderStage, js: &str) -> Result<T, CaptureError> {
        let params = EvaluateParams::builder()
            .expression(js)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| CaptureError::render(stage, e))?;

        self.page
            .evaluate_expression(params)
            .await
            .map_err(|e| CaptureError::render(stage, e))?
            .into_value()
            .map_err(|e| CaptureError::render(stage, e))
    }
}

#[async_trait]
impl RenderPage for ChromiumPage {
    async fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
        let params = SetDeviceMetricsOverrideParams::new(i64::from(width), i64::from(height), 1.0, false);
        self.page
            .execute(params)
            .await
            .map_err(|e| CaptureError::render(RenderStage::SetViewport, e))?;
        Ok(())
    }

    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), CaptureError> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(|e| CaptureError::render(RenderStage::SetUserAgent, e))?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), CaptureError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| CaptureError::render(RenderStage::Navigate, e))?;
        Ok(())
    }

    async fn wait_for_dom(&mut self) -> Result<(), CaptureError> {
        self.eval::<bool>(RenderStage::WaitDom, DOM_READY_JS).await.map(|_| ())
    }

    async fn wait_for_fonts(&mut self) -> Result<(), CaptureError> {
        self.eval::<bool>(RenderStage::WaitFonts, FONTS_READY_JS).await.map(|_| ())
    }

    async fn wait_for_network_idle(&mut self, idle: Duration) -> Result<(), CaptureError> {
        loop {
            let quiet = lock(&self.network).quiet_for(Instant::now());
            if matches!(quiet, Some(quiet) if quiet >= idle) {
                return Ok(());
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    async fn wait_for_visual_stability(&mut self, settle: Duration) -> Result<(), CaptureError> {
        self.eval::<bool>(RenderStage::WaitStable, &visual_settle_js(settle))
            .await
            .map(|_| ())
    }

    async fn capture_viewport(&mut self) -> Result<Vec<u8>, CaptureError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::render(RenderStage::Capture, e))
    }

    async fn close(self: Box<Self>) {
        self.tracker.abort();
        if let Err(e) = self.page.close().await {
            warn!(error = %e, "failed to close page");
        }
    }
}
