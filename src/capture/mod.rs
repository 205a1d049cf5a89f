// Screenshot acquisition and adaptation
//
// Architecture:
// - url_kind: picks thumbnail or render for a URL
// - thumbnail: quality-tier ladder against the image endpoint
// - render: adapter over a headless browser engine
// - orchestrator: thumbnail-then-render, classifies failures
// - retry: backoff policy for callers that retry
// - resize: fixed-size platform images from one original

pub mod errors;
pub mod ladder;
pub mod models;
pub mod orchestrator;
pub mod render;
pub mod resize;
pub mod retry;
pub mod thumbnail;
pub mod url_kind;
pub mod utils;

pub use errors::{CaptureError, ClassifiedError, ErrorCategory};
pub use models::{
    Acquired, AcquisitionMode, AcquisitionOutcome, AcquisitionRequest, AcquisitionSource,
    PlatformTarget, ScreenshotConfig, PLATFORM_TARGETS,
};
pub use orchestrator::Acquirer;
pub use render::{ChromiumEngine, PageRenderer, RenderEngine, StabilityConfig};
pub use retry::RetryPolicy;
pub use thumbnail::ThumbnailFetcher;
pub use url_kind::{classify_url, UrlKind};
