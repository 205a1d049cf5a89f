// Common data models for the acquisition pipeline

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ClassifiedError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// How a URL is turned into an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Video thumbnail when the URL allows it, page render otherwise
    #[default]
    Auto,
    /// Always render the page
    RenderOnly,
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::RenderOnly => write!(f, "render-only"),
        }
    }
}

/// Screenshot settings shared by every acquisition in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    /// Viewport width in pixels
    pub viewport_width: u32,
    /// Viewport height in pixels
    pub viewport_height: u32,
    /// Hard deadline for one acquisition
    pub timeout: Duration,
    /// Directory the original and derived images land in
    pub output_dir: PathBuf,
    pub user_agent: String,
    pub mode: AcquisitionMode,
    /// Browser executable; autodetected when unset
    pub browser_path: Option<PathBuf>,
    /// HTTP/SOCKS5 proxy for thumbnail requests
    pub proxy: Option<String>,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            viewport_width: 800,
            viewport_height: 600,
            timeout: Duration::from_secs(30),
            output_dir: PathBuf::from("."),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            mode: AcquisitionMode::Auto,
            browser_path: None,
            proxy: None,
        }
    }
}

impl ScreenshotConfig {
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_mode(mut self, mode: AcquisitionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_browser_path(mut self, path: Option<PathBuf>) -> Self {
        self.browser_path = path;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Build the request for one journal entry
    pub fn request_for(&self, url: &str, sequence: u32, file_name: &str) -> AcquisitionRequest {
        AcquisitionRequest {
            url: url.to_string(),
            sequence,
            output_path: self.output_dir.join(file_name),
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Everything one acquisition needs; consumed once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    pub url: String,
    /// Day number the URL belongs to, used for error attribution
    pub sequence: u32,
    pub output_path: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub timeout: Duration,
    pub user_agent: String,
}

/// Which strategy produced the image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionSource {
    Thumbnail { video_id: String },
    Render,
}

/// A fully written raster image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub path: PathBuf,
    pub source: AcquisitionSource,
}

impl Acquired {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Either a written image or a classified failure; nothing in between
pub type AcquisitionOutcome = Result<Acquired, ClassifiedError>;

/// A named publishing target with fixed output dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformTarget {
    /// Suffix used in derived file names
    pub key: &'static str,
    /// Display name
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

pub const PLATFORM_TARGETS: [PlatformTarget; 2] = [
    PlatformTarget {
        key: "twitter",
        name: "Twitter/X",
        width: 1200,
        height: 628,
    },
    PlatformTarget {
        key: "linkedin",
        name: "LinkedIn",
        width: 1200,
        height: 627,
    },
];

impl PlatformTarget {
    pub fn find(key: &str) -> Option<&'static PlatformTarget> {
        PLATFORM_TARGETS.iter().find(|t| t.key == key)
    }

    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}
