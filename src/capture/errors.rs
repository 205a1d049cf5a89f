// Error types for the acquisition pipeline
//
// Two layers:
// - CaptureError: raw failures surfaced by the fetcher, renderer and file helpers
// - ClassifiedError: a CaptureError tagged with one category, built once at the
//   orchestration boundary and handed back to the caller

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use super::render::RenderStage;

/// Raw failure from a thumbnail fetch, page render or file operation
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Remote endpoint answered with a non-success status
    #[error("HTTP {status}")]
    HttpStatus { status: u16 },

    /// Transport-level failure from the HTTP client
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A single fetch ran out of time
    #[error("timeout after {}ms fetching {url}", .limit.as_millis())]
    FetchTimeout { url: String, limit: Duration },

    /// Every thumbnail quality tier was unavailable
    #[error("failed to download thumbnail for video ID: {video_id}")]
    ThumbnailUnavailable { video_id: String },

    /// A page render stage failed
    #[error("failed to {stage}: {message}")]
    Render { stage: RenderStage, message: String },

    /// The overall render deadline expired
    #[error("timeout after {}ms: could not {stage}", .limit.as_millis())]
    Deadline { stage: RenderStage, limit: Duration },

    /// Filesystem failure
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Decoding or encoding an image failed
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// Requested output size has a zero dimension
    #[error("invalid target dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

impl CaptureError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn render(stage: RenderStage, message: impl fmt::Display) -> Self {
        Self::Render {
            stage,
            message: message.to_string(),
        }
    }

    /// Structural network signal: the failure happened while talking to a peer
    pub fn is_network(&self) -> bool {
        match self {
            Self::Request(e) => e.is_connect() || e.is_request() || e.is_body(),
            _ => false,
        }
    }

    /// Message including every source in the chain, for diagnostics and classification
    pub fn full_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            let text = err.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = err.source();
        }
        message
    }
}

/// Fixed failure taxonomy, one label per failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    NotFound,
    Forbidden,
    ServerError,
    DnsError,
    NetworkError,
    ConnectionError,
    BrowserError,
    /// Anything no rule recognised
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 9] = [
        Self::Timeout,
        Self::NotFound,
        Self::Forbidden,
        Self::ServerError,
        Self::DnsError,
        Self::NetworkError,
        Self::ConnectionError,
        Self::BrowserError,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::ServerError => "server_error",
            Self::DnsError => "dns_error",
            Self::NetworkError => "network_error",
            Self::ConnectionError => "connection_error",
            Self::BrowserError => "browser_error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a caller may retry a failure of this category
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ServerError | Self::NetworkError | Self::ConnectionError
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assign a category from the failure text and the structural network signal.
///
/// Rules are checked in priority order and the first match wins.
pub fn categorize(message: &str, network_signal: bool) -> ErrorCategory {
    let lower = message.to_lowercase();

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("context deadline exceeded")
        || lower.contains("deadline has elapsed")
    {
        return ErrorCategory::Timeout;
    }

    if lower.contains("404") || lower.contains("not found") {
        return ErrorCategory::NotFound;
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return ErrorCategory::Forbidden;
    }

    if lower.contains("500") || lower.contains("502") || lower.contains("503") || lower.contains("504") {
        return ErrorCategory::ServerError;
    }

    if lower.contains("dns")
        || lower.contains("no such host")
        || lower.contains("name_not_resolved")
        || lower.contains("failed to lookup address")
    {
        return ErrorCategory::DnsError;
    }

    if network_signal {
        return ErrorCategory::NetworkError;
    }

    if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("connection_refused")
        || lower.contains("connection_reset")
    {
        return ErrorCategory::ConnectionError;
    }

    if lower.contains("browser") || lower.contains("launch") {
        return ErrorCategory::BrowserError;
    }

    ErrorCategory::Unknown
}

/// Categorize a raw capture failure
pub fn classify(err: &CaptureError) -> ErrorCategory {
    categorize(&err.full_message(), err.is_network())
}

/// A failure tagged with its category, attributed to one URL and day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    category: ErrorCategory,
    message: String,
    url: String,
    sequence: u32,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

impl ClassifiedError {
    pub fn new(url: impl Into<String>, sequence: u32, err: &CaptureError) -> Self {
        Self {
            category: classify(err),
            message: err.full_message(),
            url: url.into(),
            sequence,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Original underlying message
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "screenshot error (Day {}, {}): {} - {}",
            self.sequence, self.category, self.url, self.message
        )
    }
}

impl StdError for ClassifiedError {}
