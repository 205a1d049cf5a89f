// Thumbnail fetcher - downloads a video thumbnail, best quality first
//
// Tier failures (non-2xx or transport errors) only advance the ladder; the
// caller sees a single failure naming the video once every tier is exhausted.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use super::errors::CaptureError;
use super::ladder::{first_success, Exhausted};
use super::url_kind::VideoId;
use super::utils::PartialFile;

pub const DEFAULT_THUMBNAIL_BASE: &str = "https://img.youtube.com";

/// Per-request timeout for a single tier
const TIER_TIMEOUT: Duration = Duration::from_secs(10);

/// Thumbnail resolutions offered by the image endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    MaxResDefault,
    HqDefault,
    MqDefault,
    Default,
}

impl QualityTier {
    /// Highest to lowest resolution
    pub const LADDER: [QualityTier; 4] = [
        Self::MaxResDefault,
        Self::HqDefault,
        Self::MqDefault,
        Self::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxResDefault => "maxresdefault",
            Self::HqDefault => "hqdefault",
            Self::MqDefault => "mqdefault",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless fetcher; the client is safe to share across concurrent calls
#[derive(Debug, Clone)]
pub struct ThumbnailFetcher {
    client: Client,
    base_url: String,
}

impl ThumbnailFetcher {
    pub fn new() -> Result<Self, CaptureError> {
        Self::with_proxy(None)
    }

    /// Build a fetcher routed through an optional HTTP or SOCKS5 proxy
    pub fn with_proxy(proxy: Option<&str>) -> Result<Self, CaptureError> {
        let mut builder = Client::builder().timeout(TIER_TIMEOUT);
        if let Some(proxy_url) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: DEFAULT_THUMBNAIL_BASE.to_string(),
        })
    }

    /// Point the fetcher at another image endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Deterministic image URL for a video and tier
    pub fn thumbnail_url(&self, video_id: &VideoId, tier: QualityTier) -> String {
        format!("{}/vi/{}/{}.jpg", self.base_url, video_id, tier)
    }

    /// Fetch the best available tier into `dest` before `deadline`.
    ///
    /// Each tier gets `TIER_TIMEOUT` or whatever is left of the deadline,
    /// whichever is shorter. On success exactly one file exists at `dest`;
    /// on failure nothing is left behind.
    pub async fn fetch(
        &self,
        video_id: &VideoId,
        dest: &Path,
        deadline: Instant,
    ) -> Result<QualityTier, CaptureError> {
        match self.walk_ladder(video_id, dest, deadline).await {
            Ok(tier) => Ok(tier),
            Err(exhausted) => {
                debug!(
                    video_id = %video_id,
                    tiers = exhausted.attempts(),
                    "no thumbnail tier available"
                );
                Err(CaptureError::ThumbnailUnavailable {
                    video_id: video_id.to_string(),
                })
            }
        }
    }

    async fn walk_ladder(
        &self,
        video_id: &VideoId,
        dest: &Path,
        deadline: Instant,
    ) -> Result<QualityTier, Exhausted<QualityTier, CaptureError>> {
        first_success("thumbnail", QualityTier::LADDER, move |tier| {
            self.fetch_tier_until(video_id, tier, dest, deadline)
        })
        .await
        .map(|(tier, ())| tier)
    }

    async fn fetch_tier_until(
        &self,
        video_id: &VideoId,
        tier: QualityTier,
        dest: &Path,
        deadline: Instant,
    ) -> Result<(), CaptureError> {
        let now = Instant::now();
        let cutoff = deadline.min(now + TIER_TIMEOUT);
        if cutoff <= now {
            return Err(CaptureError::FetchTimeout {
                url: self.thumbnail_url(video_id, tier),
                limit: Duration::ZERO,
            });
        }

        // a cancelled download drops its partial file, which removes it
        match timeout_at(cutoff, self.fetch_tier(video_id, tier, dest)).await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::FetchTimeout {
                url: self.thumbnail_url(video_id, tier),
                limit: cutoff - now,
            }),
        }
    }

    async fn fetch_tier(
        &self,
        video_id: &VideoId,
        tier: QualityTier,
        dest: &Path,
    ) -> Result<(), CaptureError> {
        let mut response = self.client.get(self.thumbnail_url(video_id, tier)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let mut file = PartialFile::create(dest).await?;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = file.write(&chunk).await {
                        file.discard().await;
                        return Err(e);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    file.discard().await;
                    return Err(e.into());
                }
            }
        }
        file.commit().await.map(|_| ())
    }
}
