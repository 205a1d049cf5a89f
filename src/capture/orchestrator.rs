// Acquisition orchestrator - thumbnail first when the URL allows it,
// page render otherwise
//
// Classification of failures happens here and nowhere below.

use std::fmt;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::errors::{CaptureError, ClassifiedError};
use super::ladder::first_success;
use super::models::{Acquired, AcquisitionMode, AcquisitionOutcome, AcquisitionRequest, AcquisitionSource};
use super::render::{PageRenderer, RenderStage};
use super::thumbnail::ThumbnailFetcher;
use super::url_kind::{classify_url, UrlKind, VideoId};

/// One rung of the acquisition ladder
#[derive(Debug, Clone)]
enum Strategy {
    Thumbnail(VideoId),
    Render,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thumbnail(id) => write!(f, "thumbnail({})", id),
            Self::Render => write!(f, "render"),
        }
    }
}

/// Turns a URL into an image file, picking the cheapest strategy that works
#[derive(Clone)]
pub struct Acquirer {
    thumbnails: ThumbnailFetcher,
    renderer: PageRenderer,
    mode: AcquisitionMode,
}

impl Acquirer {
    pub fn new(thumbnails: ThumbnailFetcher, renderer: PageRenderer) -> Self {
        Self {
            thumbnails,
            renderer,
            mode: AcquisitionMode::Auto,
        }
    }

    pub fn with_mode(mut self, mode: AcquisitionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    fn strategies(&self, url: &str) -> Vec<Strategy> {
        if self.mode == AcquisitionMode::RenderOnly {
            return vec![Strategy::Render];
        }

        match classify_url(url) {
            UrlKind::VideoHost(id) => vec![Strategy::Thumbnail(id), Strategy::Render],
            UrlKind::UnresolvedVideoHost => {
                debug!(url, "video host URL without an ID, rendering");
                vec![Strategy::Render]
            }
            UrlKind::Generic => vec![Strategy::Render],
        }
    }

    /// Acquire one image for `request`.
    ///
    /// Success means `request.output_path` holds a complete image. Failure
    /// is the last strategy's error, classified and attributed to the URL.
    /// All strategies share one deadline of `request.timeout`.
    pub async fn acquire(&self, request: &AcquisitionRequest) -> AcquisitionOutcome {
        let strategies = self.strategies(&request.url);
        let deadline = Instant::now() + request.timeout;

        let result = first_success("acquisition", strategies, move |strategy| {
            self.attempt(strategy, request, deadline)
        })
        .await;

        match result {
            Ok((_, source)) => Ok(Acquired {
                path: request.output_path.clone(),
                source,
            }),
            Err(exhausted) => {
                // the ladder always ends with a render, so there is a last failure
                let err = exhausted
                    .into_last()
                    .map(|(_, err)| err)
                    .unwrap_or_else(|| CaptureError::render(RenderStage::Launch, "no acquisition strategy"));
                let classified = ClassifiedError::new(&request.url, request.sequence, &err);
                warn!(
                    category = %classified.category(),
                    url = %request.url,
                    sequence = request.sequence,
                    error = %classified.message(),
                    "acquisition failed"
                );
                Err(classified)
            }
        }
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        request: &AcquisitionRequest,
        deadline: Instant,
    ) -> Result<AcquisitionSource, CaptureError> {
        match strategy {
            Strategy::Thumbnail(id) => {
                let tier = self.thumbnails.fetch(&id, &request.output_path, deadline).await?;
                debug!(video_id = %id, %tier, "thumbnail saved");
                Ok(AcquisitionSource::Thumbnail {
                    video_id: id.to_string(),
                })
            }
            Strategy::Render => {
                self.renderer.render_until(request, deadline).await?;
                Ok(AcquisitionSource::Render)
            }
        }
    }
}
