// URL classification - picks the acquisition strategy for a URL
//
// Classification ("looks like a video host") and ID extraction are separate
// steps: a URL can match a video-host shape and still carry no usable ID.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VIDEO_HOST_RE: Regex = Regex::new(
        r"^https?://(www\.|m\.)?(youtube\.com/watch\?|youtu\.be/|youtube\.com/embed/)"
    )
    .unwrap();
    static ref VIDEO_ID_RES: Vec<Regex> = vec![
        Regex::new(r"youtube\.com/watch\?(?:[^#]*&)?v=([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)").unwrap(),
        Regex::new(r"youtu\.be/([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)").unwrap(),
        Regex::new(r"youtube\.com/embed/([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)").unwrap(),
    ];
}

/// An 11-character video identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of resource a URL points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlKind {
    /// Any page; must be rendered
    Generic,
    /// Video page with an extracted identifier
    VideoHost(VideoId),
    /// Video-host shape whose identifier could not be extracted
    UnresolvedVideoHost,
}

impl UrlKind {
    pub fn video_id(&self) -> Option<&VideoId> {
        match self {
            Self::VideoHost(id) => Some(id),
            _ => None,
        }
    }
}

/// Check whether the URL has a known video-host shape
pub fn is_video_host(url: &str) -> bool {
    VIDEO_HOST_RE.is_match(url.trim())
}

/// Pull the video identifier out of any supported URL form
pub fn extract_video_id(url: &str) -> Option<VideoId> {
    VIDEO_ID_RES
        .iter()
        .find_map(|re| re.captures(url.trim()))
        .and_then(|caps| caps.get(1))
        .map(|m| VideoId(m.as_str().to_string()))
}

/// Classify a URL; never fails, malformed input is `Generic`
pub fn classify_url(url: &str) -> UrlKind {
    if !is_video_host(url) {
        return UrlKind::Generic;
    }

    match extract_video_id(url) {
        Some(id) => UrlKind::VideoHost(id),
        None => UrlKind::UnresolvedVideoHost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> UrlKind {
        UrlKind::VideoHost(VideoId(s.to_string()))
    }

    #[test]
    fn test_long_form() {
        assert_eq!(
            classify_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            id("dQw4w9WgXcQ")
        );
        assert_eq!(
            classify_url("http://youtube.com/watch?v=dQw4w9WgXcQ&t=42s&list=PL123"),
            id("dQw4w9WgXcQ")
        );
        assert_eq!(
            classify_url("https://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"),
            id("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_short_link() {
        assert_eq!(classify_url("https://youtu.be/Kf5-HWJPTIE"), id("Kf5-HWJPTIE"));
        assert_eq!(
            classify_url("https://youtu.be/Kf5-HWJPTIE?si=abc123&t=10"),
            id("Kf5-HWJPTIE")
        );
    }

    #[test]
    fn test_embed_link() {
        assert_eq!(
            classify_url("https://www.youtube.com/embed/a_b-C1d2E3f?autoplay=1"),
            id("a_b-C1d2E3f")
        );
    }

    #[test]
    fn test_video_host_without_id() {
        assert_eq!(classify_url("https://youtu.be/short"), UrlKind::UnresolvedVideoHost);
        assert_eq!(
            classify_url("https://www.youtube.com/watch?list=PL123"),
            UrlKind::UnresolvedVideoHost
        );
        // twelve characters is not an ID
        assert_eq!(
            classify_url("https://youtu.be/Kf5-HWJPTIEx"),
            UrlKind::UnresolvedVideoHost
        );
    }

    #[test]
    fn test_generic_urls() {
        for url in [
            "https://example.com/article",
            "https://vimeo.com/123456",
            "https://www.youtube.com/@channel",
            "https://notyoutube.com/watch?v=dQw4w9WgXcQ",
            "ftp://youtu.be/Kf5-HWJPTIE",
            "invalid-url",
            "",
            "   ",
        ] {
            assert_eq!(classify_url(url), UrlKind::Generic, "url: {:?}", url);
        }
    }

    #[test]
    fn test_extraction_independent_of_classification() {
        // extraction works on fragments the classifier rejects
        assert_eq!(
            extract_video_id("see youtu.be/Kf5-HWJPTIE").map(|v| v.to_string()),
            Some("Kf5-HWJPTIE".to_string())
        );
        assert!(extract_video_id("https://example.com/article").is_none());
    }
}
