//! Image acceptance: static URL predicates plus a live probe.
//!
//! Most rejected images never reach the network. The predicates here catch
//! CI badges, coverage shields, status pixels, platform placeholders and
//! icon-looking filenames by substring. Only URLs that survive them are
//! probed, and the probe reads headers only.

use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::cache::CLIENT_IDENTITY;
use crate::error::PipelineError;

/// Non-preview asset hosts and filenames, matched as lowercase substrings.
pub const DEFAULT_BLACKLIST: &[&str] = &[
    "img.shields.io",
    "badge.svg",
    "travis-ci.org",
    "circleci.com",
    "opencollective.com",
    "github-readme-stats",
    "codacy.com",
    "codecov.io",
    "coveralls.io",
    "npmify.js",
    "hits.dwyl.com",
    "fossa.com",
    "lgtm.com",
    "sonarcloud.io",
    "snyk.io",
];

/// Image proxies that embed the original URL hex-encoded in their path.
const PROXY_HOSTS: &[&str] = &["camo.githubusercontent.com", "raw.githubusercontent.com"];

/// Hex spellings of "badge", "shield", "Hacker News" and "Show HN".
const HEX_BLACKLIST: &[&str] = &[
    "6261646765",
    "736869656c64",
    "4861636b6572204e657773",
    "53686f7720484e",
];

/// Platform-default social previews; never a real screenshot.
pub const PLACEHOLDER_PATTERNS: &[&str] = &[
    "opengraph.githubassets.com",
    "github.com/identicons/",
    "camo.githubusercontent.com",
];

/// Filename terms that mark decorative images in documentation.
pub const BADGE_FILENAME_TERMS: &[&str] = &["badge", "shield", "logo", "icon"];

/// Filename terms that suggest a preview screenshot.
pub const DEFAULT_PREVIEW_KEYWORDS: &[&str] = &[
    "timeline",
    "dashboard",
    "screenshot",
    "demo",
    "graph",
    "preview",
    "result",
    "example",
];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];

/// A static URL predicate. `true` means the URL is not a usable preview.
pub trait ImageFilter {
    fn rejects(&self, url: &str) -> bool;
}

/// Known badge, shield and analytics asset patterns.
#[derive(Debug, Clone)]
pub struct AssetBlacklist {
    terms: Vec<String>,
}

impl Default for AssetBlacklist {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl AssetBlacklist {
    /// The built-in terms plus `extra`.
    pub fn new(extra: &[String]) -> Self {
        let terms = DEFAULT_BLACKLIST
            .iter()
            .map(|t| t.to_string())
            .chain(extra.iter().map(|t| t.trim().to_lowercase()))
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    fn matches_terms(&self, lowered: &str) -> bool {
        self.terms.iter().any(|term| lowered.contains(term.as_str()))
    }
}

impl ImageFilter for AssetBlacklist {
    fn rejects(&self, url: &str) -> bool {
        let lowered = url.to_lowercase();
        if self.matches_terms(&lowered) {
            return true;
        }
        if PROXY_HOSTS.iter().any(|host| lowered.contains(host))
            && HEX_BLACKLIST.iter().any(|hex| lowered.contains(hex))
        {
            return true;
        }
        match urlencoding::decode(url) {
            Ok(decoded) if decoded != url => self.matches_terms(&decoded.to_lowercase()),
            _ => false,
        }
    }
}

/// Generic social-preview placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderFilter;

impl ImageFilter for PlaceholderFilter {
    fn rejects(&self, url: &str) -> bool {
        let lowered = url.to_lowercase();
        PLACEHOLDER_PATTERNS.iter().any(|p| lowered.contains(p))
    }
}

/// Decorative images judged by their filename.
#[derive(Debug, Clone, Copy, Default)]
pub struct BadgeFilenameFilter;

impl ImageFilter for BadgeFilenameFilter {
    fn rejects(&self, url: &str) -> bool {
        let lowered = url.to_lowercase();
        BADGE_FILENAME_TERMS.iter().any(|t| lowered.contains(t))
    }
}

/// A live check that a URL serves an image worth showing.
pub trait ImageProbe {
    /// Fail closed: any error is `false`.
    async fn probe(&self, url: &str) -> bool;
}

/// Image settings shared by the extractor and the image cleanup stage.
#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub timeout: Duration,
    /// Raster payloads smaller than this are treated as icons.
    pub min_bytes: u64,
    pub extra_blacklist: Vec<String>,
    pub preview_keywords: Vec<String>,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            min_bytes: 2000,
            extra_blacklist: Vec::new(),
            preview_keywords: DEFAULT_PREVIEW_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

/// HTTP probe: a GET whose body is dropped once headers arrive.
#[derive(Debug, Clone)]
pub struct HttpImageProbe {
    client: reqwest::Client,
    min_bytes: u64,
}

impl HttpImageProbe {
    pub fn new(settings: &ImageSettings) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(CLIENT_IDENTITY)
            .build()?;
        Ok(Self::with_client(client, settings.min_bytes))
    }

    pub fn with_client(client: reqwest::Client, min_bytes: u64) -> Self {
        Self { client, min_bytes }
    }
}

impl ImageProbe for HttpImageProbe {
    async fn probe(&self, url: &str) -> bool {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(%url, error = %e, "Image probe failed");
                return false;
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        drop(response);

        let extension = image_extension(url);
        let is_svg = extension.as_deref() == Some("svg") || content_type.starts_with("image/svg+xml");
        let looks_like_image = content_type.starts_with("image/") || extension.is_some();

        let accepted = status.is_success()
            && looks_like_image
            && (is_svg || content_length.is_none_or(|len| len >= self.min_bytes));
        debug!(
            %url,
            %status,
            %content_type,
            ?content_length,
            accepted,
            "Probed image"
        );
        accepted
    }
}

/// Lowercased image extension of the URL's path, if it has a known one.
fn image_extension(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_lowercase(),
        Err(_) => url.to_lowercase(),
    };
    let (_, extension) = path.rsplit_once('.')?;
    IMAGE_EXTENSIONS
        .contains(&extension)
        .then(|| extension.to_string())
}

/// Blacklist first, probe second.
#[derive(Debug, Clone)]
pub struct ImageValidator<P> {
    blacklist: AssetBlacklist,
    probe: P,
}

impl<P: ImageProbe> ImageValidator<P> {
    pub fn new(blacklist: AssetBlacklist, probe: P) -> Self {
        Self { blacklist, probe }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Whether `url` is worth keeping as a record's preview image.
    pub async fn is_usable_image(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }
        if self.blacklist.rejects(url) {
            debug!(%url, "Image blacklisted");
            return false;
        }
        self.probe.probe(url).await
    }
}

#[cfg(test)]
pub(crate) mod stubs {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    /// Accepts a fixed set of URLs and records every probe.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingProbe {
        accept: HashSet<String>,
        pub(crate) probed: Mutex<Vec<String>>,
    }

    impl RecordingProbe {
        pub(crate) fn accepting(urls: &[&str]) -> Self {
            Self {
                accept: urls.iter().map(|u| u.to_string()).collect(),
                probed: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn probed(&self) -> Vec<String> {
            self.probed.lock().unwrap().clone()
        }
    }

    impl ImageProbe for RecordingProbe {
        async fn probe(&self, url: &str) -> bool {
            self.probed.lock().unwrap().push(url.to_string());
            self.accept.contains(url)
        }
    }
}
