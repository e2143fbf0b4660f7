//! Fallback image discovery on source hosting pages.
//!
//! Repository pages rarely carry a real preview in their meta tags; their
//! README usually embeds screenshots instead. Candidates are collected from
//! the documentation section, ranked by a [`CandidateScorer`], resolved to
//! absolute raw-content URLs and stripped of badge-looking filenames. The
//! caller validates them in order and keeps the first that passes.

use std::cmp::Reverse;

use itertools::Itertools;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::error::PipelineError;
use crate::metadata::images::{BadgeFilenameFilter, ImageFilter};

/// A code hosting platform whose pages get fallback image discovery.
#[derive(Debug, Clone)]
pub struct SourceHost {
    pub host: String,
    /// Host serving raw file contents, `owner/repo/branch/path`.
    pub raw_host: String,
    /// Branch assumed for path-relative README images.
    pub default_branch: String,
    /// CSS selector of the rendered long-form documentation.
    pub doc_selector: String,
}

impl Default for SourceHost {
    fn default() -> Self {
        Self::github()
    }
}

impl SourceHost {
    pub fn github() -> Self {
        Self {
            host: "github.com".to_string(),
            raw_host: "raw.githubusercontent.com".to_string(),
            default_branch: "main".to_string(),
            doc_selector: ".markdown-body".to_string(),
        }
    }

    /// Whether `url` is a page on this platform.
    pub fn matches(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| {
            host == self.host || host.strip_prefix("www.") == Some(self.host.as_str())
        })
    }

    /// Resolve an `<img src>` found on `page` into an absolute URL.
    ///
    /// Root-relative paths resolve against the page origin. Path-relative
    /// paths are read as repository files on the default branch of the raw
    /// host. `data:` URIs yield `None`.
    pub fn resolve(&self, src: &str, page: &Url) -> Option<Url> {
        let src = src.trim();
        if src.is_empty() || src.to_ascii_lowercase().starts_with("data:") {
            return None;
        }

        let resolved = if let Some(rest) = src.strip_prefix("//") {
            Url::parse(&format!("https://{rest}")).ok()?
        } else if src.starts_with("http://") || src.starts_with("https://") {
            Url::parse(src).ok()?
        } else if src.starts_with('/') {
            page.join(src).ok()?
        } else {
            match repository_of(page) {
                Some((owner, repo)) => {
                    let file = src.trim_start_matches("./");
                    Url::parse(&format!(
                        "https://{}/{owner}/{repo}/{}/{file}",
                        self.raw_host, self.default_branch
                    ))
                    .ok()?
                }
                None => page.join(src).ok()?,
            }
        };

        Some(self.rewrite_view_link(resolved))
    }

    /// `host/owner/repo/blob|raw/<ref>/<path>` becomes
    /// `raw_host/owner/repo/<ref>/<path>`. Anything else is returned as is.
    pub fn rewrite_view_link(&self, url: Url) -> Url {
        if !self.matches(&url) {
            return url;
        }
        let Some(segments) = url.path_segments().map(|s| s.collect::<Vec<_>>()) else {
            return url;
        };
        match segments.as_slice() {
            [owner, repo, "blob" | "raw", rest @ ..] if !rest.is_empty() => {
                let raw = format!(
                    "https://{}/{owner}/{repo}/{}",
                    self.raw_host,
                    rest.join("/")
                );
                Url::parse(&raw).unwrap_or(url)
            }
            _ => url,
        }
    }
}

/// `(owner, repo)` from a repository page URL.
fn repository_of(page: &Url) -> Option<(String, String)> {
    let mut segments = page.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    Some((owner.to_string(), repo.to_string()))
}

/// Ranks candidate image sources; higher scores are tried first.
pub trait CandidateScorer {
    fn score(&self, src: &str) -> u32;
}

/// Scores 1 when the source mentions any preview keyword.
#[derive(Debug, Clone)]
pub struct KeywordScorer {
    keywords: Vec<String>,
}

impl KeywordScorer {
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl CandidateScorer for KeywordScorer {
    fn score(&self, src: &str) -> u32 {
        let lowered = src.to_lowercase();
        u32::from(self.keywords.iter().any(|k| lowered.contains(k.as_str())))
    }
}

/// Ordered, resolved candidate images from the documentation section of a
/// source hosting page.
///
/// Sources are ranked by score (stable, so equal scores keep document order),
/// badge-looking filenames are dropped, and duplicates after resolution are
/// removed.
pub fn candidate_images(
    html: &str,
    page: &Url,
    host: &SourceHost,
    scorer: &impl CandidateScorer,
) -> Result<Vec<String>, PipelineError> {
    let selector = Selector::parse(&format!("{} img", host.doc_selector)).map_err(|e| {
        PipelineError::Extraction(format!(
            "bad documentation selector {:?}: {e:?}",
            host.doc_selector
        ))
    })?;

    let document = Html::parse_document(html);
    let sources: Vec<String> = document
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .map(|src| src.trim().to_string())
        .filter(|src| !src.is_empty())
        .collect();

    let candidates: Vec<String> = sources
        .into_iter()
        .sorted_by_key(|src| Reverse(scorer.score(src)))
        .filter(|src| {
            let badge = BadgeFilenameFilter.rejects(src);
            if badge {
                debug!(%src, "Skipping badge-like README image");
            }
            !badge
        })
        .filter_map(|src| host.resolve(&src, page))
        .map(String::from)
        .unique()
        .collect();

    debug!(page = %page, count = candidates.len(), "Collected fallback image candidates");
    Ok(candidates)
}
