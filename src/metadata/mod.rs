//! Metadata extraction from cached destination pages.
//!
//! Extraction runs in two passes:
//!
//! 1. [`rules::extract_page_metadata`] reads meta tags and JSON-LD.
//! 2. The primary image is checked. Placeholders and images that fail the
//!    [`ImageValidator`] are cleared. When the page lives on a recognized
//!    source host, README images are tried in ranked order and the first
//!    valid one is kept (see [`fallback`]).
//!
//! Problems with one record are logged and never stop the stage; the record
//! keeps whatever metadata was captured before the problem.

pub mod fallback;
pub mod images;
pub mod rules;

use tracing::{debug, warn};
use url::Url;

use crate::error::PipelineError;
use crate::models::{CacheEntry, ListingRecord, Metadata};

use fallback::{KeywordScorer, SourceHost, candidate_images};
use images::{ImageFilter, ImageProbe, ImageSettings, ImageValidator, PlaceholderFilter};

/// Derives [`Metadata`] for a record from its cache entry.
#[derive(Debug)]
pub struct Extractor<P> {
    validator: ImageValidator<P>,
    placeholder: PlaceholderFilter,
    scorer: KeywordScorer,
    source_host: SourceHost,
}

impl<P: ImageProbe> Extractor<P> {
    pub fn new(validator: ImageValidator<P>, settings: &ImageSettings) -> Self {
        Self {
            validator,
            placeholder: PlaceholderFilter,
            scorer: KeywordScorer::new(&settings.preview_keywords),
            source_host: SourceHost::github(),
        }
    }

    pub fn with_source_host(mut self, source_host: SourceHost) -> Self {
        self.source_host = source_host;
        self
    }

    pub fn validator(&self) -> &ImageValidator<P> {
        &self.validator
    }

    /// Metadata for `record`, or `None` when the entry has no content or
    /// nothing usable was found.
    pub async fn extract(&self, record: &ListingRecord, entry: &CacheEntry) -> Option<Metadata> {
        if !entry.has_content() {
            debug!(id = %record.id, error = ?entry.error, "No cached content");
            return None;
        }

        let base = match page_base(entry) {
            Ok(base) => base,
            Err(e) => {
                warn!(id = %record.id, error = %e, "Skipping extraction");
                return None;
            }
        };

        let mut metadata = rules::extract_page_metadata(&entry.raw_content, &base);
        self.settle_image(record, entry, &base, &mut metadata).await;

        (!metadata.is_empty()).then_some(metadata)
    }

    async fn settle_image(
        &self,
        record: &ListingRecord,
        entry: &CacheEntry,
        base: &Url,
        metadata: &mut Metadata,
    ) {
        if let Some(image) = metadata.image_url.take() {
            if self.placeholder.rejects(&image) {
                debug!(id = %record.id, %image, "Dropping placeholder image");
            } else if self.validator.is_usable_image(&image).await {
                metadata.image_url = Some(image);
                return;
            } else {
                debug!(id = %record.id, %image, "Primary image failed validation");
            }
        }

        if !self.source_host.matches(base) {
            return;
        }

        let candidates =
            match candidate_images(&entry.raw_content, base, &self.source_host, &self.scorer) {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Fallback image discovery failed");
                    return;
                }
            };

        for candidate in candidates {
            if self.validator.is_usable_image(&candidate).await {
                debug!(id = %record.id, image = %candidate, "Using README image");
                metadata.image_url = Some(candidate);
                return;
            }
        }
    }
}

fn page_base(entry: &CacheEntry) -> Result<Url, PipelineError> {
    Url::parse(&entry.resolved_url)
        .or_else(|_| Url::parse(&entry.request_url))
        .map_err(|e| {
            PipelineError::Extraction(format!(
                "unusable page URL {:?}: {e}",
                entry.resolved_url
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::images::AssetBlacklist;
    use super::images::stubs::RecordingProbe;
    use super::*;
    use crate::models::fixtures::listing;

    fn extractor(accept: &[&str]) -> Extractor<RecordingProbe> {
        let validator = ImageValidator::new(AssetBlacklist::default(), RecordingProbe::accepting(accept));
        Extractor::new(validator, &ImageSettings::default())
    }

    const REPO_PAGE: &str = r#"<html><head>
        <meta property="og:title" content="alice/bikes">
        <meta property="og:description" content="Ride dashboards">
        <meta property="og:image" content="https://opengraph.githubassets.com/abc/alice/bikes">
        </head><body>
        <article class="markdown-body">
          <img src="https://img.shields.io/badge/build-passing-green">
          <img src="docs/architecture.png">
          <img src="docs/demo.gif">
        </article></body></html>"#;

    fn repo_entry() -> CacheEntry {
        CacheEntry::success(
            "https://github.com/alice/bikes",
            "https://github.com/alice/bikes",
            REPO_PAGE.to_string(),
        )
    }

    #[tokio::test]
    async fn empty_entry_yields_nothing() {
        let extractor = extractor(&[]);
        let entry = CacheEntry::failure("https://dead.example", "HTTP 404");
        assert!(extractor.extract(&listing("1", "x"), &entry).await.is_none());
        assert!(extractor.validator().probe().probed().is_empty());
    }

    #[tokio::test]
    async fn valid_primary_image_is_kept() {
        let html = r#"<meta property="og:image" content="/preview.png">"#;
        let entry = CacheEntry::success(
            "https://tool.example",
            "https://tool.example/",
            html.to_string(),
        );
        let extractor = extractor(&["https://tool.example/preview.png"]);

        let metadata = extractor.extract(&listing("1", "x"), &entry).await.unwrap();
        assert_eq!(
            metadata.image_url.as_deref(),
            Some("https://tool.example/preview.png")
        );
    }

    #[tokio::test]
    async fn rejected_primary_image_is_cleared_off_source_hosts() {
        let html = r#"<meta property="og:image" content="https://tool.example/tiny.png">"#;
        let entry = CacheEntry::success("https://tool.example", "https://tool.example/", html.to_string());
        let extractor = extractor(&[]);

        let metadata = extractor.extract(&listing("1", "x"), &entry).await.unwrap();
        assert!(metadata.image_url.is_none());
        assert_eq!(extractor.validator().probe().probed(), vec!["https://tool.example/tiny.png"]);
    }

    #[tokio::test]
    async fn placeholder_falls_through_to_ranked_readme_images() {
        let demo = "https://raw.githubusercontent.com/alice/bikes/main/docs/demo.gif";
        let architecture = "https://raw.githubusercontent.com/alice/bikes/main/docs/architecture.png";
        let extractor = extractor(&[demo, architecture]);

        let metadata = extractor.extract(&listing("1", "x"), &repo_entry()).await.unwrap();
        assert_eq!(metadata.image_url.as_deref(), Some(demo));
        assert_eq!(metadata.title.as_deref(), Some("alice/bikes"));
        // The placeholder and the shield are never probed.
        assert_eq!(extractor.validator().probe().probed(), vec![demo.to_string()]);
    }

    #[tokio::test]
    async fn next_candidate_is_tried_when_the_first_fails() {
        let architecture = "https://raw.githubusercontent.com/alice/bikes/main/docs/architecture.png";
        let extractor = extractor(&[architecture]);

        let metadata = extractor.extract(&listing("1", "x"), &repo_entry()).await.unwrap();
        assert_eq!(metadata.image_url.as_deref(), Some(architecture));
        assert_eq!(extractor.validator().probe().probed().len(), 2);
    }

    #[tokio::test]
    async fn readme_fallback_follows_the_configured_source_host() {
        let forge = SourceHost {
            host: "code.example".to_string(),
            raw_host: "raw.code.example".to_string(),
            default_branch: "trunk".to_string(),
            doc_selector: "#readme".to_string(),
        };
        let shot = "https://raw.code.example/alice/bikes/trunk/shots/screenshot.png";
        let extractor = extractor(&[shot]).with_source_host(forge);
        let html = r#"<div id="readme"><img src="shots/screenshot.png"></div>"#;
        let entry = CacheEntry::success(
            "https://code.example/alice/bikes",
            "https://code.example/alice/bikes",
            html.to_string(),
        );

        let metadata = extractor.extract(&listing("1", "x"), &entry).await.unwrap();
        assert_eq!(metadata.image_url.as_deref(), Some(shot));

        // GitHub pages no longer get the fallback.
        let metadata = extractor.extract(&listing("2", "x"), &repo_entry()).await.unwrap();
        assert!(metadata.image_url.is_none());
    }

    #[tokio::test]
    async fn no_valid_candidate_leaves_image_unset() {
        let extractor = extractor(&[]);
        let metadata = extractor.extract(&listing("1", "x"), &repo_entry()).await.unwrap();
        assert!(metadata.image_url.is_none());
        assert_eq!(metadata.description.as_deref(), Some("Ride dashboards"));
    }
}
