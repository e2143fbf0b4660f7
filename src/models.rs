//! Data models for the records each pipeline stage reads and writes.
//!
//! - [`ListingRecord`]: one post row parsed from a listing page
//! - [`CacheEntry`]: the cached outcome of fetching a destination URL
//! - [`Metadata`]: descriptive fields scraped from a destination page
//! - [`EnrichedRecord`]: a listing record plus its metadata
//! - [`ClassifiedRecord`]: an enriched record plus its category
//!
//! Field names serialize in camelCase; the persisted JSON collections are the
//! hand-off point to the directory site, which expects that shape.

use serde::{Deserialize, Serialize};

/// A single post parsed from a listing page.
///
/// `id` is the upstream identifier and the join key for every later stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    pub id: String,
    pub title: String,
    /// Where the post points. Self posts point back at their discussion page.
    pub destination_url: String,
    pub discussion_url: String,
    pub author: String,
    pub score: u32,
    pub comment_count: u32,
    /// Timestamp string exactly as the listing page provides it.
    pub timestamp: String,
}

/// The cached result of one fetch attempt.
///
/// An entry with `error` set is a permanent negative: its presence alone
/// means the URL is not fetched again.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub request_url: String,
    pub raw_content: String,
    /// URL after redirects.
    pub resolved_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CacheEntry {
    pub fn success(request_url: &str, resolved_url: &str, raw_content: String) -> Self {
        Self {
            request_url: request_url.to_string(),
            raw_content,
            resolved_url: resolved_url.to_string(),
            error: None,
        }
    }

    pub fn failure(request_url: &str, error: impl ToString) -> Self {
        Self {
            request_url: request_url.to_string(),
            raw_content: String::new(),
            resolved_url: request_url.to_string(),
            error: Some(error.to_string()),
        }
    }

    pub fn has_content(&self) -> bool {
        !self.raw_content.trim().is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Metadata scraped from a destination page. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byline: Option<String>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self == &Metadata::default()
    }
}

/// A listing record after the extraction stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub listing: ListingRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl EnrichedRecord {
    pub fn new(listing: ListingRecord, metadata: Option<Metadata>) -> Self {
        Self { listing, metadata }
    }

    pub fn description(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|m| m.description.as_deref())
            .unwrap_or_default()
    }

    /// Lowercased title, extracted title and extracted description, space
    /// separated. This is the text keyword rules are matched against.
    pub fn classification_text(&self) -> String {
        let extracted_title = self
            .metadata
            .as_ref()
            .and_then(|m| m.title.as_deref())
            .unwrap_or_default();
        format!(
            "{} {} {}",
            self.listing.title,
            extracted_title,
            self.description()
        )
        .to_lowercase()
    }

    pub fn with_category(self, category: impl Into<String>) -> ClassifiedRecord {
        ClassifiedRecord {
            listing: self.listing,
            metadata: self.metadata,
            category: category.into(),
        }
    }
}

/// The final artifact: an enriched record with exactly one category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedRecord {
    #[serde(flatten)]
    pub listing: ListingRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub category: String,
}

impl ClassifiedRecord {
    pub fn image_url(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.image_url.as_deref())
            .filter(|url| !url.trim().is_empty())
    }

    pub fn has_image(&self) -> bool {
        self.image_url().is_some()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn listing(id: &str, title: &str) -> ListingRecord {
        ListingRecord {
            id: id.to_string(),
            title: title.to_string(),
            destination_url: format!("https://example.com/{id}"),
            discussion_url: format!("https://news.ycombinator.com/item?id={id}"),
            author: "pg".to_string(),
            score: 10,
            comment_count: 3,
            timestamp: "2026-01-05T12:00:00".to_string(),
        }
    }

    pub(crate) fn enriched(id: &str, title: &str, description: &str) -> EnrichedRecord {
        let metadata = (!description.is_empty()).then(|| Metadata {
            description: Some(description.to_string()),
            ..Metadata::default()
        });
        EnrichedRecord::new(listing(id, title), metadata)
    }
}
