//! Error taxonomy for the pipeline.
//!
//! Per-item failures (a dead link, a rejected image, a malformed model batch)
//! are logged and absorbed where they happen. The variants here are what
//! escapes a stage: they either abort one pagination chain, one record's
//! extraction, or the whole stage before its collection is written.

use std::io;

use thiserror::Error;

/// Error type shared by every pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network failure, timeout, or a non-2xx status from an upstream.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// A listing page that does not look like a listing page.
    #[error("could not parse listing page {url}: {reason}")]
    Parse { url: String, reason: String },

    /// Destination content that could not be turned into metadata.
    #[error("metadata extraction failed: {0}")]
    Extraction(String),

    /// Missing or malformed response from the generative classifier.
    #[error("classification failed: {0}")]
    Classification(String),

    /// Missing credential or invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A stage was asked to read a collection the previous stage never wrote.
    #[error("missing input collection {path}; run the `{stage}` stage first")]
    MissingInput { path: String, stage: &'static str },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl PipelineError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
