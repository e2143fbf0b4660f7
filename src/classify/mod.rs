//! Category assignment.
//!
//! Two interchangeable strategies share the [`Classifier`] contract:
//!
//! - [`keyword::KeywordClassifier`]: ordered keyword rules, first match wins
//! - [`model::ModelClassifier`]: category discovery plus batched generative
//!   classification
//!
//! Either way every output record carries exactly one non-empty category, and
//! [`OTHER_CATEGORY`] is the fallback of last resort.

pub mod keyword;
pub mod model;

use crate::error::PipelineError;
use crate::models::{ClassifiedRecord, EnrichedRecord};

/// Reserved bucket for records no category fits.
pub const OTHER_CATEGORY: &str = "Other";

/// Assigns exactly one category to every record.
pub trait Classifier {
    /// Classify `records`, returning one output per input in input order.
    async fn classify(
        &self,
        records: Vec<EnrichedRecord>,
    ) -> Result<Vec<ClassifiedRecord>, PipelineError>;
}

/// Map a proposed category onto the closed set `categories`.
///
/// Matching ignores case and surrounding whitespace and returns the set's own
/// spelling. Blank or unknown proposals become [`OTHER_CATEGORY`].
pub fn normalize_category(proposed: &str, categories: &[String]) -> String {
    let proposed = proposed.trim();
    if proposed.eq_ignore_ascii_case(OTHER_CATEGORY) {
        return OTHER_CATEGORY.to_string();
    }
    categories
        .iter()
        .find(|c| c.trim().eq_ignore_ascii_case(proposed) && !proposed.is_empty())
        .cloned()
        .unwrap_or_else(|| OTHER_CATEGORY.to_string())
}
