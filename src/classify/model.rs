//! Model-assisted batch classification.
//!
//! Phase one shows the model a bounded sample of records and asks for a small,
//! balanced category set. Phase two sends every record, in fixed-size batches,
//! and asks for one category per record id from that closed set.
//!
//! Batches run concurrently and are independent: a batch that still fails
//! after retries sends its own records to "Other" and leaves every other
//! batch's assignments intact. Assignments are read back by record id, never
//! by position.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};

use crate::api::AskAsync;
use crate::classify::{Classifier, OTHER_CATEGORY, normalize_category};
use crate::error::PipelineError;
use crate::models::{ClassifiedRecord, EnrichedRecord};
use crate::utils::{looks_truncated, truncate_for_log};

/// Tunables for the model-assisted strategy.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Records per classification request.
    pub batch_size: usize,
    /// Records shown to the model during category discovery.
    pub sample_size: usize,
    /// Classification requests in flight at once.
    pub concurrency: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            sample_size: 300,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CategoryResponse {
    categories: Vec<String>,
}

/// Two-phase classifier over any [`AskAsync`] backend.
#[derive(Debug)]
pub struct ModelClassifier<C> {
    client: C,
    settings: ModelSettings,
}

impl<C: AskAsync> ModelClassifier<C> {
    pub fn new(client: C, settings: ModelSettings) -> Self {
        Self { client, settings }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Phase one: propose the closed category set from a sample of `records`.
    ///
    /// Fails when the response is malformed or names no usable category;
    /// nothing downstream can run without a category set.
    #[instrument(level = "info", skip_all, fields(sample = self.settings.sample_size.min(records.len())))]
    pub async fn discover_categories(
        &self,
        records: &[EnrichedRecord],
    ) -> Result<Vec<String>, PipelineError> {
        let sample: Vec<Value> = records
            .iter()
            .take(self.settings.sample_size)
            .map(|r| json!({ "title": r.listing.title, "description": r.description() }))
            .collect();
        let prompt = discovery_prompt(&sample, records.len());

        let raw = self.client.ask(&prompt).await?;
        let categories = match parse_categories(&raw) {
            Ok(categories) => categories,
            Err(e) => {
                warn!(error = %e, "Unusable category response; re-asking once");
                parse_categories(&self.client.ask(&prompt).await?)?
            }
        };
        info!(count = categories.len(), ?categories, "Discovered categories");
        Ok(categories)
    }

    /// Phase two for one batch: record id to proposed category.
    ///
    /// Only ids belonging to `batch` are kept. Proposals are not yet
    /// normalized against the category set.
    ///
    /// A reply that does not parse (cut off by a token limit, or not a JSON
    /// object) is asked for once more with the same prompt before the batch
    /// is given up.
    ///
    /// # Returns
    ///
    /// Record id to proposed category, or the error from the second attempt.
    #[instrument(level = "info", skip(self, batch, categories), fields(records = batch.len()))]
    pub async fn classify_batch(
        &self,
        batch_no: usize,
        batch: &[EnrichedRecord],
        categories: &[String],
    ) -> Result<HashMap<String, String>, PipelineError> {
        let prompt = batch_prompt(batch, categories);
        let raw = self.client.ask(&prompt).await?;
        let mut parsed = parse_assignments(&raw);
        if let Err(ref e) = parsed {
            warn!(batch = batch_no, error = %e, "Unusable batch response; re-asking once");
            let retry = self.client.ask(&prompt).await?;
            parsed = parse_assignments(&retry);
        }
        let mut assignments = parsed?;

        let ids: HashSet<&str> = batch.iter().map(|r| r.listing.id.as_str()).collect();
        assignments.retain(|id, _| ids.contains(id.as_str()));
        debug!(
            assigned = assignments.len(),
            missing = batch.len() - assignments.len(),
            "Batch classified"
        );
        Ok(assignments)
    }
}

impl<C: AskAsync> Classifier for ModelClassifier<C> {
    #[instrument(level = "info", skip_all, fields(records = records.len()))]
    async fn classify(
        &self,
        records: Vec<EnrichedRecord>,
    ) -> Result<Vec<ClassifiedRecord>, PipelineError> {
        if records.is_empty() {
            info!("Nothing to classify");
            return Ok(Vec::new());
        }

        let categories = self.discover_categories(&records).await?;
        let categories = &categories;

        let batch_size = self.settings.batch_size.max(1);
        let batch_count = records.len().div_ceil(batch_size);
        let outcomes: Vec<(usize, Result<HashMap<String, String>, PipelineError>)> =
            stream::iter(records.chunks(batch_size).enumerate())
                .map(|(i, batch)| async move {
                    let batch_no = i + 1;
                    info!(batch = batch_no, of = batch_count, "Classifying batch");
                    (batch_no, self.classify_batch(batch_no, batch, categories).await)
                })
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;

        let mut assignments: HashMap<String, String> = HashMap::new();
        let mut failed_batches = 0usize;
        for (batch_no, outcome) in outcomes {
            match outcome {
                Ok(batch_assignments) => assignments.extend(batch_assignments),
                Err(e) => {
                    failed_batches += 1;
                    error!(batch = batch_no, error = %e, "Batch failed; its records fall back to Other");
                }
            }
        }

        let classified: Vec<ClassifiedRecord> = records
            .into_iter()
            .map(|record| {
                let category = match assignments.get(&record.listing.id) {
                    Some(proposed) => normalize_category(proposed, categories),
                    None => OTHER_CATEGORY.to_string(),
                };
                record.with_category(category)
            })
            .collect();

        let other = classified
            .iter()
            .filter(|r| r.category == OTHER_CATEGORY)
            .count();
        if failed_batches > 0 {
            warn!(failed_batches, batches = batch_count, "Some batches failed");
        }
        info!(
            count = classified.len(),
            other,
            batches = batch_count,
            "Model classification complete"
        );
        Ok(classified)
    }
}

fn discovery_prompt(sample: &[Value], total: usize) -> String {
    let apps = serde_json::to_string_pretty(sample).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are organizing a directory of {total} \"Show HN\" launches.\n\
         Read the sample below and propose 9 or 10 high-level categories.\n\
         \n\
         Requirements:\n\
         1. Categories must be roughly balanced: each should hold a similar share of the {total} apps.\n\
         2. Split any theme that would dominate (for example a broad \"AI\" bucket) into narrower themes.\n\
         3. Every app in the sample must fit one of the categories.\n\
         4. Keep the need for an \"{OTHER_CATEGORY}\" bucket as small as possible; do not propose it.\n\
         \n\
         Sample:\n{apps}\n\
         \n\
         Respond with a JSON object of the form {{\"categories\": [\"...\"]}} and nothing else."
    )
}

fn batch_prompt(batch: &[EnrichedRecord], categories: &[String]) -> String {
    let apps: Vec<Value> = batch
        .iter()
        .map(|r| json!({ "id": r.listing.id, "title": r.listing.title, "desc": r.description() }))
        .collect();
    let apps = serde_json::to_string(&apps).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Assign each app below to exactly one of these categories:\n\
         {}\n\
         \n\
         Rules:\n\
         - Use only the names listed above, spelled exactly. Never invent a new one.\n\
         - Use \"{OTHER_CATEGORY}\" only when no listed category can fit.\n\
         - When several fit, choose the one closest to the app's core purpose.\n\
         \n\
         Apps:\n{apps}\n\
         \n\
         Respond with a JSON object mapping each app id to its category name and nothing else.",
        categories.join(", ")
    )
}

/// Parse and clean a phase-one response.
///
/// Names are trimmed, blanks and "Other" are dropped, and case-insensitive
/// duplicates keep their first spelling.
pub fn parse_categories(raw: &str) -> Result<Vec<String>, PipelineError> {
    let response: CategoryResponse = serde_json::from_str(raw.trim()).map_err(|e| {
        let kind = if looks_truncated(&e) { "truncated" } else { "malformed" };
        PipelineError::Classification(format!(
            "{kind} category response ({e}): {}",
            truncate_for_log(raw, 200)
        ))
    })?;

    let mut seen = HashSet::new();
    let categories: Vec<String> = response
        .categories
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case(OTHER_CATEGORY))
        .filter(|c| seen.insert(c.to_lowercase()))
        .collect();

    if categories.is_empty() {
        return Err(PipelineError::Classification(
            "model proposed no categories".to_string(),
        ));
    }
    Ok(categories)
}

/// Parse a phase-two response: a JSON object from record id to category.
/// Non-string values are ignored.
pub fn parse_assignments(raw: &str) -> Result<HashMap<String, String>, PipelineError> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(|e| {
        let kind = if looks_truncated(&e) { "truncated" } else { "malformed" };
        PipelineError::Classification(format!(
            "{kind} batch response ({e}): {}",
            truncate_for_log(raw, 200)
        ))
    })?;
    let Value::Object(map) = value else {
        return Err(PipelineError::Classification(format!(
            "batch response is not an object: {}",
            truncate_for_log(raw, 200)
        )));
    };
    Ok(map
        .into_iter()
        .filter_map(|(id, category)| category.as_str().map(|c| (id, c.to_string())))
        .collect())
}
