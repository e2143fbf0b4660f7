//! Pipeline stages.
//!
//! Each stage reads the previous stage's persisted collection, does its work
//! completely in memory, and writes its own collection once at the end. A
//! stage that fails leaves every collection as it was.
//!
//! ```text
//! crawl    -> posts_raw.json
//! fetch    -> html_cache/<sha256>.json
//! extract  -> posts_with_metadata.json
//! classify -> classified_posts.json
//! ```

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt, TryStreamExt};
use itertools::Itertools;
use tracing::{info, instrument, warn};

use crate::api::{ChatClient, DEFAULT_MAX_RETRIES, RetryAsk};
use crate::cache::{self, CacheReader, FetchCache};
use crate::classify::Classifier;
use crate::classify::keyword::KeywordClassifier;
use crate::classify::model::ModelClassifier;
use crate::cli::Strategy;
use crate::config::PipelineConfig;
use crate::directory;
use crate::error::PipelineError;
use crate::metadata::Extractor;
use crate::metadata::images::{AssetBlacklist, HttpImageProbe, ImageProbe, ImageValidator};
use crate::models::{ClassifiedRecord, EnrichedRecord, ListingRecord};
use crate::scrapers::{self, is_discussion_url};
use crate::stats;
use crate::store::{read_collection, write_collection};
use crate::utils::ensure_writable_dir;

/// Counts reported by the fetch stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub records: usize,
    pub unique_urls: usize,
    pub skipped_discussions: usize,
    pub network_fetches: usize,
    pub failed: usize,
}

/// Counts reported by the image cleanup stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanSummary {
    pub checked: usize,
    pub removed: usize,
}

/// Crawl the listing pages and write the raw collection.
#[instrument(level = "info", skip_all)]
pub async fn run_crawl(config: &PipelineConfig) -> Result<Vec<ListingRecord>, PipelineError> {
    let t0 = Instant::now();
    ensure_writable_dir(config.data.root()).await?;
    info!(start_urls = config.crawl.start_urls.len(), "Crawl stage starting");

    let client = scrapers::build_listing_client()?;
    let outcome = scrapers::crawl(&client, &config.crawl).await;

    if outcome.records.is_empty() && outcome.failed_chains > 0 {
        return Err(PipelineError::fetch(
            config.crawl.start_urls.iter().join(", "),
            "every pagination chain failed before producing a record",
        ));
    }

    write_collection(&config.data.raw_posts(), &outcome.records)?;
    info!(
        count = outcome.records.len(),
        pages = outcome.pages_fetched,
        failed_chains = outcome.failed_chains,
        elapsed_ms = t0.elapsed().as_millis(),
        "Crawl stage complete"
    );
    Ok(outcome.records)
}

/// Fill the fetch cache for every raw record's destination.
///
/// Discussion pages on the listing source are skipped. Each distinct URL is
/// fetched at most once; already cached URLs cost nothing.
///
/// # Returns
///
/// Counts for the run. Dead links are counted in `failed`, not returned as
/// errors; only an unreadable input or an unwritable cache fails the stage.
#[instrument(level = "info", skip_all)]
pub async fn run_fetch(config: &PipelineConfig) -> Result<FetchSummary, PipelineError> {
    let t0 = Instant::now();
    let records: Vec<ListingRecord> = read_collection(&config.data.raw_posts(), "crawl")?;
    let upstream_hosts = config.crawl.upstream_hosts();

    let (discussions, external): (Vec<&ListingRecord>, Vec<&ListingRecord>) = records
        .iter()
        .partition(|r| is_discussion_url(&r.destination_url, &upstream_hosts));
    let urls: Vec<&str> = external
        .iter()
        .map(|r| r.destination_url.as_str())
        .unique()
        .collect();
    info!(
        records = records.len(),
        urls = urls.len(),
        skipped_discussions = discussions.len(),
        "Fetch stage starting"
    );

    let cache = FetchCache::open(config.data.html_cache(), &config.fetch)?;
    let cache = &cache;
    let entries: Vec<_> = stream::iter(urls.iter().copied())
        .map(|url| async move { cache.fetch_cached(url).await })
        .buffer_unordered(config.fetch.concurrency.max(1))
        .try_collect()
        .await?;

    let summary = FetchSummary {
        records: records.len(),
        unique_urls: urls.len(),
        skipped_discussions: discussions.len(),
        network_fetches: cache.network_fetches(),
        failed: entries.iter().filter(|e| e.is_error()).count(),
    };
    info!(
        network_fetches = summary.network_fetches,
        failed = summary.failed,
        elapsed_ms = t0.elapsed().as_millis(),
        "Fetch stage complete"
    );
    Ok(summary)
}

fn image_validator(config: &PipelineConfig) -> Result<ImageValidator<HttpImageProbe>, PipelineError> {
    Ok(ImageValidator::new(
        AssetBlacklist::new(&config.images.extra_blacklist),
        HttpImageProbe::new(&config.images)?,
    ))
}

/// Derive metadata for every raw record from the fetch cache.
#[instrument(level = "info", skip_all)]
pub async fn run_extract(config: &PipelineConfig) -> Result<Vec<EnrichedRecord>, PipelineError> {
    let extractor = Extractor::new(image_validator(config)?, &config.images);
    run_extract_with(config, &extractor).await
}

/// [`run_extract`] with a caller-supplied extractor.
pub async fn run_extract_with<P: ImageProbe>(
    config: &PipelineConfig,
    extractor: &Extractor<P>,
) -> Result<Vec<EnrichedRecord>, PipelineError> {
    let t0 = Instant::now();
    let records: Vec<ListingRecord> = read_collection(&config.data.raw_posts(), "crawl")?;
    let cache = &CacheReader::new(config.data.html_cache());
    let upstream_hosts = &config.crawl.upstream_hosts();
    info!(records = records.len(), "Extract stage starting");

    let enriched: Vec<EnrichedRecord> = stream::iter(records)
        .map(|record| async move {
            if is_discussion_url(&record.destination_url, upstream_hosts) {
                return EnrichedRecord::new(record, None);
            }
            let metadata = match cache.lookup(&record.destination_url) {
                Ok(Some(entry)) => extractor.extract(&record, &entry).await,
                Ok(None) => {
                    warn!(id = %record.id, url = %record.destination_url, "Destination not in cache; run the fetch stage");
                    None
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Unreadable cache entry");
                    None
                }
            };
            EnrichedRecord::new(record, metadata)
        })
        .buffered(config.fetch.concurrency.max(1))
        .collect()
        .await;

    write_collection(&config.data.enriched_posts(), &enriched)?;
    let with_metadata = enriched.iter().filter(|r| r.metadata.is_some()).count();
    let with_image = enriched
        .iter()
        .filter(|r| r.metadata.as_ref().is_some_and(|m| m.image_url.is_some()))
        .count();
    info!(
        count = enriched.len(),
        with_metadata,
        with_image,
        elapsed_ms = t0.elapsed().as_millis(),
        "Extract stage complete"
    );
    Ok(enriched)
}

/// Classify the enriched collection with `strategy`.
#[instrument(level = "info", skip(config))]
pub async fn run_classify(
    config: &PipelineConfig,
    strategy: Strategy,
) -> Result<Vec<ClassifiedRecord>, PipelineError> {
    match strategy {
        Strategy::Keyword => {
            let classifier = KeywordClassifier::new(config.keyword_rules.clone());
            run_classify_with(config, &classifier).await
        }
        Strategy::Model => {
            let api_key = config.endpoint.require_api_key()?.to_string();
            let client = ChatClient::new(
                &config.endpoint.base_url,
                api_key,
                config.endpoint.model.clone(),
            )?;
            info!(model = client.model(), "Using model classifier");
            let client = RetryAsk::new(client, DEFAULT_MAX_RETRIES, Duration::from_secs(1));
            let classifier = ModelClassifier::new(client, config.model.clone());
            run_classify_with(config, &classifier).await
        }
    }
}

/// [`run_classify`] with a caller-supplied classifier.
pub async fn run_classify_with(
    config: &PipelineConfig,
    classifier: &impl Classifier,
) -> Result<Vec<ClassifiedRecord>, PipelineError> {
    let t0 = Instant::now();
    let records: Vec<EnrichedRecord> = read_collection(&config.data.enriched_posts(), "extract")?;
    info!(records = records.len(), "Classify stage starting");

    let classified = classifier.classify(records).await?;
    write_collection(&config.data.classified_posts(), &classified)?;
    info!(
        count = classified.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "Classify stage complete"
    );
    Ok(classified)
}

/// Re-validate every classified record's image and clear the ones that fail.
#[instrument(level = "info", skip_all)]
pub async fn run_clean_images(config: &PipelineConfig) -> Result<CleanSummary, PipelineError> {
    let validator = image_validator(config)?;
    run_clean_images_with(config, &validator).await
}

/// [`run_clean_images`] with a caller-supplied validator.
pub async fn run_clean_images_with<P: ImageProbe>(
    config: &PipelineConfig,
    validator: &ImageValidator<P>,
) -> Result<CleanSummary, PipelineError> {
    let t0 = Instant::now();
    let records: Vec<ClassifiedRecord> =
        read_collection(&config.data.classified_posts(), "classify")?;
    info!(records = records.len(), "Image cleanup starting");

    let verdicts: Vec<Option<bool>> = stream::iter(records.iter())
        .map(|record| async move {
            match record.image_url() {
                Some(url) => Some(validator.is_usable_image(url).await),
                None => None,
            }
        })
        .buffered(config.fetch.concurrency.max(1))
        .collect()
        .await;

    let mut summary = CleanSummary::default();
    let cleaned: Vec<ClassifiedRecord> = records
        .into_iter()
        .zip(verdicts)
        .map(|(mut record, verdict)| {
            if let Some(usable) = verdict {
                summary.checked += 1;
                if !usable {
                    summary.removed += 1;
                    info!(id = %record.listing.id, title = %record.listing.title, "Removing invalid image");
                    if let Some(metadata) = record.metadata.as_mut() {
                        metadata.image_url = None;
                    }
                }
            }
            record
        })
        .collect();

    write_collection(&config.data.classified_posts(), &cleaned)?;
    info!(
        checked = summary.checked,
        removed = summary.removed,
        elapsed_ms = t0.elapsed().as_millis(),
        "Image cleanup complete"
    );
    Ok(summary)
}

/// Crawl, fetch, extract and classify in order.
#[instrument(level = "info", skip(config))]
pub async fn run_all(config: &PipelineConfig, strategy: Strategy) -> Result<(), PipelineError> {
    let t0 = Instant::now();
    if strategy == Strategy::Model {
        config.endpoint.require_api_key()?;
    }
    run_crawl(config).await?;
    run_fetch(config).await?;
    run_extract(config).await?;
    run_classify(config, strategy).await?;
    info!(elapsed_ms = t0.elapsed().as_millis(), "Pipeline complete");
    Ok(())
}

/// The classified collection.
pub fn load_classified(config: &PipelineConfig) -> Result<Vec<ClassifiedRecord>, PipelineError> {
    read_collection(&config.data.classified_posts(), "classify")
}

fn write_record_line(out: &mut String, record: &ClassifiedRecord) {
    let image = if record.has_image() { " [img]" } else { "" };
    let _ = writeln!(
        out,
        "  {} ({} comments, by {}){image}\n    {}",
        record.listing.title,
        record.listing.comment_count,
        record.listing.author,
        record.listing.destination_url
    );
}

/// Text listing of the directory, or of one category when `slug` is given.
pub fn directory_report(records: &[ClassifiedRecord], slug: Option<&str>) -> String {
    let mut out = String::new();
    match slug {
        Some(slug) => {
            let members = directory::category_for_slug(records, slug);
            match members.first() {
                Some(first) => {
                    let _ = writeln!(out, "{} ({})", first.category, members.len());
                    members.iter().for_each(|r| write_record_line(&mut out, r));
                }
                None => {
                    let _ = writeln!(out, "No category with slug {slug:?}");
                }
            }
        }
        None => {
            for (category, members) in directory::display_groups(records) {
                let _ = writeln!(
                    out,
                    "{category} ({}) #{}",
                    members.len(),
                    directory::slugify(category)
                );
                members.iter().for_each(|r| write_record_line(&mut out, r));
                out.push('\n');
            }
        }
    }
    out
}

/// Text listing of search matches.
pub fn search_report(records: &[ClassifiedRecord], query: &str) -> String {
    let matches = directory::search(records, query);
    let mut out = String::new();
    let _ = writeln!(out, "{} result(s) for {query:?}", matches.len());
    for record in matches {
        let _ = writeln!(out, "[{}]", record.category);
        write_record_line(&mut out, record);
    }
    out
}

/// Statistics over the newest collection available plus the fetch cache.
pub fn stats_report(config: &PipelineConfig) -> Result<String, PipelineError> {
    let cache_entries = cache::read_all_entries(&config.data.html_cache())?;
    let classified_path = config.data.classified_posts();

    let stats = if classified_path.exists() {
        let classified: Vec<ClassifiedRecord> = read_collection(&classified_path, "classify")?;
        let categories: Vec<&str> = classified.iter().map(|r| r.category.as_str()).collect();
        let listings: Vec<ListingRecord> = classified.iter().map(|r| r.listing.clone()).collect();
        stats::collection_stats(&listings, &categories, &cache_entries)
    } else {
        let raw: Vec<ListingRecord> = read_collection(&config.data.raw_posts(), "crawl")?;
        stats::collection_stats(&raw, &[], &cache_entries)
    };
    Ok(stats::render(&stats))
}
