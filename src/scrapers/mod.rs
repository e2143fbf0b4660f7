//! Listing crawler.
//!
//! Walks each start URL's pagination chain: fetch a listing page, parse its
//! post rows, follow the "More" pointer, stop when the pointer is gone or the
//! per-URL page ceiling is reached. Chains run concurrently but share one
//! [`Pacer`], so the upstream sees requests spaced by the configured delay.
//!
//! A fetch or parse failure ends only the chain it happened in; records from
//! earlier pages and from other chains are kept. Records are deduplicated by
//! id across all chains, the last parsed copy winning.

pub mod listing;

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use reqwest::header::ACCEPT;
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::cache::CLIENT_IDENTITY;
use crate::error::PipelineError;
use crate::models::ListingRecord;
use crate::pacer::Pacer;

pub use listing::{ListingPage, parse_listing_page};

/// Where and how far to crawl.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub start_urls: Vec<Url>,
    pub max_pages_per_url: usize,
    pub delay: Duration,
}

impl CrawlSettings {
    /// Hosts of the listing source; their `/item` pages are discussion pages.
    pub fn upstream_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .start_urls
            .iter()
            .filter_map(|url| url.host_str().map(str::to_string))
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }
}

/// Whether `url` is a discussion page on the listing source itself.
pub fn is_discussion_url(url: &str, upstream_hosts: &[String]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    parsed.path() == "/item"
        && parsed
            .host_str()
            .is_some_and(|host| upstream_hosts.iter().any(|h| h == host))
}

/// What a crawl produced.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub records: Vec<ListingRecord>,
    pub pages_fetched: usize,
    pub failed_chains: usize,
}

#[derive(Debug, Default)]
struct ChainOutcome {
    records: Vec<ListingRecord>,
    pages_fetched: usize,
    failed: bool,
}

/// HTTP client for listing pages.
pub fn build_listing_client() -> Result<reqwest::Client, PipelineError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent(CLIENT_IDENTITY)
        .build()?;
    Ok(client)
}

/// Crawl every start URL's pagination chain and deduplicate by id.
///
/// # Arguments
///
/// * `client` - Client from [`build_listing_client`]
/// * `settings` - Start URLs, page ceiling per chain and the request delay
///
/// # Returns
///
/// The deduplicated records plus page and failure counts. Chain failures are
/// logged and counted, never returned as errors.
#[instrument(level = "info", skip_all, fields(start_urls = settings.start_urls.len()))]
pub async fn crawl(client: &reqwest::Client, settings: &CrawlSettings) -> CrawlOutcome {
    let pacer = Pacer::new(settings.delay);
    let chains = settings
        .start_urls
        .iter()
        .map(|start| crawl_chain(client, start, settings.max_pages_per_url, &pacer));
    let chain_outcomes = join_all(chains).await;

    let mut outcome = CrawlOutcome::default();
    let mut all_records = Vec::new();
    for chain in chain_outcomes {
        outcome.pages_fetched += chain.pages_fetched;
        if chain.failed {
            outcome.failed_chains += 1;
        }
        all_records.extend(chain.records);
    }
    let parsed = all_records.len();
    outcome.records = dedup_by_id(all_records);

    info!(
        parsed,
        unique = outcome.records.len(),
        pages = outcome.pages_fetched,
        failed_chains = outcome.failed_chains,
        "Crawled listing pages"
    );
    outcome
}

#[instrument(level = "info", skip(client, pacer), fields(start = %start))]
async fn crawl_chain(
    client: &reqwest::Client,
    start: &Url,
    max_pages: usize,
    pacer: &Pacer,
) -> ChainOutcome {
    let mut outcome = ChainOutcome::default();
    let mut current = Some(start.clone());

    while let Some(page_url) = current.take() {
        if outcome.pages_fetched >= max_pages {
            debug!(max_pages, "Page ceiling reached");
            break;
        }
        pacer.wait().await;

        let page = match fetch_listing_page(client, &page_url).await {
            Ok(html) => parse_listing_page(&html, &page_url),
            Err(e) => Err(e),
        };
        match page {
            Ok(page) => {
                outcome.pages_fetched += 1;
                info!(
                    page = %page_url,
                    count = page.records.len(),
                    "Parsed listing page"
                );
                outcome.records.extend(page.records);
                current = page.next_url;
            }
            Err(e) => {
                error!(page = %page_url, error = %e, "Listing page failed; abandoning this chain");
                outcome.failed = true;
            }
        }
    }

    outcome
}

/// Fetch one listing page body. Non-2xx statuses are failures.
pub async fn fetch_listing_page(
    client: &reqwest::Client,
    url: &Url,
) -> Result<String, PipelineError> {
    let response = client
        .get(url.clone())
        .header(ACCEPT, "text/html")
        .send()
        .await
        .map_err(|e| PipelineError::fetch(url.as_str(), e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::fetch(url.as_str(), format!("HTTP {status}")));
    }
    response
        .text()
        .await
        .map_err(|e| PipelineError::fetch(url.as_str(), e))
}

/// One record per id. A later duplicate replaces the earlier copy's contents
/// but keeps its position.
pub fn dedup_by_id(records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ListingRecord> = Vec::with_capacity(records.len());
    for record in records {
        match position.get(&record.id) {
            Some(&index) => unique[index] = record,
            None => {
                position.insert(record.id.clone(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}
