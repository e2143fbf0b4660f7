//! Persistent fetch cache for destination pages.
//!
//! Entries are keyed by the SHA-256 of the request URL and stored one JSON file
//! per key under `html_cache/`. An entry exists for every URL that was ever
//! attempted; failed attempts are stored as error entries with empty content
//! so a dead link is not retried on the next run. There is no expiry. Deleting
//! an entry file is the only way to force a refetch.
//!
//! Within a process, concurrent requests for the same URL share a single
//! in-flight fetch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::ACCEPT;
use sha2::{Digest as _, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::error::PipelineError;
use crate::models::CacheEntry;
use crate::pacer::Pacer;
use crate::store;

/// Client identity sent with every upstream request.
pub const CLIENT_IDENTITY: &str = concat!(
    "show_directory/",
    env!("CARGO_PKG_VERSION"),
    " (listing directory metadata fetcher)"
);

/// Knobs for destination page fetching.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub delay: Duration,
    pub concurrency: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            delay: Duration::from_millis(200),
            concurrency: 8,
        }
    }
}

/// Stable cache key for a request URL.
pub fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest)
}

/// Build the HTTP client used for destination pages.
pub fn build_page_client(timeout: Duration) -> Result<reqwest::Client, PipelineError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent(CLIENT_IDENTITY)
        .build()?;
    Ok(client)
}

type Slot = Arc<OnceCell<CacheEntry>>;

/// Read-only view of a cache directory.
///
/// Holds no HTTP client, so nothing read through it can trigger a fetch.
/// The extract stage works from this.
#[derive(Debug, Clone)]
pub struct CacheReader {
    dir: PathBuf,
}

impl CacheReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(url)))
    }

    /// The stored entry for `url`, or `None` if it was never fetched.
    ///
    /// # Errors
    ///
    /// An entry file that exists but cannot be read or decoded.
    pub fn lookup(&self, url: &str) -> Result<Option<CacheEntry>, PipelineError> {
        read_entry(&self.entry_path(url))
    }
}

/// Content-addressed cache of fetch outcomes.
#[derive(Debug)]
pub struct FetchCache {
    reader: CacheReader,
    client: reqwest::Client,
    pacer: Pacer,
    in_flight: Mutex<HashMap<String, Slot>>,
    network_fetches: AtomicUsize,
}

impl FetchCache {
    /// Open (creating if needed) the cache directory with a fresh HTTP client.
    pub fn open(dir: impl Into<PathBuf>, settings: &FetchSettings) -> Result<Self, PipelineError> {
        let client = build_page_client(settings.timeout)?;
        Self::with_client(dir, client, Pacer::new(settings.delay))
    }

    pub fn with_client(
        dir: impl Into<PathBuf>,
        client: reqwest::Client,
        pacer: Pacer,
    ) -> Result<Self, PipelineError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            reader: CacheReader::new(dir),
            client,
            pacer,
            in_flight: Mutex::new(HashMap::new()),
            network_fetches: AtomicUsize::new(0),
        })
    }

    pub fn entry_path(&self, url: &str) -> PathBuf {
        self.reader.entry_path(url)
    }

    /// Number of network requests this cache instance has issued.
    pub fn network_fetches(&self) -> usize {
        self.network_fetches.load(Ordering::SeqCst)
    }

    /// Read an existing entry without ever touching the network.
    pub fn lookup(&self, url: &str) -> Result<Option<CacheEntry>, PipelineError> {
        self.reader.lookup(url)
    }

    /// Return the entry for `url`, fetching and persisting it on first use.
    ///
    /// # Arguments
    ///
    /// * `url` - Request URL exactly as the listing gave it; it is the cache key
    ///
    /// Errors only when the cache itself cannot be read or written; network
    /// failures come back as an error entry.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_cached(&self, url: &str) -> Result<CacheEntry, PipelineError> {
        let slot = self.slot_for(url);
        let entry = slot
            .get_or_try_init(|| async {
                if let Some(existing) = self.lookup(url)? {
                    debug!(%url, "Cache hit");
                    return Ok::<_, PipelineError>(existing);
                }
                let entry = self.fetch_remote(url).await;
                store::write_json_atomic(&self.entry_path(url), &entry)?;
                Ok(entry)
            })
            .await?;
        Ok(entry.clone())
    }

    fn slot_for(&self, url: &str) -> Slot {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(in_flight.entry(cache_key(url)).or_default())
    }

    async fn fetch_remote(&self, url: &str) -> CacheEntry {
        self.pacer.wait().await;
        self.network_fetches.fetch_add(1, Ordering::SeqCst);
        info!(%url, "Downloading");

        match self.download(url).await {
            Ok((resolved_url, body)) => CacheEntry::success(url, &resolved_url, body),
            Err(e) => {
                warn!(%url, error = %e, "Fetch failed; caching negative entry");
                CacheEntry::failure(url, e)
            }
        }
    }

    async fn download(&self, url: &str) -> Result<(String, String), PipelineError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| PipelineError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(url, format!("HTTP {status}")));
        }

        let resolved_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::fetch(url, e))?;
        Ok((resolved_url, body))
    }
}

fn read_entry(path: &Path) -> Result<Option<CacheEntry>, PipelineError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Every entry in a cache directory. Used for statistics.
pub fn read_all_entries(dir: &Path) -> Result<Vec<CacheEntry>, PipelineError> {
    let mut entries = Vec::new();
    if !dir.exists() {
        return Ok(entries);
    }
    for item in std::fs::read_dir(dir)? {
        let path = item?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_entry(&path) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry"),
        }
    }
    Ok(entries)
}
