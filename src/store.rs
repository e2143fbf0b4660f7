//! Persisted JSON collections.
//!
//! Every stage reads the previous stage's collection and writes its own.
//! Collections are written atomically: the JSON goes to a temporary file in
//! the same directory and is renamed over the destination, so a reader sees
//! either the previous snapshot or the complete new one.
//!
//! # Layout
//!
//! ```text
//! data_dir/
//! ├── posts_raw.json              # crawl
//! ├── html_cache/<sha256>.json    # fetch
//! ├── posts_with_metadata.json    # extract
//! └── classified_posts.json       # classify
//! ```

use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::error::PipelineError;

const RAW_POSTS_FILE: &str = "posts_raw.json";
const HTML_CACHE_DIR: &str = "html_cache";
const ENRICHED_POSTS_FILE: &str = "posts_with_metadata.json";
const CLASSIFIED_POSTS_FILE: &str = "classified_posts.json";

/// Paths of the persisted collections under one data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_posts(&self) -> PathBuf {
        self.root.join(RAW_POSTS_FILE)
    }

    pub fn html_cache(&self) -> PathBuf {
        self.root.join(HTML_CACHE_DIR)
    }

    pub fn enriched_posts(&self) -> PathBuf {
        self.root.join(ENRICHED_POSTS_FILE)
    }

    pub fn classified_posts(&self) -> PathBuf {
        self.root.join(CLASSIFIED_POSTS_FILE)
    }
}

/// Read a collection written by `stage`.
///
/// # Arguments
///
/// * `path` - Collection file, usually from [`DataDir`]
/// * `stage` - Name of the stage that writes it, used in the error
///
/// # Errors
///
/// A missing file is reported as [`PipelineError::MissingInput`] naming the
/// stage that produces it. Unreadable or malformed JSON is an I/O or JSON
/// error.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn read_collection<T: DeserializeOwned>(
    path: &Path,
    stage: &'static str,
) -> Result<Vec<T>, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.display().to_string(),
            stage,
        });
    }
    let raw = std::fs::read_to_string(path)?;
    let records: Vec<T> = serde_json::from_str(&raw)?;
    debug!(count = records.len(), "Read collection");
    Ok(records)
}

/// Write a whole collection atomically.
///
/// # Arguments
///
/// * `path` - Destination file; its directory is created if missing
/// * `records` - The complete collection, replacing any previous snapshot
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub fn write_collection<T: Serialize>(path: &Path, records: &[T]) -> Result<(), PipelineError> {
    write_json_atomic(path, records)?;
    info!("Wrote collection");
    Ok(())
}

/// Serialize `value` as pretty JSON to a temp file beside `path`, then rename
/// it into place.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    temp.persist(path).map_err(|e| PipelineError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingRecord;
    use crate::models::fixtures::listing;

    #[test]
    fn collection_paths_live_under_the_data_dir() {
        let data = DataDir::new("/tmp/showdir");
        assert_eq!(data.raw_posts(), PathBuf::from("/tmp/showdir/posts_raw.json"));
        assert_eq!(data.html_cache(), PathBuf::from("/tmp/showdir/html_cache"));
        assert_eq!(
            data.classified_posts(),
            PathBuf::from("/tmp/showdir/classified_posts.json")
        );
    }

    #[test]
    fn written_collection_reads_back() {
        let temp = tempfile::TempDir::new().unwrap();
        let data = DataDir::new(temp.path());
        let records = vec![listing("1", "One"), listing("2", "Two")];

        write_collection(&data.raw_posts(), &records).unwrap();
        let back: Vec<ListingRecord> = read_collection(&data.raw_posts(), "crawl").unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn rewrite_replaces_previous_snapshot_without_leftovers() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("posts_raw.json");

        write_collection(&path, &[listing("1", "One")]).unwrap();
        write_collection(&path, &[listing("2", "Two")]).unwrap();

        let back: Vec<ListingRecord> = read_collection(&path, "crawl").unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].id, "2");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_collection_names_the_stage() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = read_collection::<ListingRecord>(&temp.path().join("nope.json"), "extract")
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingInput { stage: "extract", .. }
        ));
    }
}
