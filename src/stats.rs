//! Collection statistics.
//!
//! Summarizes a crawl for humans: size, category distribution, dead links in
//! the fetch cache, and how posts spread over time.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDate;
use itertools::Itertools;

use crate::models::{CacheEntry, ListingRecord};

/// Cache entries with less content than this count as bad links.
const MIN_USEFUL_CONTENT_BYTES: usize = 100;
const RECENT_DAYS: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStats {
    pub total: usize,
    pub cache_entries: usize,
    pub bad_links: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    /// Days between first and last post, at least 1.
    pub span_days: i64,
    pub average_per_day: f64,
    /// Largest first; ties alphabetical.
    pub categories: Vec<(String, usize)>,
    /// `YYYY-MM` to count, chronological.
    pub monthly: Vec<(String, usize)>,
    /// The last days of the collection, newest first.
    pub recent_days: Vec<(NaiveDate, usize)>,
}

/// Calendar date of a listing timestamp such as `2026-01-05T12:00:00 1767614400`.
pub fn post_date(timestamp: &str) -> Option<NaiveDate> {
    let first = timestamp.split_whitespace().next()?;
    let date = first.split('T').next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn is_bad_link(entry: &CacheEntry) -> bool {
    entry.is_error() || entry.raw_content.len() < MIN_USEFUL_CONTENT_BYTES
}

/// Compute statistics.
///
/// # Arguments
///
/// * `records` - Listing fields of the newest collection
/// * `categories` - One category per record when the collection has been
///   classified, empty otherwise
/// * `cache` - Every fetch cache entry, for the bad link count
pub fn collection_stats(
    records: &[ListingRecord],
    categories: &[&str],
    cache: &[CacheEntry],
) -> CollectionStats {
    let daily: BTreeMap<NaiveDate, usize> = records
        .iter()
        .filter_map(|r| post_date(&r.timestamp))
        .counts()
        .into_iter()
        .collect();

    let first_date = daily.keys().next().copied();
    let last_date = daily.keys().next_back().copied();
    let span_days = match (first_date, last_date) {
        (Some(first), Some(last)) => (last - first).num_days().max(1),
        _ => 1,
    };

    let monthly: Vec<(String, usize)> = daily
        .iter()
        .map(|(date, count)| (date.format("%Y-%m").to_string(), *count))
        .into_grouping_map()
        .sum()
        .into_iter()
        .sorted()
        .collect();

    let categories: Vec<(String, usize)> = categories
        .iter()
        .counts()
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .collect();

    let recent_days = daily
        .iter()
        .rev()
        .take(RECENT_DAYS)
        .map(|(date, count)| (*date, *count))
        .collect();

    CollectionStats {
        total: records.len(),
        cache_entries: cache.len(),
        bad_links: cache.iter().filter(|e| is_bad_link(e)).count(),
        first_date,
        last_date,
        span_days,
        average_per_day: records.len() as f64 / span_days as f64,
        categories,
        monthly,
        recent_days,
    }
}

fn bar(count: usize, per_block: usize) -> String {
    "█".repeat(count.div_ceil(per_block))
}

/// Plain-text report.
pub fn render(stats: &CollectionStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- Analysis of {} apps ---", stats.total);
    let _ = writeln!(
        out,
        "Bad links: {} of {} cached pages",
        stats.bad_links, stats.cache_entries
    );
    if let (Some(first), Some(last)) = (stats.first_date, stats.last_date) {
        let _ = writeln!(out, "First post date: {first}");
        let _ = writeln!(out, "Last post date: {last}");
        let _ = writeln!(out, "Duration: {} days", stats.span_days);
        let _ = writeln!(out, "Average posts per day: {:.2}", stats.average_per_day);
    }

    if !stats.categories.is_empty() {
        let _ = writeln!(out, "\n--- Category Distribution ---");
        for (category, count) in &stats.categories {
            let _ = writeln!(out, "{category}: {count} apps");
        }
    }

    if !stats.monthly.is_empty() {
        let _ = writeln!(out, "\n--- Monthly ---");
        for (month, count) in &stats.monthly {
            let _ = writeln!(out, "{month}: {count} {}", bar(*count, 20));
        }
    }

    if !stats.recent_days.is_empty() {
        let _ = writeln!(out, "\n--- Last {} days of the collection ---", stats.recent_days.len());
        for (date, count) in &stats.recent_days {
            let _ = writeln!(out, "{date}: {count} {}", bar(*count, 5));
        }
    }
    out
}
