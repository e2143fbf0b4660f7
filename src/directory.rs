//! Read-only views over the classified collection.
//!
//! - [`group_by_category`]: members per category, best presented first
//! - [`category_order`]: alphabetical display order with "Other" last
//! - [`category_for_slug`]: one category's members by its URL slug
//! - [`search`]: case-insensitive substring match over title, author and
//!   category, in collection order
//!
//! Nothing here mutates the collection; callers treat it as a snapshot.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::classify::OTHER_CATEGORY;
use crate::models::ClassifiedRecord;

pub use crate::utils::slugify;

/// Sort members for display: records with an image first, then by comment
/// count, descending. Stable, so ties keep collection order.
pub fn sort_members(members: &mut [&ClassifiedRecord]) {
    members.sort_by_key(|r| (Reverse(r.has_image()), Reverse(r.listing.comment_count)));
}

/// Records grouped by category name, each group sorted with [`sort_members`].
///
/// # Returns
///
/// A map keyed by category name in byte order. Use [`display_groups`] for
/// the presentation order.
pub fn group_by_category(records: &[ClassifiedRecord]) -> BTreeMap<&str, Vec<&ClassifiedRecord>> {
    let mut groups: BTreeMap<&str, Vec<&ClassifiedRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.category.as_str()).or_default().push(record);
    }
    for members in groups.values_mut() {
        sort_members(members);
    }
    groups
}

/// Category names in display order: alphabetical, "Other" last.
pub fn category_order<'a>(categories: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut names: Vec<&str> = categories.into_iter().collect();
    names.sort_unstable_by_key(|name| (*name == OTHER_CATEGORY, *name));
    names.dedup();
    names
}

/// Groups in display order.
pub fn display_groups(records: &[ClassifiedRecord]) -> Vec<(&str, Vec<&ClassifiedRecord>)> {
    let mut groups = group_by_category(records);
    category_order(groups.keys().copied())
        .into_iter()
        .filter_map(|name| groups.remove(name).map(|members| (name, members)))
        .collect()
}

/// Members of the category whose slug is `slug` (compared case-insensitively),
/// sorted for display. Categories that slugify identically are merged.
pub fn category_for_slug<'a>(records: &'a [ClassifiedRecord], slug: &str) -> Vec<&'a ClassifiedRecord> {
    let wanted = slug.trim().to_lowercase();
    let mut members: Vec<&ClassifiedRecord> = records
        .iter()
        .filter(|r| slugify(&r.category) == wanted)
        .collect();
    sort_members(&mut members);
    members
}

/// Records whose title, author or category contains `query`, ignoring case,
/// in collection order.
///
/// # Arguments
///
/// * `records` - The classified collection
/// * `query` - Substring to look for; surrounding whitespace is ignored
///
/// # Returns
///
/// Matching records, borrowed. A blank query matches nothing.
pub fn search<'a>(records: &'a [ClassifiedRecord], query: &str) -> Vec<&'a ClassifiedRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    records
        .iter()
        .filter(|r| {
            [&r.listing.title, &r.listing.author, &r.category]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::listing;
    use crate::models::{EnrichedRecord, Metadata};

    fn record(id: &str, category: &str, comments: u32, image: bool) -> ClassifiedRecord {
        let mut listing = listing(id, &format!("Show HN: App {id}"));
        listing.comment_count = comments;
        let metadata = image.then(|| Metadata {
            image_url: Some(format!("https://img.example/{id}.png")),
            ..Metadata::default()
        });
        EnrichedRecord::new(listing, metadata).with_category(category)
    }

    fn ids(records: &[&ClassifiedRecord]) -> Vec<String> {
        records.iter().map(|r| r.listing.id.clone()).collect()
    }

    #[test]
    fn image_beats_comment_count() {
        let records = vec![record("plain", "Tools", 50, false), record("pic", "Tools", 3, true)];
        let groups = group_by_category(&records);
        assert_eq!(ids(&groups["Tools"]), vec!["pic", "plain"]);
    }

    #[test]
    fn comments_break_ties_between_images() {
        let records = vec![
            record("few", "Tools", 2, true),
            record("many", "Tools", 20, true),
            record("none", "Tools", 90, false),
        ];
        let groups = group_by_category(&records);
        assert_eq!(ids(&groups["Tools"]), vec!["many", "few", "none"]);
    }

    #[test]
    fn equal_keys_keep_collection_order() {
        let records = vec![record("x", "Tools", 5, false), record("y", "Tools", 5, false)];
        let groups = group_by_category(&records);
        assert_eq!(ids(&groups["Tools"]), vec!["x", "y"]);
    }

    #[test]
    fn other_is_displayed_last() {
        let order = category_order(["Other", "Games", "AI & LLM Tools", "Games"]);
        assert_eq!(order, vec!["AI & LLM Tools", "Games", "Other"]);

        let records = vec![
            record("1", "Other", 1, false),
            record("2", "Zebra Tools", 1, false),
            record("3", "Art", 1, false),
        ];
        let names: Vec<&str> = display_groups(&records).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Art", "Zebra Tools", "Other"]);
    }

    #[test]
    fn slug_lookup_returns_sorted_members() {
        let records = vec![
            record("a", "Data Visualization & Dashboards", 1, false),
            record("b", "Games", 1, false),
            record("c", "Data Visualization & Dashboards", 9, false),
        ];
        let members = category_for_slug(&records, "Data-Visualization-Dashboards");
        assert_eq!(ids(&members), vec!["c", "a"]);
        assert!(category_for_slug(&records, "nope").is_empty());
    }

    #[test]
    fn search_matches_title_author_and_category() {
        let mut by_author = record("1", "Tools", 1, false);
        by_author.listing.author = "RustAcean".to_string();
        let records = vec![
            record("2", "Games", 1, false),
            by_author,
            record("3", "Rust Things", 1, false),
        ];

        assert_eq!(ids(&search(&records, "rust")), vec!["1", "3"]);
        assert_eq!(ids(&search(&records, "APP 2")), vec!["2"]);
        assert!(search(&records, "   ").is_empty());
        assert!(search(&records, "zzz").is_empty());
    }
}
