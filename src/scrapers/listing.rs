//! Listing page parser.
//!
//! A listing page is a table of post rows. Each post is two rows: the title
//! row (`tr.athing`, carrying the post id) and the subtext row right after it
//! (score, author, age, comment link). The "More" link at the bottom points at
//! the next page.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::error::PipelineError;
use crate::models::ListingRecord;
use crate::utils::{collapse_whitespace, digits_in};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static POST_ROW: Lazy<Selector> = Lazy::new(|| selector("tr.athing"));
static TITLE_LINK: Lazy<Selector> = Lazy::new(|| selector(".titleline > a"));
static AUTHOR: Lazy<Selector> = Lazy::new(|| selector(".hnuser"));
static SCORE: Lazy<Selector> = Lazy::new(|| selector(".score"));
static AGE: Lazy<Selector> = Lazy::new(|| selector(".age"));
static SUBTEXT_LINK: Lazy<Selector> = Lazy::new(|| selector("a"));
static MORE_LINK: Lazy<Selector> = Lazy::new(|| selector("a.morelink"));

/// Posts parsed from one listing page plus the pointer to the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub records: Vec<ListingRecord>,
    pub next_url: Option<Url>,
}

/// Parse a listing page fetched from `page_url`.
///
/// A page with neither post rows nor a next-page link is not a listing page
/// (rate-limit notices, error pages) and is reported as a parse failure.
pub fn parse_listing_page(html: &str, page_url: &Url) -> Result<ListingPage, PipelineError> {
    let document = Html::parse_document(html);

    let mut records = Vec::new();
    for row in document.select(&POST_ROW) {
        match parse_post(row, page_url) {
            Some(record) => records.push(record),
            None => debug!(page = %page_url, "Skipping post row without id"),
        }
    }

    let next_url = document
        .select(&MORE_LINK)
        .next()
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| page_url.join(href).ok());

    if records.is_empty() && next_url.is_none() {
        return Err(PipelineError::parse(
            page_url.as_str(),
            "no post rows and no next-page link",
        ));
    }

    Ok(ListingPage { records, next_url })
}

fn parse_post(row: ElementRef<'_>, page_url: &Url) -> Option<ListingRecord> {
    let id = row.value().attr("id").map(str::trim).filter(|id| !id.is_empty())?;
    let discussion_url = discussion_url(page_url, id);

    let title_link = row.select(&TITLE_LINK).next();
    let title = title_link.map(|a| element_text(&a)).unwrap_or_default();
    let destination_url = title_link
        .and_then(|a| a.value().attr("href"))
        .map(|href| resolve_link(page_url, href))
        .unwrap_or_else(|| discussion_url.clone());

    let subtext = row.next_siblings().find_map(ElementRef::wrap);
    let author = subtext
        .and_then(|sub| sub.select(&AUTHOR).next())
        .map(|a| element_text(&a))
        .unwrap_or_default();
    let score = subtext
        .and_then(|sub| sub.select(&SCORE).next())
        .map(|s| digits_in(&element_text(&s)))
        .unwrap_or(0);
    let comment_count = subtext
        .and_then(|sub| {
            sub.select(&SUBTEXT_LINK)
                .map(|a| element_text(&a))
                .filter(|text| text.contains("comment"))
                .last()
        })
        .map(|text| digits_in(&text))
        .unwrap_or(0);
    let timestamp = subtext
        .and_then(|sub| sub.select(&AGE).next())
        .and_then(|age| age.value().attr("title"))
        .unwrap_or_default()
        .to_string();

    Some(ListingRecord {
        id: id.to_string(),
        title,
        destination_url,
        discussion_url,
        author,
        score,
        comment_count,
        timestamp,
    })
}

fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Absolute discussion page URL for a post id, on the listing's own host.
fn discussion_url(page_url: &Url, id: &str) -> String {
    page_url
        .join(&format!("item?id={id}"))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| format!("{}/item?id={id}", page_url.origin().ascii_serialization()))
}

/// Self posts link to `item?id=…` relative to the listing; resolve those (and
/// any other relative link) against the page URL.
fn resolve_link(page_url: &Url, href: &str) -> String {
    match page_url.join(href.trim()) {
        Ok(url) => url.to_string(),
        Err(_) => href.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_ONE: &str = r#"<html><body><table id="hnmain"><tr><td>
<table class="itemlist">
  <tr class="athing submission" id="101">
    <td class="title"><span class="rank">1.</span></td>
    <td class="title"><span class="titleline"><a href="https://tool.example/app">Show HN: A   dashboard for bikes</a><span class="sitebit comhead"> (<a href="from?site=tool.example"><span class="sitestr">tool.example</span></a>)</span></span></td>
  </tr>
  <tr><td colspan="2"></td><td class="subtext"><span class="subline">
    <span class="score" id="score_101">45 points</span> by <a href="user?id=alice" class="hnuser">alice</a>
    <span class="age" title="2026-01-05T12:00:00 1767614400"><a href="item?id=101">3 hours ago</a></span>
    | <a href="hide?id=101&amp;goto=show">hide</a> | <a href="item?id=101">12&nbsp;comments</a>
  </span></td></tr>
  <tr class="spacer"></tr>
  <tr class="athing submission" id="102">
    <td class="title"><span class="titleline"><a href="item?id=102">Show HN: My self post</a></span></td>
  </tr>
  <tr><td colspan="2"></td><td class="subtext"><span class="subline">
    <span class="score" id="score_102">1 point</span> by <a href="user?id=bob" class="hnuser">bob</a>
    <span class="age" title="2026-01-04T08:30:00 1767515400"><a href="item?id=102">1 day ago</a></span>
    | <a href="item?id=102">discuss</a>
  </span></td></tr>
  <tr class="morespace"></tr>
  <tr><td colspan="2"></td><td class="title"><a href="show?p=2" class="morelink" rel="next">More</a></td></tr>
</table>
</td></tr></table></body></html>"#;

    fn show_url() -> Url {
        Url::parse("https://news.ycombinator.com/show").unwrap()
    }

    #[test]
    fn parses_post_rows_and_subtext() {
        let page = parse_listing_page(PAGE_ONE, &show_url()).unwrap();
        assert_eq!(page.records.len(), 2);

        let first = &page.records[0];
        assert_eq!(first.id, "101");
        assert_eq!(first.title, "Show HN: A dashboard for bikes");
        assert_eq!(first.destination_url, "https://tool.example/app");
        assert_eq!(
            first.discussion_url,
            "https://news.ycombinator.com/item?id=101"
        );
        assert_eq!(first.author, "alice");
        assert_eq!(first.score, 45);
        assert_eq!(first.comment_count, 12);
        assert_eq!(first.timestamp, "2026-01-05T12:00:00 1767614400");
    }

    #[test]
    fn self_post_link_becomes_absolute_discussion_url() {
        let page = parse_listing_page(PAGE_ONE, &show_url()).unwrap();
        let self_post = &page.records[1];
        assert_eq!(
            self_post.destination_url,
            "https://news.ycombinator.com/item?id=102"
        );
        assert_eq!(self_post.destination_url, self_post.discussion_url);
        assert_eq!(self_post.comment_count, 0);
        assert_eq!(self_post.score, 1);
    }

    #[test]
    fn next_page_pointer_is_resolved() {
        let page = parse_listing_page(PAGE_ONE, &show_url()).unwrap();
        assert_eq!(
            page.next_url.unwrap().as_str(),
            "https://news.ycombinator.com/show?p=2"
        );
    }

    #[test]
    fn last_page_has_no_next_pointer() {
        let html = PAGE_ONE.replace(
            r#"<a href="show?p=2" class="morelink" rel="next">More</a>"#,
            "",
        );
        let page = parse_listing_page(&html, &show_url()).unwrap();
        assert!(page.next_url.is_none());
        assert_eq!(page.records.len(), 2);
    }

    #[test]
    fn page_without_rows_or_pointer_is_a_parse_failure() {
        let err = parse_listing_page(
            "<html><body>Sorry, we're not able to serve your requests this quickly.</body></html>",
            &show_url(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn row_without_id_is_skipped() {
        let html = PAGE_ONE.replace(r#"id="102""#, "");
        let page = parse_listing_page(&html, &show_url()).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "101");
    }
}
