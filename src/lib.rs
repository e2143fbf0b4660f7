//! # Show Directory
//!
//! Crawls the "Show" listing pages of a link aggregator, fetches and caches
//! every destination page, derives metadata and a preview image from each,
//! and sorts the posts into a categorized, searchable directory.
//!
//! ## Pipeline
//!
//! 1. **Crawl** ([`scrapers`]): follow each start URL's pagination chain and
//!    parse post rows into [`models::ListingRecord`]s
//! 2. **Fetch** ([`cache`]): content-addressed cache of destination pages,
//!    fetched at most once per URL, failures included
//! 3. **Extract** ([`metadata`]): rule-based metadata plus a validated preview
//!    image, with a repository-README fallback
//! 4. **Classify** ([`classify`]): keyword rules, or a generative model that
//!    first discovers a category set and then assigns posts in batches
//! 5. **Read** ([`directory`], [`stats`]): grouping, slug lookup, search and
//!    collection statistics
//!
//! Each stage persists its collection under the data directory
//! ([`store`]), so stages can be re-run independently ([`pipeline`]).

#![forbid(unsafe_code)]

pub mod api;
pub mod cache;
pub mod classify;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod metadata;
pub mod models;
pub mod pacer;
pub mod pipeline;
pub mod scrapers;
pub mod stats;
pub mod store;
pub mod utils;
