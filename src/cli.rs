//! Command-line interface definitions.
//!
//! Each pipeline stage is its own subcommand so a stage can be re-run against
//! the collection the previous stage left in `--data-dir`. Tunables are global
//! flags; the model credential can also come from the environment.
//!
//! # Examples
//!
//! ```sh
//! # Whole pipeline with keyword rules
//! show_directory run --strategy keyword
//!
//! # One stage at a time
//! show_directory crawl --max-pages-per-url 5
//! show_directory fetch --concurrency 16
//! show_directory extract
//! OPENAI_API_KEY=... show_directory classify --strategy model
//!
//! # Read path
//! show_directory search --query rust
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for the directory pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Walk the listing pages and write the raw post records.
    Crawl,
    /// Fill the fetch cache with each post's destination page.
    Fetch,
    /// Derive metadata for every post from the fetch cache.
    Extract,
    /// Assign exactly one category to every post.
    Classify(ClassifyArgs),
    /// Re-validate the image of every classified post, dropping dead ones.
    CleanImages,
    /// Print the categorized directory.
    Directory(DirectoryArgs),
    /// Print posts whose title, author or category contain the query.
    Search(SearchArgs),
    /// Print collection statistics.
    Stats,
    /// Run crawl, fetch, extract and classify in order.
    Run(ClassifyArgs),
}

/// Which classifier assigns categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Ordered keyword rules; deterministic, offline.
    Keyword,
    /// Generative model: discover a balanced category set, then classify in batches.
    Model,
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    #[arg(long, value_enum, default_value_t = Strategy::Keyword)]
    pub strategy: Strategy,
}

#[derive(Debug, Args)]
pub struct DirectoryArgs {
    /// Only print the category with this slug.
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(short, long)]
    pub query: String,
}

/// Flags shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Directory holding the persisted collections and the fetch cache
    #[arg(short, long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Optional YAML file with keyword rules and image heuristic overrides
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Listing page to start crawling from (repeatable)
    #[arg(
        long = "listing-url",
        global = true,
        default_values = ["https://news.ycombinator.com/show", "https://news.ycombinator.com/shownew"]
    )]
    pub listing_urls: Vec<String>,

    /// Maximum listing pages followed per start URL
    #[arg(long, global = true, default_value_t = 30)]
    pub max_pages_per_url: usize,

    /// Delay between listing page requests
    #[arg(long, global = true, default_value_t = 1000)]
    pub listing_delay_ms: u64,

    /// Delay between destination page requests
    #[arg(long, global = true, default_value_t = 200)]
    pub fetch_delay_ms: u64,

    /// Maximum concurrent fetches, extractions or model batches
    #[arg(long, global = true, default_value_t = 8)]
    pub concurrency: usize,

    /// Timeout for destination page fetches
    #[arg(long, global = true, default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Timeout for image validation probes
    #[arg(long, global = true, default_value_t = 8)]
    pub image_timeout_secs: u64,

    /// API key for the OpenAI-compatible classification service
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible classification service
    #[arg(
        long,
        global = true,
        env = "OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Model used for category discovery and classification
    #[arg(long, global = true, default_value = "gpt-4o-mini")]
    pub model: String,

    /// Records per classification request
    #[arg(long, global = true, default_value_t = 50)]
    pub batch_size: usize,

    /// Records shown to the model when proposing categories
    #[arg(long, global = true, default_value_t = 300)]
    pub sample_size: usize,
}
