//! Run configuration.
//!
//! [`PipelineConfig`] is assembled once from the command line and the optional
//! YAML file, then handed to every stage. The YAML file only carries what is
//! awkward as flags: the keyword rule table and image heuristic overrides.
//!
//! ```yaml
//! keyword_rules:
//!   - category: Games & Entertainment
//!     keywords: [game, puzzle, rpg]
//!   - category: Developer Tools & Frameworks
//!     keywords: [cli, compiler, debugger]
//! images:
//!   extra_blacklist: [tracker.example]
//!   preview_keywords: [screenshot, demo]
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::cache::FetchSettings;
use crate::classify::keyword::{KeywordRule, default_rules};
use crate::classify::model::ModelSettings;
use crate::cli::GlobalArgs;
use crate::error::PipelineError;
use crate::metadata::images::ImageSettings;
use crate::scrapers::CrawlSettings;
use crate::store::DataDir;

/// Contents of the `--config` YAML file. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub keyword_rules: Option<Vec<KeywordRule>>,
    pub images: ImageOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageOverrides {
    pub extra_blacklist: Vec<String>,
    pub preview_keywords: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: FileConfig = serde_yaml::from_str(&raw)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }
}

/// Credentials and endpoint for the generative classifier.
#[derive(Clone)]
pub struct ModelEndpoint {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl fmt::Debug for ModelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelEndpoint")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ModelEndpoint {
    /// The API key, or a configuration error naming how to provide it.
    pub fn require_api_key(&self) -> Result<&str, PipelineError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration(
                    "the model strategy needs an API key; set OPENAI_API_KEY or pass --openai-api-key"
                        .to_string(),
                )
            })
    }
}

/// Everything a pipeline run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data: DataDir,
    pub crawl: CrawlSettings,
    pub fetch: FetchSettings,
    pub images: ImageSettings,
    pub keyword_rules: Vec<KeywordRule>,
    pub model: ModelSettings,
    pub endpoint: ModelEndpoint,
}

impl PipelineConfig {
    /// Build from parsed flags, reading `--config` when given.
    pub fn from_args(args: &GlobalArgs) -> Result<Self, PipelineError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::from_parts(args, file)
    }

    pub fn from_parts(args: &GlobalArgs, file: FileConfig) -> Result<Self, PipelineError> {
        if args.concurrency == 0 {
            return Err(PipelineError::Configuration(
                "--concurrency must be at least 1".to_string(),
            ));
        }
        if args.batch_size == 0 {
            return Err(PipelineError::Configuration(
                "--batch-size must be at least 1".to_string(),
            ));
        }

        let start_urls = args
            .listing_urls
            .iter()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    PipelineError::Configuration(format!("invalid --listing-url {raw:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut images = ImageSettings {
            timeout: Duration::from_secs(args.image_timeout_secs),
            extra_blacklist: file.images.extra_blacklist,
            ..ImageSettings::default()
        };
        if let Some(keywords) = file.images.preview_keywords {
            images.preview_keywords = keywords;
        }

        let keyword_rules = match file.keyword_rules {
            Some(rules) if !rules.is_empty() => {
                info!(rules = rules.len(), "Using keyword rules from configuration file");
                rules
            }
            _ => default_rules(),
        };

        Ok(Self {
            data: DataDir::new(PathBuf::from(&args.data_dir)),
            crawl: CrawlSettings {
                start_urls,
                max_pages_per_url: args.max_pages_per_url,
                delay: Duration::from_millis(args.listing_delay_ms),
            },
            fetch: FetchSettings {
                timeout: Duration::from_secs(args.fetch_timeout_secs),
                delay: Duration::from_millis(args.fetch_delay_ms),
                concurrency: args.concurrency,
            },
            images,
            keyword_rules,
            model: ModelSettings {
                batch_size: args.batch_size,
                sample_size: args.sample_size,
                concurrency: args.concurrency,
            },
            endpoint: ModelEndpoint {
                api_key: args.openai_api_key.clone(),
                base_url: args.openai_base_url.clone(),
                model: args.model.clone(),
            },
        })
    }
}
