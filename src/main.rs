use std::error::Error;

use clap::Parser;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use show_directory::cli::{Cli, Command};
use show_directory::config::PipelineConfig;
use show_directory::pipeline;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(command = ?args.command, data_dir = %args.global.data_dir.display(), "Parsed CLI arguments");

    let config = match PipelineConfig::from_args(&args.global) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let outcome = match args.command {
        Command::Crawl => pipeline::run_crawl(&config).await.map(drop),
        Command::Fetch => pipeline::run_fetch(&config).await.map(drop),
        Command::Extract => pipeline::run_extract(&config).await.map(drop),
        Command::Classify(classify) => pipeline::run_classify(&config, classify.strategy).await.map(drop),
        Command::CleanImages => pipeline::run_clean_images(&config).await.map(drop),
        Command::Run(classify) => pipeline::run_all(&config, classify.strategy).await,
        Command::Directory(directory) => pipeline::load_classified(&config).map(|records| {
            print!("{}", pipeline::directory_report(&records, directory.category.as_deref()));
        }),
        Command::Search(search) => pipeline::load_classified(&config).map(|records| {
            print!("{}", pipeline::search_report(&records, &search.query));
        }),
        Command::Stats => pipeline::stats_report(&config).map(|report| print!("{report}")),
    };

    if let Err(e) = outcome {
        error!(error = %e, "Command failed");
        return Err(e.into());
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
