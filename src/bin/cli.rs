//! jobdedup CLI
//!
//! Operational entry point over a file-backed index. Every command prints
//! JSON to stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use clap::{Parser, Subcommand};
use jobdedup::{
    AppError, BatchOptions, Config, Deduplicator, LocalStore, PostingInput, Result,
    services::Geocoder,
};
use serde::Serialize;

/// jobdedup - near-duplicate job posting index
#[derive(Parser, Debug)]
#[command(name = "jobdedup", version, about = "Near-duplicate job posting index")]
struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Index snapshot path (overrides storage.path)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a JSON array of postings through the index
    Ingest {
        file: PathBuf,
        /// Source tag for the daily counters
        #[arg(long)]
        source: Option<String>,
        /// Decide only; do not index unique postings
        #[arg(long)]
        skip_index: bool,
    },
    /// Report which ids are already indexed
    Check {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Index sizes and counters
    Stats,
    /// Drop stale band bucket members
    Cleanup,
    /// Remove postings indexed within a time range
    ClearRange {
        /// Epoch millis, RFC 3339, or YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Epoch millis, RFC 3339, or YYYY-MM-DD (inclusive)
        #[arg(long)]
        end: String,
    },
    /// Delete everything under the key prefix
    ClearAll {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Remove one posting from the index
    Remove { id: String },
    /// Validate configuration
    Validate,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a range bound as epoch millis.
fn parse_timestamp(raw: &str, end_of_day: bool) -> Result<i64> {
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("unrecognised timestamp '{raw}'")))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc().timestamp_millis())
        .ok_or_else(|| AppError::validation(format!("invalid date '{raw}'")))
}

#[cfg(feature = "geocode")]
fn build_geocoder(config: &Config) -> Result<Option<Arc<dyn Geocoder>>> {
    if config.geocoder.endpoint.is_none() {
        return Ok(None);
    }
    let geocoder = jobdedup::services::HttpGeocoder::new(&config.geocoder)?;
    Ok(Some(Arc::new(geocoder)))
}

#[cfg(not(feature = "geocode"))]
fn build_geocoder(_config: &Config) -> Result<Option<Arc<dyn Geocoder>>> {
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);

    if let Command::Validate = cli.command {
        log::info!("Validating {}", cli.config.display());
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!("✓ Config OK");
        return print_json(&config);
    }

    let store_path = cli
        .store
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.storage.path));
    let store = Arc::new(LocalStore::open(&store_path).await?);

    let mut builder = Deduplicator::builder().config(config.clone()).store(store);
    if let Some(geocoder) = build_geocoder(&config)? {
        builder = builder.geocoder(geocoder);
    }
    let dedup = builder.build()?;

    let result = run(&dedup, cli.command).await;
    let flushed = dedup.flush().await;
    result?;
    flushed?;

    log::info!("Done!");
    Ok(())
}

async fn run(dedup: &Deduplicator, command: Command) -> Result<()> {
    match command {
        Command::Ingest {
            file,
            source,
            skip_index,
        } => {
            let content = tokio::fs::read_to_string(&file).await?;
            let postings: Vec<PostingInput> = serde_json::from_str(&content)?;
            log::info!("Loaded {} postings from {}", postings.len(), file.display());

            let mut options = BatchOptions::default().skip_index(skip_index);
            if let Some(source) = source {
                options = options.source(source);
            }

            match dedup.process_job_batch(&postings, &options).await {
                Ok(outcome) => print_json(&outcome)?,
                Err(AppError::FailFast {
                    error_rate,
                    errors,
                    attempted,
                    partial,
                }) => {
                    print_json(&partial)?;
                    return Err(AppError::FailFast {
                        error_rate,
                        errors,
                        attempted,
                        partial: Vec::new(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Command::Check { ids } => print_json(&dedup.check_existing_jobs(&ids).await?)?,

        Command::Stats => print_json(&dedup.get_stats().await?)?,

        Command::Cleanup => print_json(&dedup.cleanup_expired_bands().await?)?,

        Command::ClearRange { start, end } => {
            let start_ms = parse_timestamp(&start, false)?;
            let end_ms = parse_timestamp(&end, true)?;
            let removed = dedup.clear_by_date_range(start_ms, end_ms).await?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }

        Command::ClearAll { yes } => {
            if !yes {
                log::warn!(
                    "Refusing to clear {} without --yes",
                    dedup.config().index.key_prefix
                );
                return Err(AppError::validation("clear-all requires --yes"));
            }
            let deleted = dedup.clear_all().await?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }

        Command::Remove { id } => {
            let removed = dedup.remove_job(&id).await?;
            if !removed {
                log::warn!("{} was not indexed", id);
            }
            print_json(&serde_json::json!({ "id": id, "removed": removed }))?;
        }

        // Handled before the store is opened
        Command::Validate => {}
    }
    Ok(())
}
