// src/pipeline/batch.rs

//! Batch ingestion pipeline.
//!
//! Two sequential phases:
//! 1. Geocode warm-up over every distinct physical location in the batch
//! 2. Per-posting duplicate resolution, guarded by the fail-fast breaker
//!
//! Per-posting errors land in the result list. The batch itself only fails
//! when the breaker trips.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{BatchConfig, BatchOutcome, BatchStats, JobResult, PostingInput};
use crate::pipeline::circuit_breaker::{CircuitBreaker, CircuitBreakerResult};
use crate::pipeline::metrics::{DailyMetrics, SessionMetrics};
use crate::pipeline::resolver::{DuplicateResolver, ProcessOptions};
use crate::services::location::parse_location_type;

/// Which half of the batch a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Geocoding,
    Processing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Geocoding => write!(f, "geocoding"),
            Phase::Processing => write!(f, "processing"),
        }
    }
}

/// One progress event; `current` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Per-batch switches.
#[derive(Clone, Default)]
pub struct BatchOptions {
    pub skip_index: bool,
    /// Source tag for the daily `source:{tag}` counter
    pub source: Option<String>,
    pub on_progress: Option<ProgressFn>,
}

impl BatchOptions {
    pub fn skip_index(mut self, skip_index: bool) -> Self {
        self.skip_index = skip_index;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn on_progress(mut self, f: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    fn report(&self, phase: Phase, current: usize, total: usize) {
        if let Some(f) = &self.on_progress {
            f(Progress {
                phase,
                current,
                total,
            });
        }
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("skip_index", &self.skip_index)
            .field("source", &self.source)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Everything a batch run touches.
pub struct BatchContext<'a> {
    pub resolver: &'a DuplicateResolver,
    pub daily: &'a DailyMetrics,
    pub metrics: &'a SessionMetrics,
    pub config: &'a BatchConfig,
}

/// Run a batch of postings through warm-up and resolution.
pub async fn process_job_batch(
    ctx: &BatchContext<'_>,
    postings: &[PostingInput],
    options: &BatchOptions,
) -> Result<BatchOutcome> {
    log::info!(
        "Processing batch of {} postings{}",
        postings.len(),
        options
            .source
            .as_deref()
            .map(|s| format!(" from {s}"))
            .unwrap_or_default()
    );

    warm_geocode_cache(ctx, postings, options).await;

    let mut breaker = CircuitBreaker::with_config(ctx.config.into());
    let mut stats = BatchStats {
        total: postings.len(),
        ..BatchStats::default()
    };
    let mut results = Vec::with_capacity(postings.len());
    let process = ProcessOptions {
        skip_index: options.skip_index,
    };

    for (i, posting) in postings.iter().enumerate() {
        let check = match ctx.resolver.process_job(posting, process).await {
            Ok(verdict) => {
                if verdict.is_duplicate {
                    stats.duplicates += 1;
                } else if verdict.indexed == Some(true) {
                    stats.indexed += 1;
                }
                results.push(JobResult::ok(&posting.id, verdict));
                breaker.record_success()
            }
            Err(e) => {
                log::warn!("Posting {} failed: {}", posting.id, e);
                ctx.metrics.record_error();
                stats.errors += 1;
                results.push(JobResult::failed(&posting.id, e));
                breaker.record_failure()
            }
        };

        if let CircuitBreakerResult::Tripped {
            attempted,
            errors,
            error_rate,
        } = check
        {
            return Err(AppError::FailFast {
                error_rate,
                errors,
                attempted,
                partial: results,
            });
        }

        let current = i + 1;
        options.report(Phase::Processing, current, postings.len());
        if ctx.config.progress_every > 0 && current % ctx.config.progress_every == 0 {
            log::info!(
                "  [{}/{}] {} duplicates, {} indexed, {} errors",
                current,
                postings.len(),
                stats.duplicates,
                stats.indexed,
                stats.errors
            );
        }
    }

    if let Err(e) = ctx.daily.record_batch(&stats, options.source.as_deref()).await {
        log::warn!("Failed to record daily metrics: {}", e);
        ctx.metrics.record_error();
    }

    log::info!(
        "Batch complete: {} postings, {} duplicates, {} indexed, {} errors",
        stats.total,
        stats.duplicates,
        stats.indexed,
        stats.errors
    );
    Ok(BatchOutcome { results, stats })
}

/// Resolve each distinct physical location once so the per-posting phase
/// reads from the cache. Postings that will be rejected are skipped.
async fn warm_geocode_cache(
    ctx: &BatchContext<'_>,
    postings: &[PostingInput],
    options: &BatchOptions,
) {
    let mut seen = HashSet::new();
    let locations: Vec<&str> = postings
        .iter()
        .filter(|p| p.validate().is_ok())
        .map(|p| p.raw_location.as_str())
        .filter(|raw| parse_location_type(raw).needs_geocoding)
        .filter(|raw| seen.insert(*raw))
        .collect();

    if locations.is_empty() {
        return;
    }
    log::info!("Warming geocode cache for {} locations", locations.len());

    let locator = ctx.resolver.locations();
    for (i, raw) in locations.iter().enumerate() {
        locator.resolve(raw).await;
        options.report(Phase::Geocoding, i + 1, locations.len());
    }
}
