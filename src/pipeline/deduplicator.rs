// src/pipeline/deduplicator.rs

//! Entry point wiring config, store, geocoder and metrics into one
//! instance.
//!
//! ```no_run
//! # async fn run() -> jobdedup::error::Result<()> {
//! use std::sync::Arc;
//! use jobdedup::{Config, Deduplicator, MemoryStore, PostingInput};
//! use jobdedup::pipeline::ProcessOptions;
//!
//! let dedup = Deduplicator::builder()
//!     .config(Config::default())
//!     .store(Arc::new(MemoryStore::new()))
//!     .build()?;
//!
//! let posting = PostingInput::new("job-1").company("Acme").title("Cook");
//! let verdict = dedup.process_job(&posting, ProcessOptions::default()).await?;
//! # let _ = verdict;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{
    BatchOutcome, Config, ExistenceCheck, Fingerprint, LocationComparison, LocationInfo,
    PostingInput, Verdict,
};
use crate::pipeline::batch::{self, BatchContext, BatchOptions};
use crate::pipeline::index::{FingerprintIndex, JobData};
use crate::pipeline::maintenance::{self, CleanupReport};
use crate::pipeline::metrics::{DailyMetrics, SessionMetrics, SessionSnapshot};
use crate::pipeline::resolver::{DuplicateResolver, ProcessOptions};
use crate::services::geocoder::Geocoder;
use crate::services::location::{self, LocationResolver};
use crate::storage::{KeyedStore, Keys};

/// Index-wide sizes plus both counter views.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub indexed_jobs: usize,
    pub geo_cache_size: usize,
    pub band_buckets: usize,
    pub today: BTreeMap<String, i64>,
    pub session: SessionSnapshot,
}

/// Builder for [`Deduplicator`]. A store is required; a geocoder is not.
#[derive(Default)]
pub struct DeduplicatorBuilder {
    config: Config,
    store: Option<Arc<dyn KeyedStore>>,
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl DeduplicatorBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyedStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn build(self) -> Result<Deduplicator> {
        let store = self
            .store
            .ok_or_else(|| AppError::config("a keyed store is required"))?;
        self.config.validate()?;

        let config = self.config;
        let keys = Keys::new(config.index.key_prefix.clone());
        let metrics = Arc::new(SessionMetrics::default());

        if self.geocoder.is_none() {
            log::warn!("No geocoder configured; physical locations will not be resolved");
        }

        let index = FingerprintIndex::new(Arc::clone(&store), keys.clone(), config.index.job_ttl());
        let locations = LocationResolver::new(
            Arc::clone(&store),
            self.geocoder,
            keys.clone(),
            &config.location,
            Arc::clone(&metrics),
        );
        let resolver = DuplicateResolver::new(
            index.clone(),
            Arc::new(locations),
            &config.fingerprint,
            &config.location,
            Arc::clone(&metrics),
        );
        let daily = DailyMetrics::new(Arc::clone(&store), keys, config.index.metrics_ttl());

        Ok(Deduplicator {
            config,
            store,
            index,
            resolver,
            daily,
            metrics,
        })
    }
}

/// One configured dedup instance. Instances never share counters.
pub struct Deduplicator {
    config: Config,
    store: Arc<dyn KeyedStore>,
    index: FingerprintIndex,
    resolver: DuplicateResolver,
    daily: DailyMetrics,
    metrics: Arc<SessionMetrics>,
}

impl Deduplicator {
    pub fn builder() -> DeduplicatorBuilder {
        DeduplicatorBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn process_job(
        &self,
        posting: &PostingInput,
        options: ProcessOptions,
    ) -> Result<Verdict> {
        self.resolver.process_job(posting, options).await
    }

    pub async fn process_job_batch(
        &self,
        postings: &[PostingInput],
        options: &BatchOptions,
    ) -> Result<BatchOutcome> {
        let ctx = BatchContext {
            resolver: &self.resolver,
            daily: &self.daily,
            metrics: &self.metrics,
            config: &self.config.batch,
        };
        let outcome = batch::process_job_batch(&ctx, postings, options).await;
        let flushed = self.store.flush().await;
        let outcome = outcome?;
        flushed?;
        Ok(outcome)
    }

    /// Make buffered store writes durable.
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    pub fn generate_fingerprint(&self, posting: &PostingInput) -> Fingerprint {
        self.resolver.generator().generate(posting)
    }

    pub async fn resolve_location(&self, raw: &str) -> LocationInfo {
        self.resolver.locations().resolve(raw).await
    }

    /// Compare two locations with this instance's thresholds.
    pub fn compare_locations(&self, a: &LocationInfo, b: &LocationInfo) -> LocationComparison {
        location::compare_locations(
            a,
            b,
            self.config.location.same_threshold_miles,
            self.config.location.different_threshold_miles,
        )
    }

    pub async fn get_job_data(&self, id: &str) -> Result<Option<JobData>> {
        self.index.get_job_data(id).await
    }

    pub async fn remove_job(&self, id: &str) -> Result<bool> {
        self.index.remove_job(id).await
    }

    pub async fn check_existing_jobs(&self, ids: &[String]) -> Result<ExistenceCheck> {
        self.index.check_existing_jobs(ids).await
    }

    pub async fn get_stats(&self) -> Result<IndexStats> {
        let keys = self.index.keys();
        let fingerprint_prefix = keys.fingerprint_prefix();
        let geo_prefix = keys.geo_prefix();
        let band_prefix = keys.band_prefix();
        let (fingerprints, geo, bands, today) = futures::try_join!(
            self.store.scan_prefix(&fingerprint_prefix),
            self.store.scan_prefix(&geo_prefix),
            self.store.scan_prefix(&band_prefix),
            self.daily.today(),
        )?;

        Ok(IndexStats {
            indexed_jobs: fingerprints.len(),
            geo_cache_size: geo.len(),
            band_buckets: bands.len(),
            today,
            session: self.metrics.snapshot(),
        })
    }

    pub async fn cleanup_expired_bands(&self) -> Result<CleanupReport> {
        maintenance::cleanup_expired_bands(self.store.as_ref(), &self.index).await
    }

    /// Remove postings whose `indexedAt` (epoch ms) falls in the inclusive
    /// range. Returns how many were removed.
    pub async fn clear_by_date_range(&self, start_ms: i64, end_ms: i64) -> Result<usize> {
        if start_ms > end_ms {
            return Err(AppError::validation(format!(
                "range start {start_ms} is after end {end_ms}"
            )));
        }
        maintenance::clear_by_date_range(self.store.as_ref(), &self.index, start_ms, end_ms).await
    }

    /// Delete all state under the key prefix and reset session counters.
    pub async fn clear_all(&self) -> Result<usize> {
        let deleted = maintenance::clear_all(self.store.as_ref(), &self.index).await?;
        self.metrics.reset();
        Ok(deleted)
    }

    pub fn session_metrics(&self) -> SessionSnapshot {
        self.metrics.snapshot()
    }
}
