//! Session and daily counters.
//!
//! Two independent views that are never reconciled:
//! - [`SessionMetrics`]: per-instance, in memory, lives as long as the process
//! - [`DailyMetrics`]: per calendar day in the keyed store, bumped once per
//!   completed batch

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::BatchStats;
use crate::storage::{Command, KeyedStore, Keys};

/// In-memory counters owned by one dedup instance.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    processed: AtomicU64,
    duplicates: AtomicU64,
    indexed: AtomicU64,
    location_vetoes: AtomicU64,
    geo_cache_hits: AtomicU64,
    geo_cache_misses: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`SessionMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub processed: u64,
    pub duplicates: u64,
    pub indexed: u64,
    pub location_vetoes: u64,
    pub geo_cache_hits: u64,
    pub geo_cache_misses: u64,
    pub errors: u64,
}

impl SessionMetrics {
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_indexed(&self) {
        self.indexed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_location_veto(&self) {
        self.location_vetoes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_geo_cache_hit(&self) {
        self.geo_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_geo_cache_miss(&self) {
        self.geo_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            indexed: self.indexed.load(Ordering::Relaxed),
            location_vetoes: self.location_vetoes.load(Ordering::Relaxed),
            geo_cache_hits: self.geo_cache_hits.load(Ordering::Relaxed),
            geo_cache_misses: self.geo_cache_misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.processed,
            &self.duplicates,
            &self.indexed,
            &self.location_vetoes,
            &self.geo_cache_hits,
            &self.geo_cache_misses,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Persisted per-day counters.
pub struct DailyMetrics {
    store: Arc<dyn KeyedStore>,
    keys: Keys,
    ttl: Duration,
}

impl DailyMetrics {
    pub fn new(store: Arc<dyn KeyedStore>, keys: Keys, ttl: Duration) -> Self {
        Self { store, keys, ttl }
    }

    /// Add a completed batch to today's counters.
    pub async fn record_batch(&self, stats: &BatchStats, source: Option<&str>) -> Result<()> {
        self.record_batch_on(Utc::now().date_naive(), stats, source)
            .await
    }

    pub async fn record_batch_on(
        &self,
        date: NaiveDate,
        stats: &BatchStats,
        source: Option<&str>,
    ) -> Result<()> {
        let key = self.keys.daily_metrics(date);
        let incr = |field: String, delta: usize| Command::HIncrBy {
            key: key.clone(),
            field,
            delta: delta as i64,
        };

        let mut batch = vec![
            incr("processed".into(), stats.total),
            incr("duplicates".into(), stats.duplicates),
            incr("indexed".into(), stats.indexed),
        ];
        if let Some(source) = source {
            batch.push(incr(format!("source:{source}"), stats.total));
        }
        batch.push(Command::Expire {
            key: key.clone(),
            ttl: self.ttl,
        });

        self.store.exec(batch).await?;
        Ok(())
    }

    /// Today's counters, empty if nothing was recorded.
    pub async fn today(&self) -> Result<BTreeMap<String, i64>> {
        self.on(Utc::now().date_naive()).await
    }

    pub async fn on(&self, date: NaiveDate) -> Result<BTreeMap<String, i64>> {
        let raw = self.store.hgetall(&self.keys.daily_metrics(date)).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(field, value)| value.parse().ok().map(|v| (field, v)))
            .collect())
    }
}
