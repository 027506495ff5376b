// src/pipeline/maintenance.rs

//! Reconciliation and purges.
//!
//! Band buckets carry no TTL, so ids whose fingerprint record expired stay
//! in their buckets until [`cleanup_expired_bands`] runs.

use serde::Serialize;

use crate::error::Result;
use crate::pipeline::index::FingerprintIndex;
use crate::storage::{Command, KeyedStore};

/// What a bucket reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub buckets_scanned: usize,
    pub stale_removed: usize,
    pub buckets_deleted: usize,
}

/// Drop bucket members without a live fingerprint record. A bucket counts
/// as deleted once removing them leaves it empty.
pub async fn cleanup_expired_bands(
    store: &dyn KeyedStore,
    index: &FingerprintIndex,
) -> Result<CleanupReport> {
    let keys = index.keys();
    let buckets = store.scan_prefix(&keys.band_prefix()).await?;
    let mut report = CleanupReport {
        buckets_scanned: buckets.len(),
        ..CleanupReport::default()
    };

    for bucket in buckets {
        let members = store.smembers(&bucket).await?;
        if members.is_empty() {
            continue;
        }

        let live = store
            .exec(
                members
                    .iter()
                    .map(|id| Command::Exists(keys.fingerprint(id)))
                    .collect(),
            )
            .await?;

        let mut stale = Vec::new();
        for (id, reply) in members.iter().zip(live) {
            if !reply.into_bool()? {
                stale.push(id.clone());
            }
        }
        if stale.is_empty() {
            continue;
        }

        report.stale_removed += stale.len();
        // Only the stale ids; members added after the read stay.
        let mut batch: Vec<Command> = stale
            .into_iter()
            .map(|member| Command::SRem {
                key: bucket.clone(),
                member,
            })
            .collect();
        batch.push(Command::Exists(bucket.clone()));
        let replies = store.exec(batch).await?;
        let still_exists = match replies.into_iter().last() {
            Some(reply) => reply.into_bool()?,
            None => false,
        };
        if !still_exists {
            report.buckets_deleted += 1;
        }
    }

    log::info!(
        "Band cleanup: {} buckets scanned, {} stale ids removed, {} buckets deleted",
        report.buckets_scanned,
        report.stale_removed,
        report.buckets_deleted
    );
    Ok(report)
}

/// Fully remove every posting indexed within `[start_ms, end_ms]`.
pub async fn clear_by_date_range(
    store: &dyn KeyedStore,
    index: &FingerprintIndex,
    start_ms: i64,
    end_ms: i64,
) -> Result<usize> {
    let keys = index.keys();
    let records = store.scan_prefix(&keys.fingerprint_prefix()).await?;

    let mut removed = 0;
    for record in &records {
        let Some(id) = keys.id_from_fingerprint(record) else {
            continue;
        };
        let Some(data) = index.get_job_data(id).await? else {
            continue;
        };
        let indexed_at = data.fingerprint.indexed_at.timestamp_millis();
        if (start_ms..=end_ms).contains(&indexed_at) {
            index.remove_job(id).await?;
            removed += 1;
        }
    }

    log::info!(
        "Cleared {} of {} postings indexed between {} and {}",
        removed,
        records.len(),
        start_ms,
        end_ms
    );
    Ok(removed)
}

/// Delete every key under the namespace. Returns how many were deleted.
pub async fn clear_all(store: &dyn KeyedStore, index: &FingerprintIndex) -> Result<usize> {
    let all = store.scan_prefix(index.keys().prefix()).await?;
    if all.is_empty() {
        return Ok(0);
    }

    let replies = store
        .exec(all.into_iter().map(Command::Del).collect())
        .await?;
    let mut deleted = 0;
    for reply in replies {
        if reply.into_bool()? {
            deleted += 1;
        }
    }

    log::warn!("Cleared {} keys under {}", deleted, index.keys().prefix());
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::DateTime;

    use super::*;
    use crate::models::{Fingerprint, LocationInfo, encode_hash};
    use crate::services::fingerprint::band_keys;
    use crate::storage::{Keys, MemoryStore, Reply};

    fn setup() -> (Arc<MemoryStore>, FingerprintIndex) {
        let store = Arc::new(MemoryStore::new());
        let index = FingerprintIndex::new(
            store.clone(),
            Keys::new("t:"),
            Duration::from_secs(3600),
        );
        (store, index)
    }

    fn fingerprint(bits: u64, indexed_at_ms: i64) -> Fingerprint {
        Fingerprint {
            hash: encode_hash(bits),
            bits,
            bands: band_keys(bits, 4),
            indexed_at: DateTime::from_timestamp_millis(indexed_at_ms).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_stale_members() {
        let (store, index) = setup();
        let remote = LocationInfo::remote();
        // Same upper band, different elsewhere.
        index
            .index_job("live", &fingerprint(0xaaaa_0000_0000_0001, 0), &remote)
            .await
            .unwrap();
        index
            .index_job("gone", &fingerprint(0xaaaa_1111_2222_3333, 0), &remote)
            .await
            .unwrap();
        store.del("t:fp:gone").await.unwrap();

        let report = cleanup_expired_bands(&*store, &index).await.unwrap();
        assert_eq!(report.buckets_scanned, 7);
        assert_eq!(report.stale_removed, 4);
        assert_eq!(report.buckets_deleted, 3);

        assert_eq!(
            store.smembers("t:band:0:aaaa").await.unwrap(),
            vec!["live".to_string()]
        );
        assert!(store.scan_prefix("t:band:1:1111").await.unwrap().is_empty());

        let again = cleanup_expired_bands(&*store, &index).await.unwrap();
        assert_eq!(again.stale_removed, 0);
    }

    /// Indexes `late` into a bucket right after the liveness check runs.
    struct LateWriter {
        inner: Arc<MemoryStore>,
        bucket: &'static str,
        injected: AtomicBool,
    }

    #[async_trait]
    impl KeyedStore for LateWriter {
        async fn exec(&self, batch: Vec<Command>) -> Result<Vec<Reply>> {
            let liveness_check = batch.iter().all(|c| matches!(c, Command::Exists(_)));
            let replies = self.inner.exec(batch).await?;
            if liveness_check && !self.injected.swap(true, Ordering::SeqCst) {
                self.inner
                    .exec(vec![
                        Command::HSet {
                            key: "t:fp:late".into(),
                            fields: vec![("hash".into(), encode_hash(1))],
                        },
                        Command::SAdd {
                            key: self.bucket.into(),
                            member: "late".into(),
                        },
                    ])
                    .await?;
            }
            Ok(replies)
        }

        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.scan_prefix(prefix).await
        }
    }

    #[tokio::test]
    async fn test_cleanup_keeps_members_added_during_check() {
        let (store, index) = setup();
        index
            .index_job(
                "gone",
                &fingerprint(0xbbbb_0000_0000_0000, 0),
                &LocationInfo::remote(),
            )
            .await
            .unwrap();
        store.del("t:fp:gone").await.unwrap();
        // Leave a single bucket so the one liveness check belongs to it.
        for band in ["t:band:1:0000", "t:band:2:0000", "t:band:3:0000"] {
            store.del(band).await.unwrap();
        }

        let racing = LateWriter {
            inner: Arc::clone(&store),
            bucket: "t:band:0:bbbb",
            injected: AtomicBool::new(false),
        };
        let report = cleanup_expired_bands(&racing, &index).await.unwrap();

        assert_eq!(report.stale_removed, 1);
        assert_eq!(report.buckets_deleted, 0);
        assert_eq!(
            store.smembers("t:band:0:bbbb").await.unwrap(),
            vec!["late".to_string()]
        );
    }

    #[tokio::test]
    async fn test_clear_by_date_range_is_inclusive() {
        let (store, index) = setup();
        let remote = LocationInfo::remote();
        for (id, bits, at) in [("a", 1u64, 1_000), ("b", 2, 2_000), ("c", 3, 3_000)] {
            index
                .index_job(id, &fingerprint(bits << 48, at), &remote)
                .await
                .unwrap();
        }

        let removed = clear_by_date_range(&*store, &index, 1_000, 2_000)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(index.get_job_data("a").await.unwrap().is_none());
        assert!(index.get_job_data("b").await.unwrap().is_none());
        assert!(index.get_job_data("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_all_stays_in_namespace() {
        let (store, index) = setup();
        index
            .index_job("a", &fingerprint(7, 0), &LocationInfo::remote())
            .await
            .unwrap();
        store.set("other:key", "v", None).await.unwrap();

        // fp + loc + four buckets
        assert_eq!(clear_all(&*store, &index).await.unwrap(), 6);
        assert_eq!(store.scan_prefix("").await.unwrap(), vec!["other:key"]);
        assert_eq!(clear_all(&*store, &index).await.unwrap(), 0);
    }
}
