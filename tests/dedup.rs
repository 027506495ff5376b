//! End-to-end behaviour of the dedup index against in-process stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use jobdedup::models::{Coordinates, LocationType};
use jobdedup::pipeline::ProcessOptions;
use jobdedup::services::{Geocoder, GeocoderFn};
use jobdedup::services::fingerprint::{FingerprintGenerator, band_keys};
use jobdedup::storage::{Command, Reply};
use jobdedup::{
    AppError, BatchOptions, Config, Deduplicator, KeyedStore, LocalStore, MemoryStore,
    PostingInput, Result,
};
use tempfile::TempDir;

const CHICAGO: Coordinates = Coordinates {
    lat: 41.8781,
    lng: -87.6298,
};
const NAPERVILLE: Coordinates = Coordinates {
    lat: 41.7508,
    lng: -88.1535,
};
const MILWAUKEE: Coordinates = Coordinates {
    lat: 43.0389,
    lng: -87.9065,
};

/// Fails the first `n` batches, then delegates to a [`MemoryStore`].
struct FailingStore {
    inner: MemoryStore,
    failures_left: AtomicUsize,
}

impl FailingStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl KeyedStore for FailingStore {
    async fn exec(&self, batch: Vec<Command>) -> Result<Vec<Reply>> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::store("connection refused"));
        }
        self.inner.exec(batch).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.scan_prefix(prefix).await
    }
}

fn geocoder() -> Arc<dyn Geocoder> {
    Arc::new(GeocoderFn::new(|location: &str| {
        let lowered = location.to_lowercase();
        Ok(if lowered.contains("chicago") {
            Some(CHICAGO)
        } else if lowered.contains("naperville") {
            Some(NAPERVILLE)
        } else if lowered.contains("milwaukee") {
            Some(MILWAUKEE)
        } else {
            None
        })
    }))
}

fn dedup_on(store: Arc<dyn KeyedStore>) -> Deduplicator {
    Deduplicator::builder()
        .store(store)
        .geocoder(geocoder())
        .build()
        .unwrap()
}

fn barista(id: &str, location: &str) -> PostingInput {
    PostingInput::new(id)
        .company("Bluebird Coffee")
        .title("Barista")
        .description(
            "Pull espresso shots, steam milk, and keep the cafe floor clean during the \
             morning rush. Weekend availability required.",
        )
        .location(location)
}

#[tokio::test]
async fn test_resubmitting_identical_posting_is_exact_duplicate() {
    let dedup = dedup_on(Arc::new(MemoryStore::new()));
    let opts = ProcessOptions::default();

    let first = dedup
        .process_job(&barista("p1", "Chicago, IL"), opts)
        .await
        .unwrap();
    assert!(!first.is_duplicate);
    assert_eq!(first.indexed, Some(true));

    let again = dedup
        .process_job(&barista("p2", "Chicago, IL"), opts)
        .await
        .unwrap();
    assert!(again.is_duplicate);
    assert_eq!(again.duplicate_of.as_deref(), Some("p1"));
    assert_eq!(again.hamming_distance, Some(0));
    assert_eq!(again.fingerprint, first.fingerprint);
}

#[tokio::test]
async fn test_cosmetic_differences_are_duplicates() {
    let dedup = dedup_on(Arc::new(MemoryStore::new()));
    let opts = ProcessOptions::default();
    let description = "Prep ingredients and run the grill station.";

    let plain = PostingInput::new("a")
        .company("Acme")
        .title("Cook")
        .description(description)
        .location("Chicago, IL");
    let decorated = PostingInput::new("b")
        .company("Acme Inc.")
        .title("Cook!!")
        .description(description)
        .location("Chicago, IL");

    dedup.process_job(&plain, opts).await.unwrap();
    let verdict = dedup.process_job(&decorated, opts).await.unwrap();

    assert!(verdict.is_duplicate);
    assert_eq!(verdict.duplicate_of.as_deref(), Some("a"));
}

#[tokio::test]
async fn test_distant_locations_veto_identical_text() {
    let dedup = dedup_on(Arc::new(MemoryStore::new()));
    let opts = ProcessOptions::default();

    dedup
        .process_job(&barista("chi", "Chicago, IL"), opts)
        .await
        .unwrap();
    let verdict = dedup
        .process_job(&barista("mke", "Milwaukee, WI"), opts)
        .await
        .unwrap();

    assert!(!verdict.is_duplicate);
    assert_eq!(verdict.indexed, Some(true));
    assert_eq!(dedup.session_metrics().location_vetoes, 1);
}

#[tokio::test]
async fn test_remote_postings_match_without_coordinates() {
    let dedup = dedup_on(Arc::new(MemoryStore::new()));
    let opts = ProcessOptions::default();

    let a = barista("a", "Remote (US)")
        .description("Answer customer emails and chats about coffee subscriptions.");
    let b = barista("b", "Work from home")
        .description("Answer customer emails -- and chats about coffee subscriptions!!");

    dedup.process_job(&a, opts).await.unwrap();
    let verdict = dedup.process_job(&b, opts).await.unwrap();

    assert!(verdict.is_duplicate);
    let location = verdict.location.unwrap();
    assert_eq!(location.kind, LocationType::Remote);
    assert!(location.coordinates().is_none());
}

#[tokio::test]
async fn test_gray_zone_falls_back_to_text() {
    let dedup = dedup_on(Arc::new(MemoryStore::new()));
    let opts = ProcessOptions::default();

    dedup
        .process_job(&barista("chi", "Chicago, IL"), opts)
        .await
        .unwrap();
    let verdict = dedup
        .process_job(&barista("nap", "Naperville, IL"), opts)
        .await
        .unwrap();

    assert!(verdict.is_duplicate);
    assert_eq!(dedup.session_metrics().location_vetoes, 0);
}

#[tokio::test]
async fn test_batch_aborts_when_store_keeps_failing() {
    let dedup = dedup_on(Arc::new(FailingStore::new(7)));
    let postings: Vec<_> = (1..=12)
        .map(|i| barista(&format!("job-{i}"), "Remote").title(format!("Barista {i}")))
        .collect();

    let err = dedup
        .process_job_batch(&postings, &BatchOptions::default())
        .await
        .unwrap_err();

    match err {
        AppError::FailFast {
            error_rate,
            errors,
            attempted,
            partial,
        } => {
            assert_eq!(attempted, 10);
            assert_eq!(errors, 7);
            assert!((error_rate - 0.7).abs() < 1e-9);
            assert_eq!(partial.len(), 10);
            assert!(partial[..7].iter().all(|r| r.is_error()));
            assert!(partial[7..].iter().all(|r| !r.is_error()));
        }
        other => panic!("expected fail-fast, got {other:?}"),
    }
}

#[test]
fn test_band_keys_cover_the_vector() {
    let generator = FingerprintGenerator::new(Config::default().fingerprint.weights, 4);
    let fp = generator.generate(&barista("x", "Remote"));

    assert_eq!(fp.bands.len(), 4);
    let mut rebuilt = String::new();
    for (i, band) in fp.bands.iter().enumerate() {
        let (index, hex) = band.split_once(':').unwrap();
        assert_eq!(index, i.to_string());
        assert_eq!(hex.len(), 4);
        rebuilt.push_str(hex);
    }
    assert_eq!(rebuilt, fp.hash);
    assert_eq!(band_keys(fp.bits, 4), fp.bands);
}

#[tokio::test]
async fn test_cleanup_reconciles_expired_postings() {
    let store = Arc::new(MemoryStore::new());
    let dedup = dedup_on(store.clone());

    dedup
        .process_job(&barista("gone", "Remote"), ProcessOptions::default())
        .await
        .unwrap();
    // Simulate TTL expiry of the fingerprint record only.
    assert!(store.del("jobdedup:fp:gone").await.unwrap());
    assert_eq!(store.scan_prefix("jobdedup:band:").await.unwrap().len(), 4);

    let report = dedup.cleanup_expired_bands().await.unwrap();
    assert_eq!(report.stale_removed, 4);
    assert_eq!(report.buckets_deleted, 4);
    assert!(store.scan_prefix("jobdedup:band:").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_existence_check_splits_ids() {
    let dedup = dedup_on(Arc::new(MemoryStore::new()));
    dedup
        .process_job(&barista("a", "Remote"), ProcessOptions::default())
        .await
        .unwrap();

    let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    let check = dedup.check_existing_jobs(&ids).await.unwrap();
    assert_eq!(check.existing, vec!["a"]);
    assert_eq!(check.new, vec!["b", "c"]);
}

#[tokio::test]
async fn test_removed_posting_no_longer_matches() {
    let dedup = dedup_on(Arc::new(MemoryStore::new()));
    let opts = ProcessOptions::default();

    dedup
        .process_job(&barista("a", "Chicago, IL"), opts)
        .await
        .unwrap();
    assert!(dedup.remove_job("a").await.unwrap());
    assert!(dedup.get_job_data("a").await.unwrap().is_none());

    let verdict = dedup
        .process_job(&barista("b", "Chicago, IL"), opts)
        .await
        .unwrap();
    assert!(!verdict.is_duplicate);
}

#[tokio::test]
async fn test_local_store_index_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.json");

    {
        let dedup = dedup_on(Arc::new(LocalStore::open(&path).await.unwrap()));
        let outcome = dedup
            .process_job_batch(
                &[
                    barista("a", "Chicago, IL"),
                    PostingInput::new("b")
                        .company("Northside Movers")
                        .title("Delivery Driver")
                        .description("Load the box truck and run residential routes.")
                        .location("Remote"),
                ],
                &BatchOptions::default().source("test"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.stats.indexed, 2);
    }

    let dedup = dedup_on(Arc::new(LocalStore::open(&path).await.unwrap()));
    let verdict = dedup
        .process_job(&barista("c", "Chicago"), ProcessOptions::default())
        .await
        .unwrap();
    assert!(verdict.is_duplicate);
    assert_eq!(verdict.duplicate_of.as_deref(), Some("a"));

    let stats = dedup.get_stats().await.unwrap();
    assert_eq!(stats.indexed_jobs, 2);
    assert_eq!(stats.today["source:test"], 2);
}

#[tokio::test]
async fn test_local_store_writes_snapshot_once_per_batch() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.json");
    let store = Arc::new(LocalStore::open(&path).await.unwrap());
    let dedup = dedup_on(store.clone());

    let written_mid_batch = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&written_mid_batch);
    let watched = path.clone();
    let options = BatchOptions::default().on_progress(move |_| {
        if watched.exists() {
            seen.store(true, Ordering::SeqCst);
        }
    });
    let postings: Vec<_> = (0..60)
        .map(|i| {
            PostingInput::new(format!("job-{i}"))
                .company(format!("Shop {i}"))
                .title(format!("Clerk {i}"))
                .description(format!("Stock shelves in aisle {i} and run register {i}."))
                .location("Chicago, IL")
        })
        .collect();

    dedup.process_job_batch(&postings, &options).await.unwrap();

    assert!(!written_mid_batch.load(Ordering::SeqCst));
    assert!(path.exists());
    assert!(!store.is_dirty());
}
