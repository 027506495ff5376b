//! Per-posting duplicate decision.
//!
//! Resolve location, fingerprint, pull band candidates, then walk them in
//! store order. A candidate in a different place is skipped outright;
//! otherwise the Hamming distance decides.
//!
//! Store failures propagate unchanged so the batch breaker can count them.

use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    FingerprintConfig, LocationConfig, LocationInfo, MatchPolicy, PostingInput, Verdict,
    hamming_distance,
};
use crate::pipeline::index::FingerprintIndex;
use crate::pipeline::metrics::SessionMetrics;
use crate::services::fingerprint::FingerprintGenerator;
use crate::services::location::{LocationResolver, compare_locations};

/// Per-call switches for [`DuplicateResolver::process_job`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// Decide only; never write the posting into the index
    pub skip_index: bool,
}

/// Closest admissible candidate seen so far.
struct Match {
    id: String,
    distance: u32,
}

pub struct DuplicateResolver {
    index: FingerprintIndex,
    locations: Arc<LocationResolver>,
    generator: FingerprintGenerator,
    duplicate_threshold: u32,
    match_policy: MatchPolicy,
    same_threshold: f64,
    different_threshold: f64,
    metrics: Arc<SessionMetrics>,
}

impl DuplicateResolver {
    pub fn new(
        index: FingerprintIndex,
        locations: Arc<LocationResolver>,
        fingerprint: &FingerprintConfig,
        location: &LocationConfig,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            index,
            locations,
            generator: FingerprintGenerator::new(fingerprint.weights, fingerprint.num_bands),
            duplicate_threshold: fingerprint.duplicate_threshold,
            match_policy: fingerprint.match_policy,
            same_threshold: location.same_threshold_miles,
            different_threshold: location.different_threshold_miles,
            metrics,
        }
    }

    pub fn locations(&self) -> &LocationResolver {
        &self.locations
    }

    pub fn generator(&self) -> &FingerprintGenerator {
        &self.generator
    }

    /// Decide whether `posting` duplicates an indexed posting, indexing it
    /// when it does not (unless `skip_index` is set).
    pub async fn process_job(
        &self,
        posting: &PostingInput,
        options: ProcessOptions,
    ) -> Result<Verdict> {
        posting.validate()?;

        let location = self.locations.resolve(&posting.raw_location).await;
        let fingerprint = self.generator.generate(posting);
        let candidates = self
            .index
            .find_candidates(&fingerprint.bands, &posting.id)
            .await?;

        let found = self
            .closest_candidate(&posting.id, fingerprint.bits, &location, candidates)
            .await?;
        self.metrics.record_processed();

        if let Some(Match { id, distance }) = found {
            log::debug!(
                "{} duplicates {} (distance {})",
                posting.id,
                id,
                distance
            );
            self.metrics.record_duplicate();
            return Ok(Verdict::duplicate(id, distance, fingerprint.hash, location));
        }

        let indexed = !options.skip_index;
        if indexed {
            self.index
                .index_job(&posting.id, &fingerprint, &location)
                .await?;
            self.metrics.record_indexed();
        }
        Ok(Verdict::unique(fingerprint.hash, indexed, location))
    }

    async fn closest_candidate(
        &self,
        posting_id: &str,
        bits: u64,
        location: &LocationInfo,
        candidates: Vec<String>,
    ) -> Result<Option<Match>> {
        let mut best: Option<Match> = None;

        for candidate in candidates {
            let Some(stored) = self.index.get_job_data(&candidate).await? else {
                continue;
            };

            let comparison = compare_locations(
                location,
                &stored.location,
                self.same_threshold,
                self.different_threshold,
            );
            if comparison.is_different() {
                log::debug!(
                    "Location veto: {} vs {} ({:.1} mi)",
                    posting_id,
                    candidate,
                    comparison.distance.unwrap_or_default()
                );
                self.metrics.record_location_veto();
                continue;
            }

            let distance = hamming_distance(bits, stored.fingerprint.bits);
            if distance > self.duplicate_threshold {
                continue;
            }
            if best.as_ref().is_some_and(|b| b.distance <= distance) {
                continue;
            }

            let exact = distance == 0;
            best = Some(Match {
                id: candidate,
                distance,
            });
            if self.match_policy == MatchPolicy::First || exact {
                break;
            }
        }
        Ok(best)
    }
}
