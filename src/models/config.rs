//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::FINGERPRINT_BITS;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Largest accepted TTL; keeps the seconds and store millisecond math in range.
const MAX_TTL_DAYS: u64 = 36_500;

/// Root configuration for a dedup index instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shingle weighting, banding and duplicate threshold
    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    /// Geographic veto thresholds and geocode cache lifetime
    #[serde(default)]
    pub location: LocationConfig,

    /// Index namespace and record lifetimes
    #[serde(default)]
    pub index: IndexConfig,

    /// Batch error budget and progress reporting
    #[serde(default)]
    pub batch: BatchConfig,

    /// HTTP geocoder settings
    #[serde(default)]
    pub geocoder: GeocoderConfig,

    /// Local persistence for the CLI
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let fp = &self.fingerprint;
        if fp.num_bands == 0 || FINGERPRINT_BITS % fp.num_bands != 0 {
            return Err(AppError::config(format!(
                "fingerprint.num_bands must evenly divide {FINGERPRINT_BITS} (got {})",
                fp.num_bands
            )));
        }
        if fp.duplicate_threshold as usize > FINGERPRINT_BITS {
            return Err(AppError::config(
                "fingerprint.duplicate_threshold must be <= 64",
            ));
        }
        if fp.weights.company + fp.weights.title + fp.weights.description == 0 {
            return Err(AppError::config(
                "fingerprint.weights must not all be zero",
            ));
        }

        let loc = &self.location;
        if !(loc.same_threshold_miles >= 0.0
            && loc.same_threshold_miles < loc.different_threshold_miles)
        {
            return Err(AppError::config(
                "location.same_threshold_miles must be >= 0 and below different_threshold_miles",
            ));
        }
        let ttls = [
            ("location.geo_ttl_days", loc.geo_ttl_days),
            ("index.job_ttl_days", self.index.job_ttl_days),
            ("index.metrics_ttl_days", self.index.metrics_ttl_days),
        ];
        for (name, days) in ttls {
            if days == 0 {
                return Err(AppError::config(format!("{name} must be > 0")));
            }
            if days > MAX_TTL_DAYS {
                return Err(AppError::config(format!(
                    "{name} must be <= {MAX_TTL_DAYS} (got {days})"
                )));
            }
        }
        if self.index.key_prefix.trim().is_empty() {
            return Err(AppError::config("index.key_prefix is empty"));
        }

        let rate = self.batch.error_rate_threshold;
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(AppError::config(
                "batch.error_rate_threshold must be in (0, 1]",
            ));
        }
        if self.geocoder.timeout_secs == 0 {
            return Err(AppError::config("geocoder.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Fingerprint generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Shingle repetition per field
    #[serde(default)]
    pub weights: Weights,

    /// Number of LSH bands the 64-bit vector is split into
    #[serde(default = "defaults::num_bands")]
    pub num_bands: usize,

    /// Largest Hamming distance still counted as a duplicate
    #[serde(default = "defaults::duplicate_threshold")]
    pub duplicate_threshold: u32,

    /// Which candidate a duplicate verdict links to
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            num_bands: defaults::num_bands(),
            duplicate_threshold: defaults::duplicate_threshold(),
            match_policy: MatchPolicy::default(),
        }
    }
}

/// How many times each field's shingles are repeated into the hash input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weights {
    #[serde(default = "defaults::company_weight")]
    pub company: usize,
    #[serde(default = "defaults::title_weight")]
    pub title: usize,
    #[serde(default = "defaults::description_weight")]
    pub description: usize,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            company: defaults::company_weight(),
            title: defaults::title_weight(),
            description: defaults::description_weight(),
        }
    }
}

/// Candidate selection once one is within threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Stop at the first candidate within threshold, in store order
    #[default]
    First,
    /// Score every candidate and link to the closest one
    Best,
}

/// Geographic veto settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// At or below this distance two locations are the same place
    #[serde(default = "defaults::same_threshold")]
    pub same_threshold_miles: f64,

    /// At or above this distance two locations are different places
    #[serde(default = "defaults::different_threshold")]
    pub different_threshold_miles: f64,

    #[serde(default = "defaults::geo_ttl_days")]
    pub geo_ttl_days: u64,
}

impl LocationConfig {
    pub fn geo_ttl(&self) -> Duration {
        Duration::from_secs(self.geo_ttl_days.saturating_mul(SECS_PER_DAY))
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            same_threshold_miles: defaults::same_threshold(),
            different_threshold_miles: defaults::different_threshold(),
            geo_ttl_days: defaults::geo_ttl_days(),
        }
    }
}

/// Index namespace and lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Prefix for every key this instance owns
    #[serde(default = "defaults::key_prefix")]
    pub key_prefix: String,

    #[serde(default = "defaults::job_ttl_days")]
    pub job_ttl_days: u64,

    #[serde(default = "defaults::metrics_ttl_days")]
    pub metrics_ttl_days: u64,
}

impl IndexConfig {
    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn metrics_ttl(&self) -> Duration {
        Duration::from_secs(self.metrics_ttl_days.saturating_mul(SECS_PER_DAY))
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            key_prefix: defaults::key_prefix(),
            job_ttl_days: defaults::job_ttl_days(),
            metrics_ttl_days: defaults::metrics_ttl_days(),
        }
    }
}

/// Batch processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Attempts required before the error rate is checked
    #[serde(default = "defaults::min_jobs_for_fail_fast")]
    pub min_jobs_for_fail_fast: usize,

    /// Abort once the running error rate exceeds this fraction
    #[serde(default = "defaults::error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// Log progress every N postings (0 disables)
    #[serde(default = "defaults::progress_every")]
    pub progress_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_jobs_for_fail_fast: defaults::min_jobs_for_fail_fast(),
            error_rate_threshold: defaults::error_rate_threshold(),
            progress_every: defaults::progress_every(),
        }
    }
}

/// HTTP geocoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Nominatim-compatible search endpoint; no geocoder when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Local snapshot store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: defaults::storage_path(),
        }
    }
}

mod defaults {
    // Fingerprint defaults
    pub fn num_bands() -> usize {
        4
    }
    pub fn duplicate_threshold() -> u32 {
        10
    }
    pub fn company_weight() -> usize {
        2
    }
    pub fn title_weight() -> usize {
        1
    }
    pub fn description_weight() -> usize {
        4
    }

    // Location defaults
    pub fn same_threshold() -> f64 {
        15.0
    }
    pub fn different_threshold() -> f64 {
        40.0
    }
    pub fn geo_ttl_days() -> u64 {
        90
    }

    // Index defaults
    pub fn key_prefix() -> String {
        "jobdedup:".into()
    }
    pub fn job_ttl_days() -> u64 {
        30
    }
    pub fn metrics_ttl_days() -> u64 {
        30
    }

    // Batch defaults
    pub fn min_jobs_for_fail_fast() -> usize {
        10
    }
    pub fn error_rate_threshold() -> f64 {
        0.5
    }
    pub fn progress_every() -> usize {
        25
    }

    // Geocoder defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; jobdedup/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }

    pub fn storage_path() -> String {
        "data/index.json".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.fingerprint.num_bands, 4);
        assert_eq!(config.fingerprint.duplicate_threshold, 10);
        assert_eq!(config.fingerprint.weights.description, 4);
        assert_eq!(config.index.job_ttl(), Duration::from_secs(30 * 86_400));
        assert_eq!(config.location.geo_ttl(), Duration::from_secs(90 * 86_400));
        assert_eq!(config.fingerprint.match_policy, MatchPolicy::First);
    }

    #[test]
    fn test_validate_rejects_bands_not_dividing_64() {
        let mut config = Config::default();
        config.fingerprint.num_bands = 3;
        assert!(config.validate().is_err());
        config.fingerprint.num_bands = 0;
        assert!(config.validate().is_err());
        config.fingerprint.num_bands = 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_location_thresholds() {
        let mut config = Config::default();
        config.location.same_threshold_miles = 50.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_ttls() {
        let mut config = Config::default();
        config.location.geo_ttl_days = u64::MAX;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = Config::default();
        config.index.job_ttl_days = MAX_TTL_DAYS + 1;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = Config::default();
        config.index.metrics_ttl_days = MAX_TTL_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_error_rate_out_of_range() {
        let mut config = Config::default();
        config.batch.error_rate_threshold = 0.0;
        assert!(config.validate().is_err());
        config.batch.error_rate_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [fingerprint]
            duplicate_threshold = 6
            match_policy = "best"

            [fingerprint.weights]
            company = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.fingerprint.duplicate_threshold, 6);
        assert_eq!(config.fingerprint.match_policy, MatchPolicy::Best);
        assert_eq!(config.fingerprint.weights.company, 3);
        assert_eq!(config.fingerprint.weights.title, 1);
        assert_eq!(config.fingerprint.num_bands, 4);
        assert_eq!(config.index.key_prefix, "jobdedup:");
    }
}
