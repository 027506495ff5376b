// src/services/location.rs

//! Location classification, geocoding with a long-lived cache, and the
//! distance comparison behind the geographic veto.
//!
//! Location is a soft signal: nothing in this module returns an error.
//! Geocoder and cache failures are logged, counted, and degrade to a
//! physical location without coordinates.

use std::sync::Arc;
use std::time::Duration;

use crate::models::{
    Coordinates, GeocodeCacheEntry, LocationComparison, LocationConfig, LocationInfo,
    LocationMatch, LocationType,
};
use crate::pipeline::metrics::SessionMetrics;
use crate::services::geocoder::Geocoder;
use crate::storage::{KeyedStore, Keys};

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Substrings that mark a posting as not tied to a place.
const REMOTE_VOCABULARY: &[&str] = &[
    "remote",
    "work from home",
    "wfh",
    "telecommute",
    "virtual",
    "anywhere",
    "nationwide",
    "home based",
];

/// Classification of a raw location string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationClass {
    pub kind: LocationType,
    pub needs_geocoding: bool,
}

/// Classify a raw location without any I/O.
pub fn parse_location_type(raw: &str) -> LocationClass {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return LocationClass {
            kind: LocationType::Unknown,
            needs_geocoding: false,
        };
    }
    if REMOTE_VOCABULARY.iter().any(|term| lowered.contains(term)) {
        return LocationClass {
            kind: LocationType::Remote,
            needs_geocoding: false,
        };
    }
    LocationClass {
        kind: LocationType::Physical,
        needs_geocoding: true,
    }
}

/// Geocode cache key: lowercased, trimmed, inner whitespace collapsed.
pub fn normalize_location_key(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Great-circle distance in miles.
pub fn haversine_miles(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Decide whether two locations are the same place, different places, or
/// not comparable. Distances strictly between the two thresholds are a gray
/// zone and never veto.
pub fn compare_locations(
    a: &LocationInfo,
    b: &LocationInfo,
    same_threshold: f64,
    different_threshold: f64,
) -> LocationComparison {
    use LocationType::{Remote, Unknown};

    match (a.kind, b.kind) {
        (Remote, Remote) => return LocationComparison::new(LocationMatch::Same, "both remote"),
        (Remote, _) | (_, Remote) => {
            return LocationComparison::new(LocationMatch::Unknown, "remote vs physical");
        }
        (Unknown, _) | (_, Unknown) => {
            return LocationComparison::new(LocationMatch::Unknown, "location unknown");
        }
        _ => {}
    }

    let (Some(ca), Some(cb)) = (a.coordinates(), b.coordinates()) else {
        return LocationComparison::new(LocationMatch::Unknown, "missing coordinates");
    };

    let distance = haversine_miles(ca, cb);
    if distance <= same_threshold {
        LocationComparison::measured(LocationMatch::Same, distance)
    } else if distance >= different_threshold {
        LocationComparison::measured(LocationMatch::Different, distance)
    } else {
        LocationComparison {
            reason: Some("gray zone"),
            ..LocationComparison::measured(LocationMatch::Unknown, distance)
        }
    }
}

/// Resolves raw locations through the geocode cache and geocoder.
pub struct LocationResolver {
    store: Arc<dyn KeyedStore>,
    geocoder: Option<Arc<dyn Geocoder>>,
    keys: Keys,
    geo_ttl: Duration,
    metrics: Arc<SessionMetrics>,
}

impl LocationResolver {
    pub fn new(
        store: Arc<dyn KeyedStore>,
        geocoder: Option<Arc<dyn Geocoder>>,
        keys: Keys,
        config: &LocationConfig,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            store,
            geocoder,
            keys,
            geo_ttl: config.geo_ttl(),
            metrics,
        }
    }

    /// Resolve a raw location. Never fails.
    pub async fn resolve(&self, raw: &str) -> LocationInfo {
        let class = parse_location_type(raw);
        if !class.needs_geocoding {
            return match class.kind {
                LocationType::Remote => LocationInfo::remote(),
                _ => LocationInfo::unknown(),
            };
        }

        let cache_key = self.keys.geo(&normalize_location_key(raw));

        if let Some(cached) = self.cached(&cache_key).await {
            self.metrics.record_geo_cache_hit();
            return cached;
        }

        let Some(geocoder) = &self.geocoder else {
            log::debug!("No geocoder configured; '{}' left unresolved", raw.trim());
            self.metrics.record_error();
            return LocationInfo::unresolved();
        };

        match geocoder.geocode(raw.trim()).await {
            Ok(found) => {
                let info = found
                    .map(LocationInfo::physical)
                    .unwrap_or_else(LocationInfo::unresolved);
                self.store_cache(&cache_key, info).await;
                self.metrics.record_geo_cache_miss();
                info
            }
            Err(e) => {
                log::warn!("Geocoding '{}' failed: {}", raw.trim(), e);
                self.metrics.record_error();
                LocationInfo::unresolved()
            }
        }
    }

    /// Cached location, refreshing the entry's TTL on a hit.
    async fn cached(&self, cache_key: &str) -> Option<LocationInfo> {
        let raw = match self.store.get(cache_key).await {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("Geocode cache read failed for {}: {}", cache_key, e);
                self.metrics.record_error();
                return None;
            }
        };

        let entry: GeocodeCacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Discarding malformed geocode cache entry {}: {}", cache_key, e);
                return None;
            }
        };

        if let Err(e) = self.store.expire(cache_key, self.geo_ttl).await {
            log::warn!("Geocode cache refresh failed for {}: {}", cache_key, e);
        }
        Some(entry.location())
    }

    async fn store_cache(&self, cache_key: &str, info: LocationInfo) {
        let entry = GeocodeCacheEntry::new(info);
        let result = match serde_json::to_string(&entry) {
            Ok(json) => self.store.set(cache_key, &json, Some(self.geo_ttl)).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            log::warn!("Geocode cache write failed for {}: {}", cache_key, e);
        }
    }
}
