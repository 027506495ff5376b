//! Location classification and geocode cache structures.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// How a raw location string was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Remote,
    Physical,
    Unknown,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Remote => "remote",
            LocationType::Physical => "physical",
            LocationType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote" => Ok(LocationType::Remote),
            "physical" => Ok(LocationType::Physical),
            "unknown" => Ok(LocationType::Unknown),
            other => Err(AppError::validation(format!(
                "unknown location type '{other}'"
            ))),
        }
    }
}

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Resolved location of a posting.
///
/// Remote and unknown locations never carry coordinates. Physical locations
/// carry both or neither (neither means resolution failed).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(rename = "type")]
    pub kind: LocationType,
}

impl LocationInfo {
    pub fn remote() -> Self {
        Self {
            lat: None,
            lng: None,
            kind: LocationType::Remote,
        }
    }

    pub fn unknown() -> Self {
        Self {
            lat: None,
            lng: None,
            kind: LocationType::Unknown,
        }
    }

    /// A physical location whose coordinates could not be resolved.
    pub fn unresolved() -> Self {
        Self {
            lat: None,
            lng: None,
            kind: LocationType::Physical,
        }
    }

    pub fn physical(coords: Coordinates) -> Self {
        Self {
            lat: Some(coords.lat),
            lng: Some(coords.lng),
            kind: LocationType::Physical,
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }
}

/// Cached geocoder answer for a normalized location string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeCacheEntry {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(rename = "type")]
    pub kind: LocationType,
    pub resolved_at: DateTime<Utc>,
}

impl GeocodeCacheEntry {
    pub fn new(info: LocationInfo) -> Self {
        Self {
            lat: info.lat,
            lng: info.lng,
            kind: info.kind,
            resolved_at: Utc::now(),
        }
    }

    pub fn location(&self) -> LocationInfo {
        LocationInfo {
            lat: self.lat,
            lng: self.lng,
            kind: self.kind,
        }
    }
}

/// Outcome of comparing two posting locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LocationMatch {
    Same,
    Different,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationComparison {
    pub result: LocationMatch,
    /// Great-circle distance in miles, when both sides had coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl LocationComparison {
    pub fn new(result: LocationMatch, reason: &'static str) -> Self {
        Self {
            result,
            distance: None,
            reason: Some(reason),
        }
    }

    pub fn measured(result: LocationMatch, distance: f64) -> Self {
        Self {
            result,
            distance: Some(distance),
            reason: None,
        }
    }

    pub fn is_different(&self) -> bool {
        self.result == LocationMatch::Different
    }
}
