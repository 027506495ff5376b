//! Service layer for the dedup index.
//!
//! - Text normalization (`normalizer`)
//! - SimHash fingerprints and band keys (`FingerprintGenerator`)
//! - Location classification, geocode cache, distance veto (`LocationResolver`)
//! - Geocoder backends (`Geocoder`)

pub mod fingerprint;
pub mod geocoder;
pub mod location;
pub mod normalizer;

pub use fingerprint::FingerprintGenerator;
#[cfg(feature = "geocode")]
pub use geocoder::HttpGeocoder;
pub use geocoder::{Geocoder, GeocoderFn};
pub use location::{LocationResolver, compare_locations};
