// src/models/mod.rs

//! Domain models for the dedup index.
//!
//! Postings come in, verdicts go out; fingerprints and locations are the
//! only derived data the index persists.

mod config;
mod fingerprint;
mod location;
mod posting;

// Re-export all public types
pub use config::{
    BatchConfig, Config, FingerprintConfig, GeocoderConfig, IndexConfig, LocationConfig,
    MatchPolicy, StorageConfig, Weights,
};
pub use fingerprint::{
    FINGERPRINT_BITS, Fingerprint, encode_hash, hamming_distance, parse_bit_string, parse_hash,
};
pub use location::{
    Coordinates, GeocodeCacheEntry, LocationComparison, LocationInfo, LocationMatch, LocationType,
};
pub use posting::{BatchOutcome, BatchStats, ExistenceCheck, JobResult, PostingInput, Verdict};
