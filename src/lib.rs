// src/lib.rs

//! Near-duplicate job posting index.
//!
//! SimHash fingerprints, band-keyed candidate lookup over a TTL'd keyed
//! store, and a geographic veto that keeps identical listings in different
//! cities apart.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;

pub use error::{AppError, Result};
pub use models::{Config, LocationInfo, PostingInput, Verdict};
pub use pipeline::{BatchOptions, Deduplicator, ProcessOptions};
pub use storage::{KeyedStore, LocalStore, MemoryStore};
