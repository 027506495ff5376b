//! Index operations and their orchestration.
//!
//! - `index`: band-keyed fingerprint storage
//! - `resolver`: per-posting duplicate decision
//! - `batch`: warm-up + sequential processing with fail-fast
//! - `maintenance`: bucket reconciliation and purges
//! - `deduplicator`: the configured entry point over all of the above

pub mod batch;
pub mod circuit_breaker;
pub mod deduplicator;
pub mod index;
pub mod maintenance;
pub mod metrics;
pub mod resolver;

pub use batch::{BatchOptions, Phase, Progress, process_job_batch};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerResult};
pub use deduplicator::{Deduplicator, DeduplicatorBuilder, IndexStats};
pub use index::{FingerprintIndex, JobData};
pub use maintenance::CleanupReport;
pub use metrics::{DailyMetrics, SessionMetrics, SessionSnapshot};
pub use resolver::{DuplicateResolver, ProcessOptions};
