//! Bounded caches and asynchronous usage write-back for shortlink
//!
//! Provides an in-memory LRU cache in front of the durable alias store,
//! a disk-backed artifact cache with snapshot/restore of its index, and a
//! single-consumer pipeline that applies usage increments off the read path.

mod alias;
mod artifact;
mod error;
mod generator;
mod metrics;
mod resolution;
mod resolver;
mod store;
mod types;
mod writeback;

pub use alias::generate_alias;
pub use artifact::ArtifactCache;
pub use error::{ArtifactCacheError, ResolutionCacheError, Result, StoreError};
pub use generator::ArtifactGenerator;
pub use metrics::{CacheMetrics, MetricsSink, MetricsSnapshot};
pub use resolution::ResolutionCache;
pub use resolver::{CreateRequest, Resolver, ResolverError};
pub use store::{DurableStore, MemoryStore};
pub use types::{ArtifactEntry, ArtifactStats, CreateOutcome, EvictionPolicy, ResolvedTarget};
pub use writeback::{UsageWriteBack, WriteBackStats};
