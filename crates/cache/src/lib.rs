//! Cache layer for Pathwise.
//!
//! - [`CacheKey`]: deterministic keys over normalized request parameters
//! - [`CacheClient`]: get/set with TTL, tag-indexed invalidation,
//!   popularity tracking and near-duplicate query lookup
//! - [`KvStore`]: the injectable key-value store underneath
//! - [`Clock`]: injectable time source, so expiry is testable

pub mod client;
pub mod clock;
pub mod key;
pub mod similarity;
pub mod store;

pub use client::{CacheClient, CacheEntry, CacheSettings, CacheStats, SimilarHit};
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::CacheKey;
pub use similarity::jaccard_similarity;
pub use store::{InMemoryStore, KvStore};
