//! Keyed resource cache with staleness windows, request deduplication,
//! bounded retry and garbage collection.

pub mod entry;
pub mod manager;
pub mod options;
pub mod retry;
pub mod subscription;

pub use entry::{EntryState, ResourceView};
pub use manager::{ResourceCache, ResourceCacheBuilder};
pub use options::CacheOptions;
pub use retry::Backoff;
pub use subscription::Subscription;
