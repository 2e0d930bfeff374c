//! Client data & navigation intent core shared by the product's UI surfaces.
//!
//! Two independent components with the same lifecycle-and-invalidation
//! philosophy:
//!
//! - [`ResourceCache`]: keyed store of remote-fetched values with staleness
//!   windows, request deduplication, bounded retry and garbage collection.
//!   Screens register interest in a key and supply an async fetcher; the
//!   cache hands back a live [`Subscription`] that updates on every state
//!   change.
//! - [`IntentResolver`]: maps navigation intents raised by any action
//!   handler to a single pending [`NavigationTarget`] for indicator UI,
//!   arbitrated by priority and expiry.
//!
//! The core renders nothing and performs no I/O of its own. All time is read
//! through an injectable [`Clock`] so staleness, garbage collection and
//! expiry are testable against a manual clock.

pub mod cache;
pub mod clock;
pub mod intent;

pub use cache::{
    Backoff, CacheOptions, EntryState, ResourceCache, ResourceCacheBuilder, ResourceView,
    Subscription,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use intent::{IntentResolver, NavAction, NavigationIntent, NavigationTarget};
