//! Cache entries and the per-entry state machine.

use std::any::Any;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use tokio::sync::watch;

use super::options::CacheOptions;

/// Type-erased payload. Subscribers downcast at the edge, the same way the
/// runtime never needs to know what a screen actually caches.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Type-erased async producer retained per entry so `refetch` works without
/// the caller resupplying it.
pub(crate) type ErasedFetcher =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ErasedValue>> + Send + Sync>;

/// Lifecycle state of one cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Created, nothing fetched yet.
    Idle,

    /// A fetch is in flight, possibly mid-backoff between attempts.
    Fetching,

    /// Last fetch succeeded and the staleness window has not elapsed.
    Fresh,

    /// Data past its staleness window, or explicitly invalidated.
    Stale,

    /// Consecutive failures reached the retry bound. Stays parked until an
    /// explicit refetch, invalidate or new subscription.
    Error,
}

/// Type-erased snapshot broadcast to subscribers on every state change.
#[derive(Clone)]
pub(crate) struct EntrySnapshot {
    pub value: Option<ErasedValue>,
    pub state: EntryState,
    pub error: Option<String>,
    pub fetched_at: Option<u64>,
    pub retry_count: u32,
}

/// Typed read model handed to UI surfaces.
///
/// Carries the last good value even when `state` is [`EntryState::Error`] so
/// screens can render stale-but-present data next to a retry affordance. A
/// payload cached under a different type reads as an absent value.
#[derive(Debug, Clone)]
pub struct ResourceView<T> {
    pub value: Option<Arc<T>>,
    pub state: EntryState,
    pub error: Option<String>,
    pub fetched_at: Option<u64>,
    pub retry_count: u32,
}

impl<T: Send + Sync + 'static> ResourceView<T> {
    pub(crate) fn from_snapshot(snapshot: &EntrySnapshot) -> Self {
        Self {
            value: snapshot
                .value
                .clone()
                .and_then(|value| value.downcast::<T>().ok()),
            state: snapshot.state,
            error: snapshot.error.clone(),
            fetched_at: snapshot.fetched_at,
            retry_count: snapshot.retry_count,
        }
    }
}

impl<T> ResourceView<T> {
    pub fn is_fetching(&self) -> bool {
        self.state == EntryState::Fetching
    }

    pub fn is_fresh(&self) -> bool {
        self.state == EntryState::Fresh
    }

    pub fn is_error(&self) -> bool {
        self.state == EntryState::Error
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

/// One cached resource. Owned exclusively by the manager; every mutation
/// happens under the manager's lock and is published to subscribers through
/// the entry's watch channel.
pub(crate) struct CacheEntry {
    pub value: Option<ErasedValue>,
    pub fetched_at: Option<u64>,
    pub state: EntryState,
    pub error: Option<String>,
    pub retry_count: u32,
    pub subscriber_count: usize,
    /// Unobserved since this instant: stamped at creation and whenever the
    /// last subscriber leaves, cleared while anyone is subscribed. Anchors
    /// the gc window.
    pub idle_since: Option<u64>,
    pub fetcher: Option<ErasedFetcher>,
    pub options: CacheOptions,
    pub tx: watch::Sender<EntrySnapshot>,
}

impl CacheEntry {
    pub fn new(options: CacheOptions, fetcher: Option<ErasedFetcher>, now_ms: u64) -> Self {
        let (tx, _) = watch::channel(EntrySnapshot {
            value: None,
            state: EntryState::Idle,
            error: None,
            fetched_at: None,
            retry_count: 0,
        });

        Self {
            value: None,
            fetched_at: None,
            state: EntryState::Idle,
            error: None,
            retry_count: 0,
            subscriber_count: 0,
            idle_since: Some(now_ms),
            fetcher,
            options,
            tx,
        }
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            value: self.value.clone(),
            state: self.state,
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            retry_count: self.retry_count,
        }
    }

    /// Publish the current state to all subscribers. `send_replace` keeps the
    /// stored snapshot current even while nobody is listening, so a later
    /// subscriber starts from the latest state rather than the initial one.
    pub fn publish(&self) {
        self.tx.send_replace(self.snapshot());
    }

    /// Lazy staleness: fresh data past its window becomes stale.
    pub fn refresh_staleness(&mut self, now_ms: u64) {
        if self.state == EntryState::Fresh
            && self.fetched_at.is_some_and(|at| {
                now_ms.saturating_sub(at) >= self.options.stale_time.as_millis() as u64
            })
        {
            self.state = EntryState::Stale;
            self.publish();
        }
    }

    /// Whether a (re)subscribing consumer should start a fetch. A new
    /// subscription counts as an explicit trigger for errored entries.
    pub fn wants_fetch(&self) -> bool {
        matches!(
            self.state,
            EntryState::Idle | EntryState::Stale | EntryState::Error
        )
    }

    pub fn begin_fetch(&mut self) {
        self.state = EntryState::Fetching;
        self.publish();
    }

    pub fn complete_success(&mut self, value: ErasedValue, now_ms: u64) {
        self.value = Some(value);
        self.fetched_at = Some(now_ms);
        self.state = EntryState::Fresh;
        self.error = None;
        self.retry_count = 0;
        self.publish();
    }

    /// Record one failed attempt. Returns true when another attempt should
    /// follow after backoff, false once the entry parks in error.
    pub fn record_failure(&mut self, detail: String) -> bool {
        self.retry_count += 1;
        self.error = Some(detail);

        if self.retry_count >= self.options.max_retries {
            self.state = EntryState::Error;
            self.publish();
            false
        } else {
            // Still fetching; subscribers observe the bumped retry count.
            self.publish();
            true
        }
    }

    /// GC eligibility: no subscribers, not mid-fetch, past the gc window.
    pub fn gc_eligible(&self, now_ms: u64) -> bool {
        if self.subscriber_count > 0 || self.state == EntryState::Fetching {
            return false;
        }

        match self.idle_since {
            Some(at) => now_ms.saturating_sub(at) >= self.options.gc_time.as_millis() as u64,
            None => false,
        }
    }
}
