//! The resource cache manager.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use futures::future::BoxFuture;
use log::{debug, warn};

use crate::clock::{Clock, SystemClock};

use super::entry::{CacheEntry, EntryState, ErasedFetcher, ErasedValue, ResourceView};
use super::options::{CacheOptions, key_namespace};
use super::subscription::Subscription;

/// Shared state behind every cache handle and subscription.
pub(crate) struct CacheInner {
    pub entries: Mutex<HashMap<String, CacheEntry>>,
    pub clock: Arc<dyn Clock>,
    default_options: CacheOptions,
    namespace_defaults: HashMap<String, CacheOptions>,
}

/// Keyed store of remote-fetched values with staleness windows, request
/// deduplication, bounded retry and garbage collection.
///
/// Constructed once per process and handed by clone to every surface. The
/// cache performs no I/O of its own: screens supply an async fetcher per
/// resource and observe snapshots through [`Subscription`] handles. Fetches
/// run on the ambient tokio runtime, so `subscribe` and `refetch` must be
/// called from within one.
///
/// All subscribers of a key must agree on its payload type; a value cached
/// under a different type reads as absent.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

/// Builder for [`ResourceCache`].
pub struct ResourceCacheBuilder {
    clock: Arc<dyn Clock>,
    default_options: CacheOptions,
    namespace_defaults: HashMap<String, CacheOptions>,
}

impl ResourceCacheBuilder {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            default_options: CacheOptions::default(),
            namespace_defaults: HashMap::new(),
        }
    }

    /// Replace the wall clock, used by tests to drive staleness and gc.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Tuning applied to keys without a namespace override.
    pub fn default_options(mut self, options: CacheOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Default tuning for every key in `namespace` (the part of the key
    /// before `:`, so `"notifications"` covers `"notifications:list"`).
    pub fn namespace_defaults(
        mut self,
        namespace: impl Into<String>,
        options: CacheOptions,
    ) -> Self {
        self.namespace_defaults.insert(namespace.into(), options);
        self
    }

    pub fn build(self) -> ResourceCache {
        ResourceCache {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                clock: self.clock,
                default_options: self.default_options,
                namespace_defaults: self.namespace_defaults,
            }),
        }
    }
}

impl Default for ResourceCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCache {
    pub fn new() -> Self {
        ResourceCacheBuilder::new().build()
    }

    pub fn builder() -> ResourceCacheBuilder {
        ResourceCacheBuilder::new()
    }

    /// Register interest in `key` with the tuning configured for its
    /// namespace. See [`subscribe_with`](ResourceCache::subscribe_with).
    pub fn subscribe<T, F, Fut>(&self, key: &str, fetcher: F) -> Result<Subscription<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let options = self.options_for(key);
        self.subscribe_with(key, fetcher, options)
    }

    /// Register interest in `key`, creating the entry with `options` if it
    /// does not exist yet (an existing entry keeps its original tuning).
    ///
    /// Triggers a fetch when the entry has never fetched, has gone stale, or
    /// sits in error — a fresh subscription is an explicit retry trigger.
    /// While the fetch is in flight the returned handle still exposes the
    /// previous value, so screens render stale data plus a loading flag
    /// rather than a blank.
    pub fn subscribe_with<T, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        options: CacheOptions,
    ) -> Result<Subscription<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        validate_key(key)?;
        let erased = erase_fetcher(fetcher);

        let now = self.inner.clock.now_ms();
        let mut entries = self.inner.entries.lock().unwrap();
        Self::sweep_locked(&mut entries, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| {
            debug!("creating cache entry {:?}", key);
            CacheEntry::new(options, None, now)
        });

        // The most recent subscriber's fetcher serves later refetches.
        entry.fetcher = Some(erased);
        entry.subscriber_count += 1;
        entry.idle_since = None;
        entry.refresh_staleness(now);

        let should_fetch = entry.wants_fetch();
        if should_fetch {
            entry.begin_fetch();
        }
        let rx = entry.tx.subscribe();
        drop(entries);

        if should_fetch {
            self.spawn_fetch(key.to_string());
        }

        Ok(Subscription::new(key.to_string(), rx, self.inner.clone()))
    }

    /// Force a fetch regardless of staleness, as pull-to-refresh does. A
    /// refetch while one is already running joins the in-flight fetch; every
    /// subscriber observes the single outcome.
    pub fn refetch(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let now = self.inner.clock.now_ms();
        let mut entries = self.inner.entries.lock().unwrap();
        Self::sweep_locked(&mut entries, now);

        let Some(entry) = entries.get_mut(key) else {
            warn!("refetch for unknown key {:?} ignored", key);
            return Ok(());
        };

        if entry.state == EntryState::Fetching {
            debug!("refetch joins in-flight fetch for {:?}", key);
            return Ok(());
        }

        if entry.fetcher.is_none() {
            warn!("refetch for {:?} ignored, no fetcher registered", key);
            return Ok(());
        }

        entry.begin_fetch();
        drop(entries);

        self.spawn_fetch(key.to_string());
        Ok(())
    }

    /// Mark the entry stale without waiting for its staleness window.
    /// Idempotent. Entries with live subscribers revalidate immediately;
    /// unobserved entries stay stale until the next subscriber arrives.
    pub fn invalidate(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let now = self.inner.clock.now_ms();
        let mut entries = self.inner.entries.lock().unwrap();
        Self::sweep_locked(&mut entries, now);

        let Some(entry) = entries.get_mut(key) else {
            debug!("invalidate for unknown key {:?} ignored", key);
            return Ok(());
        };

        if entry.state == EntryState::Fetching {
            // The in-flight fetch will land fresher data than any marker.
            return Ok(());
        }

        if entry.state != EntryState::Stale {
            entry.state = EntryState::Stale;
            entry.publish();
        }

        if entry.subscriber_count > 0 && entry.fetcher.is_some() {
            entry.begin_fetch();
            drop(entries);
            self.spawn_fetch(key.to_string());
        }

        Ok(())
    }

    /// Optimistic local write, e.g. after a mutation elsewhere: the entry is
    /// fresh immediately, without a network round trip. Counts as a success,
    /// so failure bookkeeping resets; an in-flight fetch for the key is
    /// superseded and its outcome discarded. Unknown keys get a fetcher-less
    /// entry that the next subscriber completes.
    pub fn set_value<T: Send + Sync + 'static>(&self, key: &str, value: T) -> Result<()> {
        validate_key(key)?;

        let now = self.inner.clock.now_ms();
        let mut entries = self.inner.entries.lock().unwrap();
        Self::sweep_locked(&mut entries, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| {
            debug!("optimistic write creates entry {:?}", key);
            CacheEntry::new(self.options_for(key), None, now)
        });

        entry.complete_success(Arc::new(value) as ErasedValue, now);
        Ok(())
    }

    /// Read-only peek at the current state of a key.
    pub fn snapshot<T: Send + Sync + 'static>(&self, key: &str) -> Option<ResourceView<T>> {
        let now = self.inner.clock.now_ms();
        let mut entries = self.inner.entries.lock().unwrap();

        let entry = entries.get_mut(key)?;
        entry.refresh_staleness(now);
        Some(ResourceView::from_snapshot(&entry.snapshot()))
    }

    /// Evict entries with no subscribers past their gc window. Runs lazily
    /// inside every mutating call as well, so callers normally never need to
    /// schedule it. Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let now = self.inner.clock.now_ms();
        let mut entries = self.inner.entries.lock().unwrap();
        Self::sweep_locked(&mut entries, now)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.lock().unwrap().contains_key(key)
    }

    fn options_for(&self, key: &str) -> CacheOptions {
        let namespace = key_namespace(key);
        self.inner
            .namespace_defaults
            .get(namespace)
            .cloned()
            .unwrap_or_else(|| self.inner.default_options.clone())
    }

    fn sweep_locked(entries: &mut HashMap<String, CacheEntry>, now_ms: u64) -> usize {
        let before = entries.len();
        entries.retain(|key, entry| {
            let keep = !entry.gc_eligible(now_ms);
            if !keep {
                debug!("evicting idle cache entry {:?}", key);
            }
            keep
        });
        before - entries.len()
    }

    fn spawn_fetch(&self, key: String) {
        let inner = self.inner.clone();
        tokio::spawn(run_fetch(inner, key));
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject keys that cannot name a resource. A bad key is a caller bug and
/// fails synchronously instead of entering the retry machinery.
fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        bail!("Resource key must not be empty");
    }
    if key.chars().any(|c| c.is_control()) {
        bail!(
            "Resource key '{}' contains control characters",
            key.escape_default()
        );
    }
    Ok(())
}

/// Wrap a typed fetcher into the erased form stored on the entry.
fn erase_fetcher<T, F, Fut>(fetcher: F) -> ErasedFetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move || -> BoxFuture<'static, Result<ErasedValue>> {
        let fut = fetcher();
        Box::pin(async move { fut.await.map(|value| Arc::new(value) as ErasedValue) })
    })
}

/// Drive one fetch to completion: call the fetcher unlocked, publish the
/// outcome, sleep out the backoff between failed attempts. Exactly one of
/// these runs per key at a time; the entry stays `Fetching` for the whole
/// loop. An entry whose state changed under us (optimistic write, eviction)
/// ends the loop without publishing.
async fn run_fetch(inner: Arc<CacheInner>, key: String) {
    loop {
        let (fetcher, attempt, backoff) = {
            let entries = inner.entries.lock().unwrap();
            let Some(entry) = entries.get(&key) else {
                return;
            };
            if entry.state != EntryState::Fetching {
                return;
            }
            let Some(fetcher) = entry.fetcher.clone() else {
                return;
            };
            (fetcher, entry.retry_count + 1, entry.options.backoff.clone())
        };

        let result = fetcher().await;

        let now = inner.clock.now_ms();
        let delay = {
            let mut entries = inner.entries.lock().unwrap();
            let Some(entry) = entries.get_mut(&key) else {
                return;
            };
            if entry.state != EntryState::Fetching {
                return;
            }

            match result {
                Ok(value) => {
                    debug!("fetch succeeded for {:?} (attempt {})", key, attempt);
                    entry.complete_success(value, now);
                    return;
                }
                Err(err) => {
                    let detail = format!("{:#}", err);
                    warn!("fetch attempt {} failed for {:?}: {}", attempt, key, detail);

                    if !entry.record_failure(detail) {
                        // Parked in error; an explicit trigger restarts it.
                        return;
                    }

                    backoff.delay_for(entry.retry_count)
                }
            }
        };
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn manual_cache(clock: Arc<ManualClock>) -> ResourceCache {
        ResourceCache::builder().clock(clock).build()
    }

    #[test]
    fn test_rejects_malformed_keys() {
        let cache = ResourceCache::new();

        assert!(cache.refetch("").is_err());
        assert!(cache.refetch("   ").is_err());
        assert!(cache.invalidate("notifications\nlist").is_err());
        assert!(cache.set_value("\t", 1u8).is_err());
    }

    #[test]
    fn test_unknown_keys_are_noops() {
        let cache = ResourceCache::new();

        assert!(cache.refetch("profile:404").is_ok());
        assert!(cache.invalidate("profile:404").is_ok());
        assert!(!cache.contains("profile:404"));
    }

    #[test]
    fn test_set_value_creates_fresh_entry() {
        let clock = Arc::new(ManualClock::new(7));
        let cache = manual_cache(clock);

        cache.set_value("profile:42", String::from("bio")).unwrap();

        let view = cache.snapshot::<String>("profile:42").unwrap();
        assert!(view.is_fresh());
        assert_eq!(view.fetched_at, Some(7));
        assert_eq!(view.value.as_deref().map(String::as_str), Some("bio"));
        assert_eq!(view.retry_count, 0);
    }

    #[test]
    fn test_namespace_defaults_drive_staleness() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = ResourceCache::builder()
            .clock(clock.clone())
            .namespace_defaults(
                "notifications",
                CacheOptions::default().stale_time(Duration::from_secs(1)),
            )
            .build();

        cache.set_value("notifications:list", 1u8).unwrap();
        cache.set_value("profile:42", 2u8).unwrap();

        clock.advance(1_000);

        // The notifications namespace goes stale after a second; the default
        // five-minute window keeps the profile fresh.
        assert_eq!(
            cache.snapshot::<u8>("notifications:list").unwrap().state,
            EntryState::Stale
        );
        assert_eq!(
            cache.snapshot::<u8>("profile:42").unwrap().state,
            EntryState::Fresh
        );
    }

    #[test]
    fn test_lazy_sweep_collects_unobserved_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = ResourceCache::builder()
            .clock(clock.clone())
            .default_options(CacheOptions::default().gc_time(Duration::from_secs(600)))
            .build();

        cache.set_value("emoji:recent", 1u8).unwrap();
        assert!(cache.contains("emoji:recent"));

        clock.advance(599_999);
        assert_eq!(cache.sweep(), 0);
        assert!(cache.contains("emoji:recent"));

        clock.advance(1);
        assert_eq!(cache.sweep(), 1);
        assert!(!cache.contains("emoji:recent"));
    }

    #[test]
    fn test_invalidate_without_subscribers_is_idempotent() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = manual_cache(clock);

        cache.set_value("feed:home", vec![1u32, 2]).unwrap();

        cache.invalidate("feed:home").unwrap();
        let first = cache.snapshot::<Vec<u32>>("feed:home").unwrap();
        assert_eq!(first.state, EntryState::Stale);

        cache.invalidate("feed:home").unwrap();
        let second = cache.snapshot::<Vec<u32>>("feed:home").unwrap();
        assert_eq!(second.state, EntryState::Stale);
        assert_eq!(second.value.as_deref(), Some(&vec![1u32, 2]));
    }
}
