//! Live read handles over cached resources.

use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use tokio::sync::watch;

use super::entry::{EntrySnapshot, EntryState, ResourceView};
use super::manager::CacheInner;

/// Live handle registering interest in one resource key.
///
/// The snapshot visible through [`view`](Subscription::view) updates on every
/// state change of the underlying entry; [`changed`](Subscription::changed)
/// suspends until the next one. Dropping the handle releases the
/// subscription. It never cancels an in-flight fetch shared with other
/// subscribers, but once the last handle is gone the entry's gc window
/// starts counting.
pub struct Subscription<T> {
    key: String,
    rx: watch::Receiver<EntrySnapshot>,
    inner: Arc<CacheInner>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
    pub(crate) fn new(
        key: String,
        rx: watch::Receiver<EntrySnapshot>,
        inner: Arc<CacheInner>,
    ) -> Self {
        Self {
            key,
            rx,
            inner,
            _payload: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current typed snapshot of the resource.
    pub fn view(&self) -> ResourceView<T> {
        ResourceView::from_snapshot(&self.rx.borrow())
    }

    /// Last successfully fetched value, if any.
    pub fn value(&self) -> Option<Arc<T>> {
        self.view().value
    }

    pub fn state(&self) -> EntryState {
        self.rx.borrow().state
    }

    /// Last failure detail, cleared by the next successful fetch.
    pub fn error(&self) -> Option<String> {
        self.rx.borrow().error.clone()
    }

    /// Wait for the next state change. Returns false once the entry has been
    /// evicted and no further updates can arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let now = self.inner.clock.now_ms();
        let mut entries = self.inner.entries.lock().unwrap();

        if let Some(entry) = entries.get_mut(&self.key) {
            entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
            if entry.subscriber_count == 0 {
                entry.idle_since = Some(now);
                debug!("last subscriber left {:?}, gc window starts", self.key);
            }
        }
    }
}
