//! Single-slot arbitration of navigation intents.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock};

use super::action::NavAction;

/// How long a pending target stays relevant before it is dropped: past this
/// the triggering context has usually changed and the prompt would mislead.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(30);

/// A navigation intent as raised by a UI action handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationIntent {
    pub action: NavAction,
    /// Human-readable label shown alongside the indicator.
    pub description: String,
    /// Resolves conflicts between intents competing for the pending slot.
    pub priority: i32,
}

impl NavigationIntent {
    pub fn new(action: NavAction, description: impl Into<String>, priority: i32) -> Self {
        Self {
            action,
            description: description.into(),
            priority,
        }
    }
}

/// The pending navigation target shown by indicator UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationTarget {
    pub action: NavAction,
    pub description: String,
    pub priority: i32,
    /// Clock milliseconds at which the winning intent was raised.
    pub raised_at: u64,
}

/// Resolves raised intents into at most one pending [`NavigationTarget`].
///
/// Arbitration is deterministic and total: a new intent wins only with
/// strictly greater priority, equal priority keeps the incumbent
/// (first-raised-wins), and a target older than the expiry window is dropped
/// before any comparison. `raise`/`peek`/`consume`/`expire` serialize behind
/// one lock, so no caller observes an inconsistent slot.
pub struct IntentResolver {
    pending: Mutex<Option<NavigationTarget>>,
    tx: watch::Sender<Option<NavigationTarget>>,
    clock: Arc<dyn Clock>,
    expiry: Duration,
}

impl IntentResolver {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_EXPIRY)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, expiry: Duration) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            pending: Mutex::new(None),
            tx,
            clock,
            expiry,
        }
    }

    /// Raise an intent. Lower-priority intents competing for the user's
    /// attention are dropped silently; callers never need to check whether
    /// they won.
    pub fn raise(&self, intent: NavigationIntent) {
        let now = self.clock.now_ms();
        let mut pending = self.pending.lock().unwrap();
        Self::apply_expiry(&mut pending, now, self.expiry);

        let wins = match pending.as_ref() {
            None => true,
            Some(current) => intent.priority > current.priority,
        };
        if !wins {
            debug!(
                "dropping intent {} (priority {} does not beat pending)",
                intent.action, intent.priority
            );
            return;
        }

        let target = NavigationTarget {
            action: intent.action,
            description: intent.description,
            priority: intent.priority,
            raised_at: now,
        };
        debug!(
            "pending navigation target -> {} ({})",
            target.action, target.description
        );
        *pending = Some(target);
        self.tx.send_replace(pending.clone());
    }

    /// Read the pending target without clearing it.
    pub fn peek(&self) -> Option<NavigationTarget> {
        let now = self.clock.now_ms();
        let mut pending = self.pending.lock().unwrap();
        if Self::apply_expiry(&mut pending, now, self.expiry) {
            self.tx.send_replace(None);
        }
        pending.clone()
    }

    /// Take and clear the pending target; called when the user acts on the
    /// shown indicator.
    pub fn consume(&self) -> Option<NavigationTarget> {
        let now = self.clock.now_ms();
        let mut pending = self.pending.lock().unwrap();
        Self::apply_expiry(&mut pending, now, self.expiry);

        let taken = pending.take();
        if taken.is_some() {
            self.tx.send_replace(None);
        }
        taken
    }

    /// Drop the pending target if it has outlived the expiry window. `peek`
    /// and `raise` apply this lazily, so calling it is only needed when
    /// nothing else touches the resolver.
    pub fn expire(&self) {
        let now = self.clock.now_ms();
        let mut pending = self.pending.lock().unwrap();
        if Self::apply_expiry(&mut pending, now, self.expiry) {
            self.tx.send_replace(None);
        }
    }

    /// Push-based read model for indicator rendering.
    pub fn watch(&self) -> watch::Receiver<Option<NavigationTarget>> {
        self.tx.subscribe()
    }

    fn apply_expiry(
        pending: &mut Option<NavigationTarget>,
        now_ms: u64,
        expiry: Duration,
    ) -> bool {
        let expired = pending
            .as_ref()
            .is_some_and(|t| now_ms.saturating_sub(t.raised_at) >= expiry.as_millis() as u64);

        if expired {
            if let Some(target) = pending.take() {
                debug!("expiring stale navigation target {}", target.action);
            }
        }
        expired
    }
}

impl Default for IntentResolver {
    fn default() -> Self {
        Self::new()
    }
}
