//! Integration tests for navigation intent arbitration: priority ordering,
//! tie handling, expiry against a manual clock, and the consume round trip.

use std::sync::Arc;
use std::time::Duration;

use surface_core::{IntentResolver, ManualClock, NavAction, NavigationIntent};

fn resolver_at(clock: &Arc<ManualClock>) -> IntentResolver {
    IntentResolver::with_clock(clock.clone(), Duration::from_secs(30))
}

#[test]
fn test_priority_arbitration_across_competing_screens() {
    let clock = Arc::new(ManualClock::new(0));
    let resolver = resolver_at(&clock);

    resolver.raise(NavigationIntent::new(NavAction::Sidebar, "Open menu", 1));
    resolver.raise(NavigationIntent::new(NavAction::Friends, "New friend request", 5));
    resolver.raise(NavigationIntent::new(NavAction::Profile, "Complete your profile", 3));

    let pending = resolver.peek().expect("highest priority target pending");
    assert_eq!(pending.action, NavAction::Friends);
    assert_eq!(pending.priority, 5);

    // A tie with the current pending target keeps the first-raised one.
    resolver.raise(NavigationIntent::new(NavAction::Feed, "Back to feed", 5));
    let pending = resolver.peek().unwrap();
    assert_eq!(pending.action, NavAction::Friends);
    assert_eq!(pending.description, "New friend request");
}

#[test]
fn test_target_expires_after_thirty_seconds() {
    let clock = Arc::new(ManualClock::new(0));
    let resolver = resolver_at(&clock);

    resolver.raise(NavigationIntent::new(NavAction::Feed, "Back to feed", 1));
    assert!(resolver.peek().is_some());

    clock.set(31_000);
    resolver.expire();
    assert!(resolver.peek().is_none());
}

#[test]
fn test_peek_alone_applies_expiry() {
    let clock = Arc::new(ManualClock::new(0));
    let resolver = resolver_at(&clock);

    resolver.raise(NavigationIntent::new(NavAction::Sidebar, "Open menu", 2));

    clock.set(31_000);
    // No explicit expire() call; peek is enough.
    assert!(resolver.peek().is_none());
}

#[test]
fn test_consume_round_trip() {
    let clock = Arc::new(ManualClock::new(100));
    let resolver = resolver_at(&clock);

    resolver.raise(NavigationIntent::new(NavAction::Profile, "Xem hồ sơ", 2));

    let target = resolver.consume().expect("raised target is consumable");
    assert_eq!(target.action, NavAction::Profile);
    assert_eq!(target.description, "Xem hồ sơ");
    assert_eq!(target.priority, 2);
    assert_eq!(target.raised_at, 100);

    assert!(resolver.peek().is_none());
}

#[test]
fn test_watch_surface_tracks_the_slot() {
    let clock = Arc::new(ManualClock::new(0));
    let resolver = resolver_at(&clock);
    let rx = resolver.watch();

    assert!(rx.borrow().is_none());

    resolver.raise(NavigationIntent::new(NavAction::Friends, "New friend request", 4));
    assert_eq!(rx.borrow().as_ref().unwrap().action, NavAction::Friends);

    // A losing intent leaves the published slot untouched.
    resolver.raise(NavigationIntent::new(NavAction::Sidebar, "Open menu", 1));
    assert_eq!(rx.borrow().as_ref().unwrap().action, NavAction::Friends);

    resolver.consume();
    assert!(rx.borrow().is_none());
}
