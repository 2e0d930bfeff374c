//! Navigation intent resolution: at most one pending target at a time,
//! arbitrated by priority and expiry.

pub mod action;
pub mod resolver;

pub use action::NavAction;
pub use resolver::{DEFAULT_EXPIRY, IntentResolver, NavigationIntent, NavigationTarget};
