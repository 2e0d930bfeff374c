//! The closed set of navigation actions.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Destination a raised navigation intent points at.
///
/// Deliberately a closed enum rather than a free string: indicator renderers
/// stay exhaustive over actions, and an unknown action is caught at the
/// boundary instead of falling through to a default icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavAction {
    /// Open the sidebar / drawer.
    Sidebar,
    /// Jump to the friends list.
    Friends,
    /// Jump to the current user's profile.
    Profile,
    /// Jump to the main feed.
    Feed,
}

impl NavAction {
    /// Every action, in indicator display order.
    pub const ALL: [NavAction; 4] = [
        NavAction::Sidebar,
        NavAction::Friends,
        NavAction::Profile,
        NavAction::Feed,
    ];

    /// Stable lowercase tag, the wire and analytics spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            NavAction::Sidebar => "sidebar",
            NavAction::Friends => "friends",
            NavAction::Profile => "profile",
            NavAction::Feed => "feed",
        }
    }
}

impl fmt::Display for NavAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NavAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sidebar" => Ok(NavAction::Sidebar),
            "friends" => Ok(NavAction::Friends),
            "profile" => Ok(NavAction::Profile),
            "feed" => Ok(NavAction::Feed),
            other => bail!("Unknown navigation action '{}'", other),
        }
    }
}
