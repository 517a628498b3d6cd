//! Per-tick scan of open tabs for tracked activity.
//!
//! Any open tab on a tracked site counts, whatever window has focus and
//! whether or not the user is idle.

use serde::{Deserialize, Serialize};

use crate::domain::url_is_tracked;
use crate::host::{Tab, TabId};

/// Result of one scan. Recomputed every tick, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabActivitySnapshot {
    pub any_tracked_tab_open: bool,
    /// Tracked tabs in enumeration order.
    pub tracked_tab_ids: Vec<TabId>,
}

/// Classify `tabs` against `sites`. Tabs without a URL are skipped.
pub fn scan(tabs: &[Tab], sites: &[String]) -> TabActivitySnapshot {
    let tracked_tab_ids: Vec<TabId> = tabs
        .iter()
        .filter(|tab| {
            tab.url
                .as_deref()
                .map(|url| url_is_tracked(url, sites))
                .unwrap_or(false)
        })
        .map(|tab| tab.id)
        .collect();
    TabActivitySnapshot {
        any_tracked_tab_open: !tracked_tab_ids.is_empty(),
        tracked_tab_ids,
    }
}
