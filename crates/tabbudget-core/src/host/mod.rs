//! Seams to the host browser.
//!
//! The engine never touches tabs, cookies or audio directly; it goes
//! through these traits so the same core runs inside a real extension
//! bridge, the CLI's tab-file host, or an in-memory test double.

mod memory;

pub use memory::{join_internal_url, BrowserModel, HostCall, MemoryBrowser, NEW_TAB_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BrowserError;

/// Opaque tab handle issued by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One open tab in any window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    #[serde(default)]
    pub window_id: i64,
    /// `None` while the host has not resolved the URL yet.
    #[serde(default)]
    pub url: Option<String>,
    /// Active tab of its window.
    #[serde(default)]
    pub active: bool,
}

/// A stored cookie as reported by the host cookie API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    /// Cookie domain, possibly with a leading `.`.
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub store_id: String,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl Cookie {
    /// URL the host needs to address this cookie for removal.
    pub fn removal_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        let host = self.domain.strip_prefix('.').unwrap_or(&self.domain);
        format!("{scheme}://{host}{}", self.path)
    }

    /// Whether this cookie would be returned for a lookup on `domain`:
    /// its domain equals `domain` or is a subdomain of it.
    pub fn belongs_to(&self, domain: &str) -> bool {
        let own = self.domain.strip_prefix('.').unwrap_or(&self.domain);
        own == domain || own.ends_with(&format!(".{domain}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    #[default]
    Active,
    Idle,
    Locked,
}

/// Seconds without input after which the host reports [`IdleState::Idle`].
pub const IDLE_THRESHOLD_SECS: u64 = 60;

/// Tab, cookie and window APIs of the host browser.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Every open tab across every window.
    async fn query_tabs(&self) -> Result<Vec<Tab>, BrowserError>;

    /// The active tab of the focused (or last focused) window.
    async fn active_tab(&self) -> Result<Option<Tab>, BrowserError>;

    async fn update_tab_url(&self, tab: TabId, url: &str) -> Result<(), BrowserError>;

    async fn remove_tab(&self, tab: TabId) -> Result<(), BrowserError>;

    async fn create_tab(&self, url: &str) -> Result<TabId, BrowserError>;

    /// All cookies whose domain matches `domain` or one of its subdomains.
    async fn cookies_for_domain(&self, domain: &str) -> Result<Vec<Cookie>, BrowserError>;

    async fn remove_cookie(
        &self,
        url: &str,
        name: &str,
        store_id: &str,
    ) -> Result<(), BrowserError>;

    async fn window_focused(&self) -> Result<bool, BrowserError>;

    async fn idle_state(&self, threshold_secs: u64) -> Result<IdleState, BrowserError>;

    /// Resolve a packaged page path (`blocked.html`) to a loadable URL.
    fn internal_url(&self, path: &str) -> String {
        path.to_string()
    }

    /// Reflect whether usage is currently being counted (toolbar icon).
    async fn set_indicator(&self, _active: bool) -> Result<(), BrowserError> {
        Ok(()) // default no-op
    }
}

/// Plays the pre-expiry warning.
#[async_trait]
pub trait WarningSink: Send + Sync {
    async fn play_warning(&self) -> Result<(), BrowserError>;
}
