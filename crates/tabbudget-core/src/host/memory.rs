//! In-memory browser host.
//!
//! [`BrowserModel`] is a plain, serializable picture of a browser (tabs,
//! cookies, focus, idle state) with the mutation rules the engine relies
//! on. [`MemoryBrowser`] wraps it behind the async [`Browser`] trait and
//! adds failure injection plus a call journal for tests.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Browser, Cookie, IdleState, Tab, TabId, WarningSink};
use crate::error::BrowserError;

/// New-tab page the model opens when a window would otherwise be empty.
pub const NEW_TAB_URL: &str = "chrome://newtab/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserModel {
    #[serde(default)]
    pub tabs: Vec<Tab>,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default = "default_true")]
    pub window_focused: bool,
    #[serde(default)]
    pub idle: IdleState,
    /// Open a new-tab page when the last tab of a window is closed.
    #[serde(default = "default_true")]
    pub keep_windows_open: bool,
    /// Prefix applied by [`Browser::internal_url`].
    #[serde(default)]
    pub extension_origin: String,
    /// Lowest id never handed out. Files written without it are seeded
    /// from the highest tab id present.
    #[serde(default)]
    pub next_id: i64,
}

fn default_true() -> bool {
    true
}

impl Default for BrowserModel {
    fn default() -> Self {
        Self {
            tabs: Vec::new(),
            cookies: Vec::new(),
            window_focused: true,
            idle: IdleState::Active,
            keep_windows_open: true,
            extension_origin: String::new(),
            next_id: 0,
        }
    }
}

impl BrowserModel {
    /// Model with one window holding `urls`, the first one active.
    pub fn with_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut model = Self::default();
        for (i, url) in urls.into_iter().enumerate() {
            model.tabs.push(Tab {
                id: TabId(i as i64 + 1),
                window_id: 1,
                url: Some(url.into()),
                active: i == 0,
            });
        }
        model.reserve_ids();
        model
    }

    pub fn tab(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.active)
    }

    pub fn update_tab_url(&mut self, id: TabId, url: &str) -> Result<(), BrowserError> {
        let tab = self
            .tabs
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(BrowserError::NoSuchTab(id.0))?;
        tab.url = Some(url.to_string());
        Ok(())
    }

    pub fn remove_tab(&mut self, id: TabId) -> Result<(), BrowserError> {
        let index = self
            .tabs
            .iter()
            .position(|t| t.id == id)
            .ok_or(BrowserError::NoSuchTab(id.0))?;
        self.reserve_ids();
        let removed = self.tabs.remove(index);

        let siblings: Vec<usize> = self
            .tabs
            .iter()
            .enumerate()
            .filter(|(_, t)| t.window_id == removed.window_id)
            .map(|(i, _)| i)
            .collect();
        if siblings.is_empty() {
            if self.keep_windows_open {
                let id = self.next_tab_id();
                self.tabs.push(Tab {
                    id,
                    window_id: removed.window_id,
                    url: Some(NEW_TAB_URL.to_string()),
                    active: true,
                });
            }
        } else if removed.active {
            if let Some(&last) = siblings.last() {
                self.tabs[last].active = true;
            }
        }
        Ok(())
    }

    /// Open a tab in the first window and make it active there.
    pub fn create_tab(&mut self, url: &str) -> TabId {
        let window_id = self.tabs.first().map(|t| t.window_id).unwrap_or(1);
        for tab in self.tabs.iter_mut().filter(|t| t.window_id == window_id) {
            tab.active = false;
        }
        let id = self.next_tab_id();
        self.tabs.push(Tab {
            id,
            window_id,
            url: Some(url.to_string()),
            active: true,
        });
        id
    }

    pub fn cookies_for_domain(&self, domain: &str) -> Vec<Cookie> {
        self.cookies
            .iter()
            .filter(|c| c.belongs_to(domain))
            .cloned()
            .collect()
    }

    /// Remove the cookie addressed by `url`, `name` and `store_id`.
    /// Removing a cookie that does not exist is not an error.
    pub fn remove_cookie(&mut self, url: &str, name: &str, store_id: &str) {
        self.cookies
            .retain(|c| !(c.name == name && c.store_id == store_id && c.removal_url() == url));
    }

    pub fn internal_url(&self, path: &str) -> String {
        join_internal_url(&self.extension_origin, path)
    }

    /// Ids of every tab still open count as used.
    fn reserve_ids(&mut self) {
        let highest = self.tabs.iter().map(|t| t.id.0).max().unwrap_or(0);
        self.next_id = self.next_id.max(highest + 1);
    }

    fn next_tab_id(&mut self) -> TabId {
        self.reserve_ids();
        let id = TabId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Resolve a packaged page `path` against an extension origin. An empty
/// origin leaves the path as is.
pub fn join_internal_url(origin: &str, path: &str) -> String {
    if origin.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", origin.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// A host call that changed something, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Redirected(TabId, String),
    Removed(TabId),
    Created(String),
    CookieRemoved(String),
    Indicator(bool),
    Warning,
}

#[derive(Debug, Default)]
struct Faults {
    tabs: BTreeSet<TabId>,
    cookie_domains: BTreeSet<String>,
    query: bool,
    warning: bool,
}

/// Thread-safe [`Browser`] over a [`BrowserModel`].
#[derive(Debug, Default)]
pub struct MemoryBrowser {
    model: Mutex<BrowserModel>,
    faults: Mutex<Faults>,
    journal: Mutex<Vec<HostCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryBrowser {
    pub fn new(model: BrowserModel) -> Self {
        Self {
            model: Mutex::new(model),
            faults: Mutex::new(Faults::default()),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Copy of the current model.
    pub fn model(&self) -> BrowserModel {
        lock(&self.model).clone()
    }

    /// Mutate the model in place (open tabs, change focus ...).
    pub fn with_model<R>(&self, f: impl FnOnce(&mut BrowserModel) -> R) -> R {
        f(&mut lock(&self.model))
    }

    /// Make every update/remove on `tab` fail.
    pub fn fail_tab(&self, tab: TabId) {
        lock(&self.faults).tabs.insert(tab);
    }

    /// Make cookie listing for `domain` fail.
    pub fn fail_cookies_for(&self, domain: &str) {
        lock(&self.faults).cookie_domains.insert(domain.to_string());
    }

    /// Make tab enumeration fail.
    pub fn fail_queries(&self, fail: bool) {
        lock(&self.faults).query = fail;
    }

    pub fn fail_warnings(&self, fail: bool) {
        lock(&self.faults).warning = fail;
    }

    pub fn journal(&self) -> Vec<HostCall> {
        lock(&self.journal).clone()
    }

    pub fn warnings_played(&self) -> usize {
        lock(&self.journal)
            .iter()
            .filter(|c| matches!(c, HostCall::Warning))
            .count()
    }

    fn record(&self, call: HostCall) {
        lock(&self.journal).push(call);
    }

    fn check_tab(&self, tab: TabId) -> Result<(), BrowserError> {
        if lock(&self.faults).tabs.contains(&tab) {
            Err(BrowserError::Api(format!("injected failure for tab {tab}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Browser for MemoryBrowser {
    async fn query_tabs(&self) -> Result<Vec<Tab>, BrowserError> {
        if lock(&self.faults).query {
            return Err(BrowserError::Api("injected query failure".into()));
        }
        Ok(lock(&self.model).tabs.clone())
    }

    async fn active_tab(&self) -> Result<Option<Tab>, BrowserError> {
        if lock(&self.faults).query {
            return Err(BrowserError::Api("injected query failure".into()));
        }
        Ok(lock(&self.model).active_tab().cloned())
    }

    async fn update_tab_url(&self, tab: TabId, url: &str) -> Result<(), BrowserError> {
        self.check_tab(tab)?;
        lock(&self.model).update_tab_url(tab, url)?;
        self.record(HostCall::Redirected(tab, url.to_string()));
        Ok(())
    }

    async fn remove_tab(&self, tab: TabId) -> Result<(), BrowserError> {
        self.check_tab(tab)?;
        lock(&self.model).remove_tab(tab)?;
        self.record(HostCall::Removed(tab));
        Ok(())
    }

    async fn create_tab(&self, url: &str) -> Result<TabId, BrowserError> {
        let id = lock(&self.model).create_tab(url);
        self.record(HostCall::Created(url.to_string()));
        Ok(id)
    }

    async fn cookies_for_domain(&self, domain: &str) -> Result<Vec<Cookie>, BrowserError> {
        if lock(&self.faults).cookie_domains.contains(domain) {
            return Err(BrowserError::Cookie(format!("injected failure for {domain}")));
        }
        Ok(lock(&self.model).cookies_for_domain(domain))
    }

    async fn remove_cookie(
        &self,
        url: &str,
        name: &str,
        store_id: &str,
    ) -> Result<(), BrowserError> {
        lock(&self.model).remove_cookie(url, name, store_id);
        self.record(HostCall::CookieRemoved(format!("{url}#{name}")));
        Ok(())
    }

    async fn window_focused(&self) -> Result<bool, BrowserError> {
        Ok(lock(&self.model).window_focused)
    }

    async fn idle_state(&self, _threshold_secs: u64) -> Result<IdleState, BrowserError> {
        Ok(lock(&self.model).idle)
    }

    fn internal_url(&self, path: &str) -> String {
        lock(&self.model).internal_url(path)
    }

    async fn set_indicator(&self, active: bool) -> Result<(), BrowserError> {
        self.record(HostCall::Indicator(active));
        Ok(())
    }
}

#[async_trait]
impl WarningSink for MemoryBrowser {
    async fn play_warning(&self) -> Result<(), BrowserError> {
        if lock(&self.faults).warning {
            return Err(BrowserError::Api("injected warning failure".into()));
        }
        self.record(HostCall::Warning);
        Ok(())
    }
}
