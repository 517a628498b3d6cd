//! Enforcement side effects: cookie eviction and tab remediation.
//!
//! Every browser call is issued as its own future and awaited as a
//! batch, so one failing tab or domain never blocks the others. Each
//! item reports an [`ItemOutcome`]; the batch is an [`EnforcementReport`].

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::activity::scan;
use crate::error::BrowserError;
use crate::host::{Browser, Tab, TabId};
use crate::settings::{EnforcementAction, Settings};

/// How long to wait after closing tabs before sweeping placeholder tabs
/// the browser may have opened in their place.
pub const SWEEP_DELAY: Duration = Duration::from_millis(100);

/// URLs of blank and new-tab pages.
const PLACEHOLDER_URLS: [&str; 4] = [
    "chrome://newtab/",
    "chrome://new-tab-page/",
    "about:blank",
    "chrome-search://local-ntp/local-ntp.html",
];

/// Status of one enforcement item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Failed { reason: String },
}

/// Result of acting on a single cookie domain or tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Domain or tab the action was aimed at
    pub target: String,
    /// What was attempted (`evict_cookies`, `redirect`, `close`, `sweep`)
    pub action: String,
    /// Cookies removed, or 1 for a successful tab action
    pub affected: usize,
    pub status: ItemStatus,
}

impl ItemOutcome {
    fn success(target: impl Into<String>, action: &str, affected: usize) -> Self {
        Self {
            target: target.into(),
            action: action.to_string(),
            affected,
            status: ItemStatus::Success,
        }
    }

    fn failed(target: impl Into<String>, action: &str, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            action: action.to_string(),
            affected: 0,
            status: ItemStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ItemStatus::Success)
    }
}

/// Everything one expiry did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementReport {
    pub executed_at: DateTime<Utc>,
    pub cookies: Vec<ItemOutcome>,
    pub tabs: Vec<ItemOutcome>,
    pub swept: Vec<ItemOutcome>,
}

impl EnforcementReport {
    fn items(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.cookies.iter().chain(&self.tabs).chain(&self.swept)
    }

    pub fn success_count(&self) -> usize {
        self.items().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.items().filter(|o| !o.is_success()).count()
    }

    pub fn cookies_removed(&self) -> usize {
        self.cookies.iter().map(|o| o.affected).sum()
    }

    /// Tabs successfully redirected or closed by the main action.
    pub fn tabs_remediated(&self) -> usize {
        self.tabs.iter().filter(|o| o.is_success()).count()
    }
}

/// Whether a tab is a blank/new-tab placeholder.
pub fn is_placeholder(url: Option<&str>) -> bool {
    match url {
        None => true,
        Some(url) => {
            url.is_empty()
                || PLACEHOLDER_URLS.contains(&url)
                || url.starts_with("chrome://newtab/")
        }
    }
}

/// Cookie domains to clear: every tracked site and its `www.` variant.
pub fn cookie_domains(sites: &[String]) -> Vec<String> {
    sites
        .iter()
        .flat_map(|site| [site.clone(), format!("www.{site}")])
        .collect()
}

/// Remove every cookie of every tracked domain. One outcome per domain.
pub async fn evict_cookies(browser: &dyn Browser, sites: &[String]) -> Vec<ItemOutcome> {
    let domains = cookie_domains(sites);
    join_all(domains.iter().map(|domain| evict_domain(browser, domain))).await
}

async fn evict_domain(browser: &dyn Browser, domain: &str) -> ItemOutcome {
    let cookies = match browser.cookies_for_domain(domain).await {
        Ok(cookies) => cookies,
        Err(e) => {
            tracing::warn!(domain, error = %e, "failed to list cookies");
            return ItemOutcome::failed(domain, "evict_cookies", e.to_string());
        }
    };

    let results = join_all(cookies.iter().map(|cookie| async move {
        let url = cookie.removal_url();
        browser
            .remove_cookie(&url, &cookie.name, &cookie.store_id)
            .await
            .map_err(|e| format!("{}: {e}", cookie.name))
    }))
    .await;

    let removed = results.iter().filter(|r| r.is_ok()).count();
    let errors: Vec<String> = results.into_iter().filter_map(Result::err).collect();
    if errors.is_empty() {
        tracing::debug!(domain, removed, "cleared cookies");
        ItemOutcome::success(domain, "evict_cookies", removed)
    } else {
        tracing::warn!(domain, removed, failed = errors.len(), "some cookies were not removed");
        ItemOutcome {
            affected: removed,
            ..ItemOutcome::failed(domain, "evict_cookies", errors.join("; "))
        }
    }
}

async fn for_each_tab<F, Fut>(tabs: &[TabId], action: &str, f: F) -> Vec<ItemOutcome>
where
    F: Fn(TabId) -> Fut,
    Fut: std::future::Future<Output = Result<(), BrowserError>>,
{
    let results = join_all(tabs.iter().map(|&id| {
        let fut = f(id);
        async move { (id, fut.await) }
    }))
    .await;

    results
        .into_iter()
        .map(|(id, result)| match result {
            Ok(()) => ItemOutcome::success(id.to_string(), action, 1),
            Err(e) => {
                tracing::warn!(tab = %id, action, error = %e, "tab action failed");
                ItemOutcome::failed(id.to_string(), action, e.to_string())
            }
        })
        .collect()
}

/// Redirect all `tabs` to `url`.
pub async fn redirect_tabs(browser: &dyn Browser, tabs: &[TabId], url: &str) -> Vec<ItemOutcome> {
    for_each_tab(tabs, "redirect", |id| browser.update_tab_url(id, url)).await
}

/// Close all `tabs`.
pub async fn close_tabs(browser: &dyn Browser, tabs: &[TabId], action: &str) -> Vec<ItemOutcome> {
    for_each_tab(tabs, action, |id| browser.remove_tab(id)).await
}

/// Close every placeholder tab, plus `also` if given.
pub async fn sweep_placeholders(browser: &dyn Browser, also: Option<TabId>) -> Vec<ItemOutcome> {
    let tabs = match browser.query_tabs().await {
        Ok(tabs) => tabs,
        Err(e) => {
            tracing::warn!(error = %e, "could not enumerate tabs for sweep");
            return Vec::new();
        }
    };
    let mut targets: BTreeSet<TabId> = tabs
        .iter()
        .filter(|t| is_placeholder(t.url.as_deref()))
        .map(|t| t.id)
        .collect();
    if let Some(id) = also {
        targets.insert(id);
    }
    let targets: Vec<TabId> = targets.into_iter().collect();
    close_tabs(browser, &targets, "sweep").await
}

/// Run the full expiry batch: cookies first, then a fresh tab scan, then
/// the configured tab action. Counter reset is left to the caller.
pub async fn enforce(
    browser: &dyn Browser,
    settings: &Settings,
    sweep_delay: Duration,
) -> EnforcementReport {
    let cookies = evict_cookies(browser, &settings.tracked_sites).await;

    let tracked = match browser.query_tabs().await {
        Ok(tabs) => scan(&tabs, &settings.tracked_sites).tracked_tab_ids,
        Err(e) => {
            tracing::warn!(error = %e, "could not enumerate tabs for enforcement");
            Vec::new()
        }
    };

    let mut swept = Vec::new();
    let tabs = match &settings.enforcement {
        EnforcementAction::Redirect { url } => {
            let target = browser.internal_url(url);
            redirect_tabs(browser, &tracked, &target).await
        }
        EnforcementAction::Close => {
            let closed = close_tabs(browser, &tracked, "close").await;
            tokio::time::sleep(sweep_delay).await;
            swept = sweep_placeholders(browser, None).await;
            closed
        }
        EnforcementAction::None => Vec::new(),
    };

    let report = EnforcementReport {
        executed_at: Utc::now(),
        cookies,
        tabs,
        swept,
    };
    tracing::info!(
        cookies_removed = report.cookies_removed(),
        tabs_remediated = report.tabs_remediated(),
        failures = report.failure_count(),
        "enforcement finished"
    );
    report
}

/// "Back to work": close the tabs showing the blocked page.
///
/// The active blocked tab is kept until the delayed sweep so the user is
/// never left without a tab; if nothing else was closed a fresh new-tab
/// page is opened first. Returns the number of tabs closed before the
/// sweep.
pub async fn close_enforced_tabs(
    browser: &dyn Browser,
    blocked_page: &str,
    sweep_delay: Duration,
) -> usize {
    let tabs: Vec<Tab> = match browser.query_tabs().await {
        Ok(tabs) => tabs,
        Err(e) => {
            tracing::warn!(error = %e, "could not enumerate tabs to close");
            return 0;
        }
    };
    let blocked_url = browser.internal_url(blocked_page);
    let blocked: Vec<&Tab> = tabs
        .iter()
        .filter(|t| {
            t.url
                .as_deref()
                .map(|u| u.contains(blocked_url.as_str()))
                .unwrap_or(false)
        })
        .collect();
    let current = blocked.iter().find(|t| t.active).map(|t| t.id);
    let others: Vec<TabId> = blocked
        .iter()
        .map(|t| t.id)
        .filter(|id| Some(*id) != current)
        .collect();

    let closed = close_tabs(browser, &others, "close")
        .await
        .iter()
        .filter(|o| o.is_success())
        .count();
    tracing::info!(closed, blocked = blocked.len(), "closed blocked-page tabs");

    if closed == 0 {
        if let Err(e) = browser.create_tab(crate::host::NEW_TAB_URL).await {
            tracing::warn!(error = %e, "failed to open fallback tab");
        }
    }

    tokio::time::sleep(sweep_delay).await;
    sweep_placeholders(browser, current).await;
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BrowserModel, Cookie, HostCall, MemoryBrowser};

    fn sites() -> Vec<String> {
        vec!["reddit.com".to_string()]
    }

    fn cookie(name: &str, domain: &str) -> Cookie {
        Cookie {
            name: name.into(),
            domain: domain.into(),
            path: "/".into(),
            secure: true,
            store_id: "0".into(),
        }
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder(None));
        assert!(is_placeholder(Some("")));
        assert!(is_placeholder(Some("about:blank")));
        assert!(is_placeholder(Some("chrome://newtab/#most-visited")));
        assert!(!is_placeholder(Some("https://reddit.com")));
        assert!(!is_placeholder(Some("chrome://settings/")));
    }

    #[test]
    fn cookie_domains_include_www() {
        assert_eq!(cookie_domains(&sites()), vec!["reddit.com", "www.reddit.com"]);
    }

    #[tokio::test]
    async fn eviction_removes_cookies_and_isolates_failures() {
        let mut model = BrowserModel::default();
        model.cookies = vec![
            cookie("a", ".reddit.com"),
            cookie("b", "old.reddit.com"),
            cookie("c", "x.com"),
        ];
        let browser = MemoryBrowser::new(model);
        browser.fail_cookies_for("www.reddit.com");

        let outcomes = evict_cookies(&browser, &sites()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[0].affected, 2);
        assert!(!outcomes[1].is_success());

        let left: Vec<String> = browser.model().cookies.into_iter().map(|c| c.name).collect();
        assert_eq!(left, vec!["c"]);
    }

    #[tokio::test]
    async fn one_failing_tab_does_not_stop_the_rest() {
        let browser = MemoryBrowser::new(BrowserModel::with_urls([
            "https://reddit.com/a",
            "https://reddit.com/b",
            "https://reddit.com/c",
        ]));
        browser.fail_tab(TabId(2));

        let outcomes =
            redirect_tabs(&browser, &[TabId(1), TabId(2), TabId(3)], "blocked.html").await;
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 2);
        assert_eq!(outcomes[1].target, "2");

        let model = browser.model();
        assert_eq!(model.tab(TabId(1)).unwrap().url.as_deref(), Some("blocked.html"));
        assert_eq!(model.tab(TabId(2)).unwrap().url.as_deref(), Some("https://reddit.com/b"));
        assert_eq!(model.tab(TabId(3)).unwrap().url.as_deref(), Some("blocked.html"));
    }

    #[tokio::test]
    async fn close_action_sweeps_auto_opened_new_tab() {
        let browser = MemoryBrowser::new(BrowserModel::with_urls(["https://reddit.com"]));
        let settings = Settings {
            tracked_sites: sites(),
            enforcement: EnforcementAction::Close,
            ..Settings::default()
        };

        let report = enforce(&browser, &settings, Duration::ZERO).await;
        assert_eq!(report.tabs_remediated(), 1);
        // closing the only tab made the browser open a new-tab page (id 2)
        assert_eq!(report.swept.len(), 1);
        assert_eq!(report.swept[0].target, "2");
        assert!(browser.journal().contains(&HostCall::Removed(TabId(2))));
    }

    #[tokio::test]
    async fn none_action_only_clears_cookies() {
        let mut model = BrowserModel::with_urls(["https://reddit.com"]);
        model.cookies = vec![cookie("a", "reddit.com")];
        let browser = MemoryBrowser::new(model);
        let settings = Settings {
            tracked_sites: sites(),
            enforcement: EnforcementAction::None,
            ..Settings::default()
        };

        let report = enforce(&browser, &settings, Duration::ZERO).await;
        assert!(report.tabs.is_empty());
        assert_eq!(report.cookies_removed(), 1);
        assert_eq!(browser.model().tabs.len(), 1);
    }

    #[tokio::test]
    async fn close_enforced_tabs_keeps_active_until_sweep() {
        let mut model = BrowserModel::with_urls([
            "https://docs.rs",
            "blocked.html",
            "blocked.html",
        ]);
        model.tabs[0].active = false;
        model.tabs[2].active = true;
        let browser = MemoryBrowser::new(model);

        let closed = close_enforced_tabs(&browser, "blocked.html", Duration::ZERO).await;
        assert_eq!(closed, 1);

        let journal = browser.journal();
        assert_eq!(journal[0], HostCall::Removed(TabId(2)));
        assert!(journal.contains(&HostCall::Removed(TabId(3))));
        let urls: Vec<_> = browser.model().tabs.into_iter().filter_map(|t| t.url).collect();
        assert_eq!(urls, vec!["https://docs.rs"]);
    }

    #[tokio::test]
    async fn close_enforced_tabs_opens_fallback_when_nothing_closed() {
        let mut model = BrowserModel::with_urls(["blocked.html", "https://docs.rs"]);
        model.keep_windows_open = false;
        let browser = MemoryBrowser::new(model);

        let closed = close_enforced_tabs(&browser, "blocked.html", Duration::ZERO).await;
        assert_eq!(closed, 0);
        let journal = browser.journal();
        assert_eq!(journal[0], HostCall::Created(crate::host::NEW_TAB_URL.to_string()));
        // the fallback new-tab page and the active blocked tab are swept
        assert!(journal.contains(&HostCall::Removed(TabId(1))));
        assert!(journal.contains(&HostCall::Removed(TabId(3))));
        let urls: Vec<_> = browser.model().tabs.into_iter().filter_map(|t| t.url).collect();
        assert_eq!(urls, vec!["https://docs.rs"]);
    }
}
