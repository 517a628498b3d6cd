//! Browser host backed by a JSON tab file.
//!
//! Every call re-reads the file, applies the change to a
//! [`BrowserModel`] and writes it back, so the file can be edited by hand
//! (or by a test) while the engine runs.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tabbudget_core::{Browser, BrowserError, BrowserModel, Cookie, IdleState, Tab, TabId, WarningSink};
use tokio::sync::Mutex;

pub fn load_model(path: &Path) -> Result<BrowserModel, BrowserError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BrowserError::Api(format!("read {}: {e}", path.display())))?;
    parse_model(path, &content)
}

fn parse_model(path: &Path, content: &str) -> Result<BrowserModel, BrowserError> {
    serde_json::from_str(content)
        .map_err(|e| BrowserError::Api(format!("parse {}: {e}", path.display())))
}

pub struct FileBrowser {
    path: PathBuf,
    // serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl FileBrowser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BrowserModel, BrowserError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| BrowserError::Api(format!("read {}: {e}", self.path.display())))?;
        parse_model(&self.path, &content)
    }

    async fn read<R>(&self, f: impl FnOnce(&BrowserModel) -> R) -> Result<R, BrowserError> {
        let _guard = self.lock.lock().await;
        let model = self.load().await?;
        Ok(f(&model))
    }

    async fn update<R>(
        &self,
        f: impl FnOnce(&mut BrowserModel) -> Result<R, BrowserError>,
    ) -> Result<R, BrowserError> {
        let _guard = self.lock.lock().await;
        let mut model = self.load().await?;
        let result = f(&mut model)?;
        let content = serde_json::to_string_pretty(&model)
            .map_err(|e| BrowserError::Api(e.to_string()))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| BrowserError::Api(format!("write {}: {e}", self.path.display())))?;
        Ok(result)
    }
}

#[async_trait]
impl Browser for FileBrowser {
    async fn query_tabs(&self) -> Result<Vec<Tab>, BrowserError> {
        self.read(|m| m.tabs.clone()).await
    }

    async fn active_tab(&self) -> Result<Option<Tab>, BrowserError> {
        self.read(|m| m.active_tab().cloned()).await
    }

    async fn update_tab_url(&self, tab: TabId, url: &str) -> Result<(), BrowserError> {
        self.update(|m| m.update_tab_url(tab, url)).await
    }

    async fn remove_tab(&self, tab: TabId) -> Result<(), BrowserError> {
        self.update(|m| m.remove_tab(tab)).await
    }

    async fn create_tab(&self, url: &str) -> Result<TabId, BrowserError> {
        self.update(|m| Ok(m.create_tab(url))).await
    }

    async fn cookies_for_domain(&self, domain: &str) -> Result<Vec<Cookie>, BrowserError> {
        self.read(|m| m.cookies_for_domain(domain)).await
    }

    async fn remove_cookie(
        &self,
        url: &str,
        name: &str,
        store_id: &str,
    ) -> Result<(), BrowserError> {
        self.update(|m| {
            m.remove_cookie(url, name, store_id);
            Ok(())
        })
        .await
    }

    async fn window_focused(&self) -> Result<bool, BrowserError> {
        self.read(|m| m.window_focused).await
    }

    async fn idle_state(&self, _threshold_secs: u64) -> Result<IdleState, BrowserError> {
        self.read(|m| m.idle).await
    }

    fn internal_url(&self, path: &str) -> String {
        // sync on the trait, so this one read blocks
        load_model(&self.path)
            .map(|m| m.internal_url(path))
            .unwrap_or_else(|_| path.to_string())
    }

    async fn set_indicator(&self, active: bool) -> Result<(), BrowserError> {
        tracing::info!(active, "tracking indicator");
        Ok(())
    }
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default)]
pub struct TerminalBell;

#[async_trait]
impl WarningSink for TerminalBell {
    async fn play_warning(&self) -> Result<(), BrowserError> {
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| BrowserError::Api(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_model(dir: &Path, model: &BrowserModel) -> PathBuf {
        let path = dir.join("tabs.json");
        std::fs::write(&path, serde_json::to_string(model).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn changes_are_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            &BrowserModel::with_urls(["https://reddit.com", "https://docs.rs"]),
        );
        let browser = FileBrowser::new(&path);

        browser.update_tab_url(TabId(1), "blocked.html").await.unwrap();
        browser.remove_tab(TabId(2)).await.unwrap();

        let model = load_model(&path).unwrap();
        assert_eq!(model.tabs.len(), 1);
        assert_eq!(model.tabs[0].url.as_deref(), Some("blocked.html"));
    }

    #[tokio::test]
    async fn missing_file_is_a_browser_error() {
        let dir = tempfile::tempdir().unwrap();
        let browser = FileBrowser::new(dir.path().join("missing.json"));
        assert!(browser.query_tabs().await.is_err());
        assert_eq!(browser.internal_url("blocked.html"), "blocked.html");
    }

    #[tokio::test]
    async fn failed_update_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(dir.path(), &BrowserModel::with_urls(["https://reddit.com"]));
        let before = std::fs::read_to_string(&path).unwrap();

        let browser = FileBrowser::new(&path);
        assert!(browser.remove_tab(TabId(9)).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }
}
