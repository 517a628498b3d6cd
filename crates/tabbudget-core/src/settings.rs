//! TOML-based user configuration (the slow, synced tier).
//!
//! Stores:
//! - Work and break budgets in minutes
//! - The tracked-site list
//! - Warning lead time
//! - What to do with tracked tabs when the budget runs out
//!
//! Configuration is stored at `~/.config/tabbudget/config.toml`. The
//! engine only reads it, once per tick, through [`SettingsSource`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::normalize_site;
use crate::error::ConfigError;
use crate::storage::data_dir;

/// Page tracked tabs are sent to by default.
pub const DEFAULT_BLOCKED_PAGE: &str = "blocked.html";

/// What happens to tabs on tracked sites when the budget is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum EnforcementAction {
    /// Point every tracked tab at an internal page.
    Redirect {
        #[serde(default = "default_blocked_page")]
        url: String,
    },
    /// Close every tracked tab.
    Close,
    /// Leave tabs alone; only cookies are evicted.
    None,
}

/// User configuration.
///
/// Serialized to/from TOML at `~/.config/tabbudget/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_work_limit")]
    pub work_limit_minutes: f64,
    #[serde(default = "default_break_limit")]
    pub break_limit_minutes: f64,
    #[serde(default = "default_warning_lead")]
    pub warning_lead_seconds: u64,
    #[serde(default = "default_tracked_sites")]
    pub tracked_sites: Vec<String>,
    #[serde(default = "default_enforcement")]
    pub enforcement: EnforcementAction,
}

fn default_work_limit() -> f64 {
    25.0
}
fn default_break_limit() -> f64 {
    10.0
}
fn default_warning_lead() -> u64 {
    10
}
fn default_tracked_sites() -> Vec<String> {
    [
        "facebook.com",
        "instagram.com",
        "twitter.com",
        "x.com",
        "tiktok.com",
        "reddit.com",
        "youtube.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_blocked_page() -> String {
    DEFAULT_BLOCKED_PAGE.to_string()
}
fn default_enforcement() -> EnforcementAction {
    EnforcementAction::Redirect {
        url: default_blocked_page(),
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_limit_minutes: default_work_limit(),
            break_limit_minutes: default_break_limit(),
            warning_lead_seconds: default_warning_lead(),
            tracked_sites: default_tracked_sites(),
            enforcement: default_enforcement(),
        }
    }
}

impl Settings {
    /// Replace out-of-range values with defaults and reduce tracked sites
    /// to an ordered, de-duplicated list of bare domains.
    pub fn normalized(mut self) -> Self {
        if !(self.work_limit_minutes.is_finite() && self.work_limit_minutes > 0.0) {
            tracing::warn!(value = self.work_limit_minutes, "invalid work limit, using default");
            self.work_limit_minutes = default_work_limit();
        }
        if !(self.break_limit_minutes.is_finite() && self.break_limit_minutes > 0.0) {
            tracing::warn!(value = self.break_limit_minutes, "invalid break limit, using default");
            self.break_limit_minutes = default_break_limit();
        }
        if self.warning_lead_seconds == 0 {
            self.warning_lead_seconds = 1;
        }
        let mut sites: Vec<String> = Vec::with_capacity(self.tracked_sites.len());
        for raw in &self.tracked_sites {
            if let Some(site) = normalize_site(raw) {
                if !sites.contains(&site) {
                    sites.push(site);
                }
            }
        }
        self.tracked_sites = sites;
        if let EnforcementAction::Redirect { url } = &self.enforcement {
            if url.trim().is_empty() {
                self.enforcement = default_enforcement();
            }
        }
        self
    }

    /// Limit in minutes for the given mode (`true` = break).
    pub fn limit_minutes(&self, break_mode: bool) -> f64 {
        if break_mode {
            self.break_limit_minutes
        } else {
            self.work_limit_minutes
        }
    }

    /// Internal page tracked tabs are redirected to, also used to find
    /// "blocked" tabs when the user asks to close them.
    pub fn blocked_page(&self) -> &str {
        match &self.enforcement {
            EnforcementAction::Redirect { url } => url,
            _ => DEFAULT_BLOCKED_PAGE,
        }
    }

    /// Get a value as string by dot-separated key (`enforcement.action`).
    pub fn get(&self, key: &str) -> Option<String> {
        let pointer = dot_path_pointer(key)?;
        let json = serde_json::to_value(self).ok()?;
        match json.pointer(&pointer)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key. The new value must parse as the
    /// same JSON type as the current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let pointer = dot_path_pointer(key).ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        let slot = json
            .pointer_mut(&pointer)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        *slot = coerce_like(slot, value).map_err(invalid)?;

        let updated: Settings = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        *self = updated.normalized();
        Ok(())
    }
}

/// `enforcement.url` -> `/enforcement/url`. Empty keys and empty
/// segments address nothing.
fn dot_path_pointer(key: &str) -> Option<String> {
    if key.is_empty() || key.split('.').any(str::is_empty) {
        return None;
    }
    Some(key.split('.').fold(String::new(), |mut pointer, part| {
        pointer.push('/');
        pointer.push_str(part);
        pointer
    }))
}

/// Parse `raw` as a value of the same JSON kind as `current`.
fn coerce_like(current: &serde_json::Value, raw: &str) -> Result<serde_json::Value, String> {
    use serde_json::Value;

    match current {
        Value::Bool(_) => raw.parse::<bool>().map(Value::Bool).map_err(|e| e.to_string()),
        Value::Number(_) => raw
            .parse::<u64>()
            .map(Value::from)
            .or_else(|_| {
                raw.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or(())
            })
            .map_err(|_| format!("cannot parse '{raw}' as number")),
        Value::Array(_) | Value::Object(_) => serde_json::from_str(raw).map_err(|e| e.to_string()),
        _ => Ok(Value::String(raw.to_string())),
    }
}

/// Anything that can hand the engine the current settings.
///
/// Implementations must not fail: a broken source resolves to defaults.
pub trait SettingsSource: Send {
    fn settings(&self) -> Settings;
}

impl SettingsSource for Settings {
    fn settings(&self) -> Settings {
        self.clone()
    }
}

/// Settings backed by a TOML file, re-read on every call.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `config.toml` in the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn default_location() -> Result<Self, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/tabbudget"),
            message: e.to_string(),
        })?;
        Ok(Self::new(dir.join("config.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load from disk. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let settings: Settings =
                    toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                        path: self.path.clone(),
                        message: e.to_string(),
                    })?;
                Ok(settings.normalized())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(ConfigError::LoadFailed {
                path: self.path.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be serialized or written.
    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: self.path.clone(),
            message,
        };
        let content = toml::to_string_pretty(settings).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(&self.path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning defaults on error.
    pub fn load_or_default(&self) -> Settings {
        self.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default settings");
            Settings::default()
        })
    }
}

impl SettingsSource for ConfigFile {
    fn settings(&self) -> Settings {
        self.load_or_default()
    }
}
