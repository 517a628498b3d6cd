//! # TabBudget Core Library
//!
//! Shared usage timer and enforcement engine for time-boxed browsing.
//! One counter is shared by every tracked site: it advances one second per
//! tick while any tab on a tracked site is open, warns shortly before the
//! budget runs out, and on expiry evicts the sites' cookies and redirects
//! or closes their tabs.
//!
//! ## Architecture
//!
//! - **Engine**: [`UsageEngine`] is a tick-driven state machine; the caller
//!   invokes `tick()` once per second, or hands it to [`runtime::spawn`]
//! - **Host**: [`Browser`] and [`WarningSink`] abstract the browser's tab,
//!   cookie and audio APIs
//! - **Storage**: TOML settings plus a SQLite key/value table for the
//!   counter, mode and pause flag
//!
//! ## Key Components
//!
//! - [`UsageEngine`]: Core usage state machine
//! - [`Settings`]: User configuration
//! - [`Database`]: Durable key/value storage
//! - [`Event`]: State changes published by the engine

pub mod activity;
pub mod budget;
pub mod clock;
pub mod domain;
pub mod enforcement;
pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod runtime;
pub mod settings;
pub mod state;
pub mod storage;

pub use activity::{scan, TabActivitySnapshot};
pub use budget::Thresholds;
pub use clock::{Clock, ManualClock, SystemClock};
pub use enforcement::{EnforcementReport, ItemOutcome, ItemStatus};
pub use engine::{EngineOptions, Phase, Status, UsageEngine};
pub use error::{BrowserError, ConfigError, CoreError, StorageError};
pub use events::{Event, ResetReason};
pub use host::{Browser, BrowserModel, Cookie, IdleState, MemoryBrowser, Tab, TabId, WarningSink};
pub use runtime::EngineHandle;
pub use settings::{ConfigFile, EnforcementAction, Settings, SettingsSource};
pub use state::SharedTimerState;
pub use storage::{Database, KvStore, MemoryStore};
