//! Usage engine implementation.
//!
//! The engine has no internal thread. The caller (normally
//! [`crate::runtime`]) invokes `tick()` once per second and must await it
//! to completion before the next one, so cycles never overlap.
//!
//! ## State Transitions
//!
//! ```text
//! Idle <-> Accumulating -> Warned -> Expired -> (Idle | Accumulating)
//! ```
//!
//! Each tick runs, in order: daily rollover, tab scan, accumulation
//! (unless paused), warning check, expiry check. Expiry evicts cookies,
//! remediates tabs and zeroes the counter within the same tick.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = UsageEngine::new(browser, warning, Box::new(settings),
//!     Box::new(SystemClock), Box::new(Database::open()?));
//! // In a loop, once per second:
//! let events = engine.tick().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::activity::{scan, TabActivitySnapshot};
use crate::budget::Thresholds;
use crate::clock::Clock;
use crate::domain::{hostname_from_url, is_tracked};
use crate::enforcement::{self, SWEEP_DELAY};
use crate::events::{Event, ResetReason};
use crate::host::{Browser, IdleState, WarningSink, IDLE_THRESHOLD_SECS};
use crate::settings::{Settings, SettingsSource};
use crate::state::{SharedTimerState, UsageState};
use crate::storage::KvStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No tracked tab open.
    Idle,
    /// Tracked tab open, counting, warning not yet given.
    Accumulating,
    /// Warning given this cycle, budget not yet exhausted.
    Warned,
}

/// Tunables that are not user settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Delay between closing tabs and sweeping placeholder tabs.
    pub sweep_delay: Duration,
    /// Seconds without input before the user counts as idle.
    pub idle_threshold_secs: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sweep_delay: SWEEP_DELAY,
            idle_threshold_secs: IDLE_THRESHOLD_SECS,
        }
    }
}

/// Answer to the status query. Field names are the wire contract the
/// popup and on-page widget read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Domain of the active tab, tracked or not.
    pub domain: Option<String>,
    pub is_tracked: bool,
    pub elapsed_sec: u64,
    pub limit_sec: u64,
    pub window_focused: bool,
    pub user_active: bool,
    pub paused: bool,
    pub break_mode: bool,
    pub phase: Phase,
    pub is_shared_timer: bool,
}

impl Status {
    /// Neutral snapshot returned when the engine cannot be reached.
    pub fn degraded() -> Self {
        Self {
            domain: None,
            is_tracked: false,
            elapsed_sec: 0,
            limit_sec: 0,
            window_focused: false,
            user_active: false,
            paused: false,
            break_mode: false,
            phase: Phase::Idle,
            is_shared_timer: true,
        }
    }
}

/// Shared usage timer and enforcement state machine.
pub struct UsageEngine {
    browser: Arc<dyn Browser>,
    warning: Arc<dyn WarningSink>,
    settings: Box<dyn SettingsSource>,
    clock: Box<dyn Clock>,
    state: UsageState,
    options: EngineOptions,
    /// Warning latch for the current cycle; cleared on every reset.
    warned: bool,
    /// Verdict of the previous scan, `None` before the first tick.
    tracking: Option<bool>,
    outbox: Vec<Event>,
}

impl UsageEngine {
    /// Build an engine and restore persisted state from `store`.
    pub fn new(
        browser: Arc<dyn Browser>,
        warning: Arc<dyn WarningSink>,
        settings: Box<dyn SettingsSource>,
        clock: Box<dyn Clock>,
        store: Box<dyn KvStore>,
    ) -> Self {
        Self {
            browser,
            warning,
            settings,
            clock,
            state: UsageState::load(store),
            options: EngineOptions::default(),
            warned: false,
            tracking: None,
            outbox: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn timer(&self) -> SharedTimerState {
        self.state.timer()
    }

    pub fn seconds_used(&self) -> u64 {
        self.state.seconds_used()
    }

    pub fn paused(&self) -> bool {
        self.state.paused()
    }

    pub fn break_mode(&self) -> bool {
        self.state.break_mode()
    }

    pub fn phase(&self) -> Phase {
        match self.tracking {
            Some(true) if self.warned => Phase::Warned,
            Some(true) => Phase::Accumulating,
            _ => Phase::Idle,
        }
    }

    /// Thresholds for the current mode under the current settings.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::for_mode(&self.settings.settings(), self.state.break_mode())
    }

    /// Status query. Never fails; browser errors degrade single fields.
    pub async fn status(&mut self) -> Status {
        self.daily_check();
        let settings = self.settings.settings();
        let thresholds = Thresholds::for_mode(&settings, self.state.break_mode());

        let domain = match self.browser.active_tab().await {
            Ok(tab) => tab.and_then(|t| t.url).and_then(|url| hostname_from_url(&url)),
            Err(e) => {
                tracing::debug!(error = %e, "active tab unavailable for status");
                None
            }
        };
        let is_tracked = domain
            .as_deref()
            .map(|d| is_tracked(d, &settings.tracked_sites))
            .unwrap_or(false);
        let window_focused = self.browser.window_focused().await.unwrap_or(false);
        let user_active = matches!(
            self.browser.idle_state(self.options.idle_threshold_secs).await,
            Ok(IdleState::Active)
        );

        Status {
            domain,
            is_tracked,
            elapsed_sec: self.state.seconds_used(),
            limit_sec: thresholds.budget_seconds,
            window_focused,
            user_active,
            paused: self.state.paused(),
            break_mode: self.state.break_mode(),
            phase: self.phase(),
            is_shared_timer: true,
        }
    }

    /// Drain events produced by commands since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Run one evaluation cycle. Returns every event it (and any command
    /// since the previous drain) produced.
    pub async fn tick(&mut self) -> Vec<Event> {
        self.daily_check();
        let settings = self.settings.settings();

        let snapshot = match self.browser.query_tabs().await {
            Ok(tabs) => scan(&tabs, &settings.tracked_sites),
            Err(e) => {
                tracing::warn!(error = %e, "tab enumeration failed, treating as untracked");
                TabActivitySnapshot::default()
            }
        };
        self.observe_activity(&snapshot).await;

        if snapshot.any_tracked_tab_open && !self.state.paused() {
            self.accumulate(&settings).await;
        }

        self.take_events()
    }

    /// Zero the counter on request.
    pub fn reset_timer(&mut self) {
        let forfeited = self.reset_cycle();
        tracing::info!(forfeited, "timer reset by request");
        self.emit(Event::TimerReset {
            reason: ResetReason::Manual,
            forfeited_secs: forfeited,
            at: Utc::now(),
        });
    }

    /// Flip the pause flag. Returns the new value.
    pub fn toggle_pause(&mut self) -> bool {
        let paused = self.state.toggle_pause();
        tracing::info!(paused, "pause toggled");
        self.emit(Event::PauseToggled {
            paused,
            at: Utc::now(),
        });
        paused
    }

    /// Switch between work and break budgets, forfeiting the current
    /// count. Returns `true` when break mode is now active.
    pub fn toggle_mode(&mut self) -> bool {
        let forfeited = self.state.seconds_used();
        let break_mode = self.state.toggle_mode();
        self.warned = false;
        let budget_seconds = self.thresholds().budget_seconds;
        tracing::info!(break_mode, budget_seconds, forfeited, "mode switched");
        self.emit(Event::TimerReset {
            reason: ResetReason::ModeSwitch,
            forfeited_secs: forfeited,
            at: Utc::now(),
        });
        self.emit(Event::ModeChanged {
            break_mode,
            budget_seconds,
            at: Utc::now(),
        });
        break_mode
    }

    /// Close tabs parked on the blocked page. Returns how many were
    /// closed before the placeholder sweep.
    pub async fn close_enforced_tabs(&mut self) -> usize {
        let settings = self.settings.settings();
        let closed_count = enforcement::close_enforced_tabs(
            self.browser.as_ref(),
            settings.blocked_page(),
            self.options.sweep_delay,
        )
        .await;
        self.emit(Event::EnforcedTabsClosed {
            closed_count,
            at: Utc::now(),
        });
        closed_count
    }

    /// Roll the counter over if the calendar day changed. Returns `true`
    /// when it did.
    pub fn daily_check(&mut self) -> bool {
        let today = self.clock.today();
        let forfeited = self.state.seconds_used();
        if !self.state.roll_over_if_new_day(today) {
            return false;
        }
        self.warned = false;
        tracing::info!(%today, forfeited, "daily timer reset");
        self.emit(Event::DailyReset {
            day: today,
            forfeited_secs: forfeited,
            at: Utc::now(),
        });
        true
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn emit(&mut self, event: Event) {
        self.outbox.push(event);
    }

    fn reset_cycle(&mut self) -> u64 {
        self.warned = false;
        self.state.reset()
    }

    async fn observe_activity(&mut self, snapshot: &TabActivitySnapshot) {
        let active = snapshot.any_tracked_tab_open;
        if self.tracking == Some(active) {
            return;
        }
        let previous = self.tracking.replace(active);
        tracing::debug!(?previous, active, "tracking state changed");
        if let Err(e) = self.browser.set_indicator(active).await {
            tracing::warn!(error = %e, "failed to update indicator");
        }
        let event = if active {
            Event::TrackingStarted {
                tracked_tabs: snapshot.tracked_tab_ids.len(),
                at: Utc::now(),
            }
        } else {
            Event::TrackingStopped {
                seconds_used: self.state.seconds_used(),
                at: Utc::now(),
            }
        };
        // the very first verdict only sets the indicator
        if previous.is_some() || active {
            self.emit(event);
        }
    }

    async fn accumulate(&mut self, settings: &Settings) {
        let seconds_used = self.state.accumulate_one_second();
        let thresholds = Thresholds::for_mode(settings, self.state.break_mode());

        if thresholds.warning_due(seconds_used, self.warned) {
            self.warned = true;
            if let Err(e) = self.warning.play_warning().await {
                tracing::warn!(error = %e, "failed to play warning");
            }
            tracing::info!(seconds_used, budget = thresholds.budget_seconds, "budget warning");
            self.emit(Event::WarningIssued {
                seconds_used,
                budget_seconds: thresholds.budget_seconds,
                at: Utc::now(),
            });
        }

        if thresholds.is_expired(seconds_used) {
            tracing::info!(seconds_used, budget = thresholds.budget_seconds, "budget exhausted");
            let report =
                enforcement::enforce(self.browser.as_ref(), settings, self.options.sweep_delay)
                    .await;
            let forfeited = self.reset_cycle();
            self.emit(Event::BudgetExpired {
                seconds_used,
                budget_seconds: thresholds.budget_seconds,
                report,
                at: Utc::now(),
            });
            self.emit(Event::TimerReset {
                reason: ResetReason::Enforcement,
                forfeited_secs: forfeited,
                at: Utc::now(),
            });
        }
    }
}
