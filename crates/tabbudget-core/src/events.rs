use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::enforcement::EnforcementReport;

/// Why the usage counter was zeroed outside the daily rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    Manual,
    ModeSwitch,
    Enforcement,
}

/// Every state change in the engine produces an Event.
/// Presentation surfaces poll for status; subscribers receive these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// First tick of a new calendar day zeroed the counter.
    DailyReset {
        day: NaiveDate,
        forfeited_secs: u64,
        at: DateTime<Utc>,
    },
    /// A tracked tab is open; the counter advances from now on.
    TrackingStarted {
        tracked_tabs: usize,
        at: DateTime<Utc>,
    },
    /// No tracked tab is open any more. The counter is kept.
    TrackingStopped {
        seconds_used: u64,
        at: DateTime<Utc>,
    },
    WarningIssued {
        seconds_used: u64,
        budget_seconds: u64,
        at: DateTime<Utc>,
    },
    /// Budget exhausted; cookies evicted and tabs remediated.
    BudgetExpired {
        seconds_used: u64,
        budget_seconds: u64,
        report: EnforcementReport,
        at: DateTime<Utc>,
    },
    TimerReset {
        reason: ResetReason,
        forfeited_secs: u64,
        at: DateTime<Utc>,
    },
    ModeChanged {
        break_mode: bool,
        budget_seconds: u64,
        at: DateTime<Utc>,
    },
    PauseToggled {
        paused: bool,
        at: DateTime<Utc>,
    },
    EnforcedTabsClosed {
        closed_count: usize,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Tag used in logs and the CLI's line output.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::DailyReset { .. } => "DailyReset",
            Event::TrackingStarted { .. } => "TrackingStarted",
            Event::TrackingStopped { .. } => "TrackingStopped",
            Event::WarningIssued { .. } => "WarningIssued",
            Event::BudgetExpired { .. } => "BudgetExpired",
            Event::TimerReset { .. } => "TimerReset",
            Event::ModeChanged { .. } => "ModeChanged",
            Event::PauseToggled { .. } => "PauseToggled",
            Event::EnforcedTabsClosed { .. } => "EnforcedTabsClosed",
        }
    }
}
