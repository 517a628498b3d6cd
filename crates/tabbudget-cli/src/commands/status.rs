use chrono::Local;
use serde::Serialize;
use tabbudget_core::state::{read_or_default, BREAK_MODE_KEY, PAUSED_KEY, TIMER_KEY};
use tabbudget_core::{ConfigFile, Database, SharedTimerState, Thresholds};

/// Offline view of the persisted state. Nothing is written.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OfflineStatus {
    elapsed_sec: u64,
    limit_sec: u64,
    break_mode: bool,
    paused: bool,
    /// Counter belongs to an earlier day and will be reset on the next tick.
    stale: bool,
    timer: SharedTimerState,
    tracked_sites: Vec<String>,
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = ConfigFile::default_location()?.load_or_default();
    let db = Database::open()?;

    let timer: SharedTimerState = read_or_default(&db, TIMER_KEY);
    let break_mode: bool = read_or_default(&db, BREAK_MODE_KEY);
    let paused: bool = read_or_default(&db, PAUSED_KEY);
    let stale = timer.last_reset_day != Some(Local::now().date_naive());

    let status = OfflineStatus {
        elapsed_sec: if stale { 0 } else { timer.seconds_used },
        limit_sec: Thresholds::for_mode(&settings, break_mode).budget_seconds,
        break_mode,
        paused,
        stale,
        timer,
        tracked_sites: settings.tracked_sites,
    };
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
