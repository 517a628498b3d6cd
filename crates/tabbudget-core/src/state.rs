//! Durable engine state: the shared usage counter, the work/break mode
//! and the pause flag.
//!
//! [`UsageState`] owns its [`KvStore`] and writes through after every
//! mutation. A failed write is logged and the in-memory value is kept,
//! so the next successful write catches the store up.

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::storage::KvStore;

pub const TIMER_KEY: &str = "sharedTimerState";
pub const BREAK_MODE_KEY: &str = "breakMode";
pub const PAUSED_KEY: &str = "timerPaused";

/// Seconds of tracked usage in the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedTimerState {
    #[serde(default)]
    pub seconds_used: u64,
    #[serde(default)]
    pub last_reset_day: Option<NaiveDate>,
}

/// Timer, mode and pause flag, persisted together.
pub struct UsageState {
    store: Box<dyn KvStore>,
    timer: SharedTimerState,
    break_mode: bool,
    paused: bool,
}

impl std::fmt::Debug for UsageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageState")
            .field("timer", &self.timer)
            .field("break_mode", &self.break_mode)
            .field("paused", &self.paused)
            .finish()
    }
}

impl UsageState {
    /// Restore the last persisted values. Anything missing or unreadable
    /// starts from `{0, unset}`, work mode, not paused.
    pub fn load(store: Box<dyn KvStore>) -> Self {
        let timer: SharedTimerState = read_or_default(store.as_ref(), TIMER_KEY);
        let break_mode: bool = read_or_default(store.as_ref(), BREAK_MODE_KEY);
        let paused: bool = read_or_default(store.as_ref(), PAUSED_KEY);
        tracing::debug!(
            seconds_used = timer.seconds_used,
            break_mode,
            paused,
            "loaded usage state"
        );
        Self {
            store,
            timer,
            break_mode,
            paused,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn timer(&self) -> SharedTimerState {
        self.timer
    }

    pub fn seconds_used(&self) -> u64 {
        self.timer.seconds_used
    }

    pub fn break_mode(&self) -> bool {
        self.break_mode
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// The only mutation on the normal tick path.
    pub fn accumulate_one_second(&mut self) -> u64 {
        self.timer.seconds_used = self.timer.seconds_used.saturating_add(1);
        self.persist_timer();
        self.timer.seconds_used
    }

    /// Zero the counter. Returns the value that was forfeited.
    pub fn reset(&mut self) -> u64 {
        let forfeited = self.timer.seconds_used;
        self.timer.seconds_used = 0;
        self.persist_timer();
        forfeited
    }

    /// Reset the counter if `today` differs from the last reset day.
    /// Returns `true` when a rollover happened.
    pub fn roll_over_if_new_day(&mut self, today: NaiveDate) -> bool {
        if self.timer.last_reset_day == Some(today) {
            return false;
        }
        self.timer.seconds_used = 0;
        self.timer.last_reset_day = Some(today);
        self.persist_timer();
        true
    }

    /// Flip work/break and reset the counter in the same step.
    /// Returns the new mode (`true` = break).
    pub fn toggle_mode(&mut self) -> bool {
        self.break_mode = !self.break_mode;
        self.persist(BREAK_MODE_KEY, &self.break_mode);
        self.reset();
        self.break_mode
    }

    /// Flip the pause flag. The counter is left untouched.
    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.persist(PAUSED_KEY, &self.paused);
        self.paused
    }

    fn persist_timer(&self) {
        self.persist(TIMER_KEY, &self.timer);
    }

    fn persist<T: Serialize>(&self, key: &str, value: &T) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to encode state");
                return;
            }
        };
        if let Err(e) = self.store.set(key, &encoded) {
            tracing::warn!(key, error = %e, "failed to persist state");
        }
    }
}

/// Read a persisted value the way an observer would: missing or
/// malformed values come back as the default.
pub fn read_or_default<T: DeserializeOwned + Default>(store: &dyn KvStore, key: &str) -> T {
    match store.get(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "discarding malformed persisted value");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read persisted value");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn load_defaults_when_empty() {
        let state = UsageState::load(Box::new(MemoryStore::new()));
        assert_eq!(state.timer(), SharedTimerState::default());
        assert!(!state.break_mode());
        assert!(!state.paused());
    }

    #[test]
    fn every_mutation_is_written_through() {
        let store = Arc::new(MemoryStore::new());
        let mut state = UsageState::load(Box::new(store.clone()));
        state.roll_over_if_new_day(day(1));
        state.accumulate_one_second();
        state.accumulate_one_second();
        state.toggle_pause();

        let timer: SharedTimerState = read_or_default(store.as_ref(), TIMER_KEY);
        assert_eq!(timer.seconds_used, 2);
        assert_eq!(timer.last_reset_day, Some(day(1)));
        assert!(read_or_default::<bool>(store.as_ref(), PAUSED_KEY));

        let reloaded = UsageState::load(Box::new(store));
        assert_eq!(reloaded.seconds_used(), 2);
        assert!(reloaded.paused());
    }

    #[test]
    fn persisted_timer_uses_camel_case_keys() {
        let store = Arc::new(MemoryStore::new());
        let mut state = UsageState::load(Box::new(store.clone()));
        state.roll_over_if_new_day(day(1));
        let raw = store.get(TIMER_KEY).unwrap().unwrap();
        assert_eq!(raw, r#"{"secondsUsed":0,"lastResetDay":"2024-01-01"}"#);
    }

    #[test]
    fn rollover_only_on_new_day() {
        let mut state = UsageState::load(Box::new(MemoryStore::new()));
        assert!(state.roll_over_if_new_day(day(1)));
        state.accumulate_one_second();
        assert!(!state.roll_over_if_new_day(day(1)));
        assert_eq!(state.seconds_used(), 1);
        assert!(state.roll_over_if_new_day(day(2)));
        assert_eq!(state.seconds_used(), 0);
    }

    #[test]
    fn toggle_mode_resets_and_pause_does_not() {
        let mut state = UsageState::load(Box::new(MemoryStore::new()));
        for _ in 0..100 {
            state.accumulate_one_second();
        }
        assert!(state.toggle_pause());
        assert_eq!(state.seconds_used(), 100);
        assert!(!state.toggle_pause());
        assert_eq!(state.seconds_used(), 100);

        assert!(state.toggle_mode());
        assert_eq!(state.seconds_used(), 0);
        assert!(!state.toggle_mode());
    }

    #[test]
    fn load_restores_raw_persisted_values() {
        let store = MemoryStore::new();
        store
            .set(TIMER_KEY, r#"{"secondsUsed":200,"lastResetDay":"2024-01-01"}"#)
            .unwrap();
        store.set(PAUSED_KEY, "true").unwrap();
        let state = UsageState::load(Box::new(store));
        assert_eq!(state.seconds_used(), 200);
        assert_eq!(state.timer().last_reset_day, Some(day(1)));
        assert!(state.paused());
        assert!(!state.break_mode());
    }

    #[test]
    fn malformed_values_load_as_defaults() {
        let store = MemoryStore::new();
        store.set(TIMER_KEY, "{not json").unwrap();
        store.set(BREAK_MODE_KEY, "true").unwrap();
        let state = UsageState::load(Box::new(store));
        assert_eq!(state.seconds_used(), 0);
        assert!(state.break_mode());
    }

    #[test]
    fn write_failures_keep_memory_state() {
        let mut state = UsageState::load(Box::new(MemoryStore::read_only()));
        state.accumulate_one_second();
        assert_eq!(state.seconds_used(), 1);
        assert_eq!(state.reset(), 1);
    }
}
