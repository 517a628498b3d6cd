//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tabbudget_core::{
    BrowserModel, EngineOptions, EnforcementAction, Event, KvStore, ManualClock, MemoryBrowser,
    MemoryStore, Settings, UsageEngine,
};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Settings tracking only `reddit.com` with a budget given in seconds.
pub fn settings(budget_secs: f64, lead_secs: u64) -> Settings {
    Settings {
        work_limit_minutes: budget_secs / 60.0,
        break_limit_minutes: 10.0,
        warning_lead_seconds: lead_secs,
        tracked_sites: vec!["reddit.com".to_string()],
        enforcement: EnforcementAction::Redirect {
            url: "blocked.html".to_string(),
        },
    }
}

pub struct Fixture {
    pub browser: Arc<MemoryBrowser>,
    pub clock: ManualClock,
    pub engine: UsageEngine,
}

impl Fixture {
    pub fn new(model: BrowserModel, settings: Settings) -> Self {
        Self::with_store(model, settings, Box::new(MemoryStore::new()))
    }

    pub fn with_store(model: BrowserModel, settings: Settings, store: Box<dyn KvStore>) -> Self {
        let browser = Arc::new(MemoryBrowser::new(model));
        let clock = ManualClock::new(day(2024, 1, 1));
        let engine = UsageEngine::new(
            browser.clone(),
            browser.clone(),
            Box::new(settings),
            Box::new(clock.clone()),
            store,
        )
        .with_options(EngineOptions {
            sweep_delay: Duration::ZERO,
            ..EngineOptions::default()
        });
        Self {
            browser,
            clock,
            engine,
        }
    }

    /// Run `n` ticks and collect every event.
    pub async fn ticks(&mut self, n: usize) -> Vec<Event> {
        let mut events = Vec::new();
        for _ in 0..n {
            events.extend(self.engine.tick().await);
        }
        events
    }
}

pub fn count(events: &[Event], kind: &str) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}
