//! Background driver for [`UsageEngine`].
//!
//! A single task owns the engine and multiplexes three sources: the 1 Hz
//! ticker, commands from [`EngineHandle`]s, and a timer armed for the
//! next local midnight. Every branch awaits to completion before the
//! loop polls again, so ticks never overlap and commands always observe
//! a finished tick. Events are fanned out on a broadcast channel.

use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

use crate::clock::next_local_midnight;
use crate::engine::{Status, UsageEngine};
use crate::error::{CoreError, Result};
use crate::events::Event;

/// Interval between evaluation cycles.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

enum Command {
    Status(oneshot::Sender<Status>),
    ResetTimer(oneshot::Sender<()>),
    TogglePause(oneshot::Sender<bool>),
    ToggleMode(oneshot::Sender<bool>),
    CloseEnforcedTabs(oneshot::Sender<usize>),
    Shutdown,
}

/// Cloneable front end to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<Event>,
}

/// Move `engine` onto its own task. The join handle yields the engine
/// back once every handle is dropped or [`EngineHandle::shutdown`] is
/// called.
pub fn spawn(engine: UsageEngine) -> (EngineHandle, JoinHandle<UsageEngine>) {
    spawn_with_wakeup(engine, next_midnight)
}

/// Like [`spawn`], with `wake_at` deciding when the next day-boundary
/// check is due.
fn spawn_with_wakeup(
    engine: UsageEngine,
    wake_at: fn() -> Instant,
) -> (EngineHandle, JoinHandle<UsageEngine>) {
    let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
    let (events, _) = broadcast::channel(EVENT_BUFFER);
    let task = tokio::spawn(run(engine, rx, events.clone(), wake_at));
    (EngineHandle { commands, events }, task)
}

impl EngineHandle {
    /// Current status, or [`Status::degraded`] if the engine is gone.
    pub async fn status(&self) -> Status {
        self.request(Command::Status)
            .await
            .unwrap_or_else(|_| Status::degraded())
    }

    pub async fn reset_timer(&self) -> Result<()> {
        self.request(Command::ResetTimer).await
    }

    pub async fn toggle_pause(&self) -> Result<bool> {
        self.request(Command::TogglePause).await
    }

    pub async fn toggle_mode(&self) -> Result<bool> {
        self.request(Command::ToggleMode).await
    }

    pub async fn close_enforced_tabs(&self) -> Result<usize> {
        self.request(Command::CloseEnforcedTabs).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Ask the engine task to stop after the current cycle.
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_err() {
            tracing::debug!("engine already stopped");
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| CoreError::EngineStopped)?;
        rx.await.map_err(|_| CoreError::EngineStopped)
    }
}

fn next_midnight() -> Instant {
    midnight_deadline(&Local::now(), Instant::now())
}

/// Instant of the first local midnight after `now`, measured from `base`
/// (the runtime's reading of the same moment).
fn midnight_deadline<Tz: TimeZone>(now: &DateTime<Tz>, base: Instant) -> Instant {
    let wait = (next_local_midnight(now) - now.clone())
        .to_std()
        .unwrap_or(TICK_PERIOD);
    base + wait
}

async fn run(
    mut engine: UsageEngine,
    mut commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<Event>,
    wake_at: fn() -> Instant,
) -> UsageEngine {
    let mut ticker = interval(TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let midnight = sleep_until(wake_at());
    tokio::pin!(midnight);

    tracing::info!("usage engine started");
    loop {
        // a due tick or day boundary always wins over queued commands
        tokio::select! {
            biased;
            _ = &mut midnight => {
                engine.daily_check();
                midnight.as_mut().reset(wake_at());
            }
            _ = ticker.tick() => {
                for event in engine.tick().await {
                    publish(&events, event);
                }
            }
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => handle(&mut engine, command).await,
            },
        }
        for event in engine.take_events() {
            publish(&events, event);
        }
    }
    tracing::info!(seconds_used = engine.seconds_used(), "usage engine stopped");
    engine
}

async fn handle(engine: &mut UsageEngine, command: Command) {
    // a dropped reply channel only means the caller stopped waiting
    match command {
        Command::Status(reply) => {
            let _ = reply.send(engine.status().await);
        }
        Command::ResetTimer(reply) => {
            engine.reset_timer();
            let _ = reply.send(());
        }
        Command::TogglePause(reply) => {
            let _ = reply.send(engine.toggle_pause());
        }
        Command::ToggleMode(reply) => {
            let _ = reply.send(engine.toggle_mode());
        }
        Command::CloseEnforcedTabs(reply) => {
            let _ = reply.send(engine.close_enforced_tabs().await);
        }
        Command::Shutdown => {}
    }
}

fn publish(events: &broadcast::Sender<Event>, event: Event) {
    tracing::debug!(kind = event.kind(), "engine event");
    // no subscribers is fine
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::EngineOptions;
    use crate::host::{BrowserModel, MemoryBrowser};
    use crate::settings::Settings;
    use crate::storage::MemoryStore;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn engine(browser: &Arc<MemoryBrowser>) -> UsageEngine {
        engine_with_clock(browser, ManualClock::new(day(1)))
    }

    fn engine_with_clock(browser: &Arc<MemoryBrowser>, clock: ManualClock) -> UsageEngine {
        UsageEngine::new(
            browser.clone(),
            browser.clone(),
            Box::new(Settings::default()),
            Box::new(clock),
            Box::new(MemoryStore::new()),
        )
        .with_options(EngineOptions {
            sweep_delay: Duration::ZERO,
            ..EngineOptions::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_second() {
        let browser = Arc::new(MemoryBrowser::new(BrowserModel::with_urls(["https://reddit.com"])));
        let (handle, task) = spawn(engine(&browser));

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        let status = handle.status().await;
        assert_eq!(status.elapsed_sec, 5);
        assert!(status.is_tracked);

        handle.shutdown().await;
        let engine = task.await.unwrap();
        assert_eq!(engine.seconds_used(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_applied_between_ticks() {
        let browser = Arc::new(MemoryBrowser::new(BrowserModel::with_urls(["https://reddit.com"])));
        let (handle, _task) = spawn(engine(&browser));
        let mut events = handle.subscribe();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(handle.toggle_pause().await.unwrap());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(handle.status().await.elapsed_sec, 3);

        handle.reset_timer().await.unwrap();
        assert_eq!(handle.status().await.elapsed_sec, 0);

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.kind());
        }
        assert!(kinds.contains(&"PauseToggled"));
        assert!(kinds.contains(&"TimerReset"));
    }

    #[tokio::test(start_paused = true)]
    async fn due_tick_runs_before_queued_commands() {
        let browser = Arc::new(MemoryBrowser::new(BrowserModel::with_urls(["https://reddit.com"])));
        let (handle, _task) = spawn(engine(&browser));

        // queued before the engine task first runs, alongside the first tick
        let (tx, rx) = oneshot::channel();
        assert!(handle.commands.send(Command::Status(tx)).await.is_ok());
        let status = rx.await.unwrap();
        assert_eq!(status.elapsed_sec, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn day_boundary_wakeup_resets_between_ticks() {
        let browser = Arc::new(MemoryBrowser::new(BrowserModel::with_urls(["https://reddit.com"])));
        let clock = ManualClock::new(day(1));
        let (handle, _task) = spawn_with_wakeup(engine_with_clock(&browser, clock.clone()), || {
            Instant::now() + Duration::from_millis(500)
        });
        let mut events = handle.subscribe();

        // first tick at t=0 counts one second on day 1
        tokio::time::sleep(Duration::from_millis(100)).await;
        clock.set(day(2));
        // past the wake-up, before the tick at t=1s
        tokio::time::sleep(Duration::from_millis(600)).await;

        let mut resets = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let Event::DailyReset {
                day,
                forfeited_secs,
                ..
            } = event
            {
                resets.push((day, forfeited_secs));
            }
        }
        assert_eq!(resets, vec![(day(1), 0), (day(2), 1)]);
        assert_eq!(handle.status().await.elapsed_sec, 0);
    }

    #[test]
    fn midnight_deadline_counts_down_to_next_day() {
        use chrono::Utc;

        let base = Instant::now();
        let evening = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 30).unwrap();
        assert_eq!(midnight_deadline(&evening, base), base + Duration::from_secs(30));

        let at_midnight = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(
            midnight_deadline(&at_midnight, base),
            base + Duration::from_secs(86_400)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_engine_degrades() {
        let browser = Arc::new(MemoryBrowser::new(BrowserModel::default()));
        let (handle, task) = spawn(engine(&browser));
        handle.shutdown().await;
        task.await.unwrap();

        assert_eq!(handle.status().await, Status::degraded());
        assert!(matches!(
            handle.toggle_mode().await,
            Err(CoreError::EngineStopped)
        ));
    }
}
