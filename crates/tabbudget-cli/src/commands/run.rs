use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tabbudget_core::{runtime, ConfigFile, Database, SystemClock, UsageEngine};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::host_file::{FileBrowser, TerminalBell};

#[derive(Args)]
pub struct RunArgs {
    /// JSON tab file, re-read and rewritten on every browser call
    #[arg(long)]
    pub tabs: PathBuf,
}

/// Line commands accepted on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineCommand {
    Status,
    Reset,
    Pause,
    Mode,
    Close,
    Quit,
}

impl LineCommand {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "status" => Some(Self::Status),
            "reset" => Some(Self::Reset),
            "pause" => Some(Self::Pause),
            "mode" => Some(Self::Mode),
            "close" => Some(Self::Close),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::default_location()?;
    let db = Database::open()?;
    let browser = Arc::new(FileBrowser::new(&args.tabs));
    let engine = UsageEngine::new(
        browser,
        Arc::new(TerminalBell),
        Box::new(config),
        Box::new(SystemClock),
        Box::new(db),
    );

    let (handle, task) = runtime::spawn(engine);

    let mut events = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "failed to encode event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event output fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = LineCommand::parse(&line) else {
            eprintln!("unknown command: {} (status|reset|pause|mode|close|quit)", line.trim());
            continue;
        };
        match command {
            LineCommand::Status => {
                println!("{}", serde_json::to_string(&handle.status().await)?);
            }
            LineCommand::Reset => handle.reset_timer().await?,
            LineCommand::Pause => {
                let paused = handle.toggle_pause().await?;
                println!("{}", serde_json::json!({ "paused": paused }));
            }
            LineCommand::Mode => {
                let break_mode = handle.toggle_mode().await?;
                println!("{}", serde_json::json!({ "breakMode": break_mode }));
            }
            LineCommand::Close => {
                let closed = handle.close_enforced_tabs().await?;
                println!("{}", serde_json::json!({ "closed": closed }));
            }
            LineCommand::Quit => break,
        }
    }

    handle.shutdown().await;
    drop(handle);
    let engine = task.await?;
    // the runtime dropped its sender, so the printer sees Closed
    printer.await?;
    tracing::info!(seconds_used = engine.seconds_used(), "stopped");
    Ok(())
}
