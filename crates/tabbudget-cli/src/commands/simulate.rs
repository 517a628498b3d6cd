use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tabbudget_core::storage::KvStore;
use tabbudget_core::{
    ConfigFile, Database, EngineOptions, MemoryBrowser, MemoryStore, SystemClock, UsageEngine,
};

use crate::host_file::load_model;

#[derive(Args)]
pub struct SimulateArgs {
    /// JSON tab file (a serialized BrowserModel)
    #[arg(long)]
    pub tabs: PathBuf,
    /// Number of one-second ticks to run
    #[arg(long, default_value = "60")]
    pub ticks: u64,
    /// Read and write the real state database instead of a scratch store
    #[arg(long)]
    pub persist: bool,
    /// Write the resulting tabs back to the tab file
    #[arg(long)]
    pub write_back: bool,
}

/// Print every event as a JSON line, then the final status.
pub async fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model = load_model(&args.tabs)?;
    let settings = ConfigFile::default_location()?.load_or_default();
    let store: Box<dyn KvStore> = if args.persist {
        Box::new(Database::open()?)
    } else {
        Box::new(MemoryStore::new())
    };

    let browser = Arc::new(MemoryBrowser::new(model));
    let mut engine = UsageEngine::new(
        browser.clone(),
        browser.clone(),
        Box::new(settings),
        Box::new(SystemClock),
        store,
    )
    .with_options(EngineOptions {
        sweep_delay: Duration::ZERO,
        ..EngineOptions::default()
    });

    tracing::debug!(ticks = args.ticks, tabs = %args.tabs.display(), "simulating");
    for _ in 0..args.ticks {
        for event in engine.tick().await {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    println!("{}", serde_json::to_string(&engine.status().await)?);

    if args.write_back {
        std::fs::write(&args.tabs, serde_json::to_string_pretty(&browser.model())?)?;
    }
    Ok(())
}
