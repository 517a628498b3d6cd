use clap::Subcommand;
use tabbudget_core::{ConfigFile, Settings};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "work_limit_minutes", "enforcement.action")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value; lists and tables are given as JSON
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let file = ConfigFile::default_location()?;
    match action {
        ConfigAction::Get { key } => {
            let settings = file.load()?;
            match settings.get(&key) {
                Some(value) => println!("{value}"),
                None => {
                    eprintln!("unknown key: {key}");
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut settings = file.load()?;
            settings.set(&key, &value)?;
            file.save(&settings)?;
            println!("ok");
        }
        ConfigAction::List => {
            let settings = file.load()?;
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{json}");
        }
        ConfigAction::Reset => {
            file.save(&Settings::default())?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
