/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! `repin` admin tool: inspect and edit the desired pin set in a file store.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use bpaf::Bpaf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use repin::config::{ConfigError, RepinConfig, default_config_path};
use repin::persistence::{
    DESIRED_SET_KEY, DesiredPinSet, FilePinStore, PinSetWriter, PinStore, Settings, StoreError,
};

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
/// Manage the ordered set of pinned pages kept alive by repin
struct Options {
    /// Configuration file, defaults to the user config directory
    #[bpaf(long, argument("PATH"))]
    config: Option<PathBuf>,
    /// Store file, overrides `store_path` from the configuration
    #[bpaf(long, argument("PATH"))]
    store: Option<PathBuf>,
    #[bpaf(external(command))]
    command: Command,
}

#[derive(Debug, Clone, Bpaf)]
enum Command {
    /// Print the desired set in rank order
    #[bpaf(command("list"))]
    List {
        /// Print the stored JSON object instead of a table
        #[bpaf(long)]
        json: bool,
    },
    /// Drop a URL from the desired set and close the rank gap
    #[bpaf(command("remove"))]
    Remove {
        #[bpaf(positional("URL"))]
        url: String,
    },
    /// Track manual pin, unpin and reorder in the desired set
    #[bpaf(command("auto-track"))]
    AutoTrack {
        #[bpaf(positional("on|off"))]
        state: Toggle,
    },
    /// Print the effective configuration
    #[bpaf(command("config"))]
    Config {
        /// Print only the configuration file path
        #[bpaf(long)]
        path: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Toggle(bool);

impl FromStr for Toggle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" => Ok(Self(true)),
            "off" | "false" | "no" => Ok(Self(false)),
            other => Err(format!("expected `on` or `off`, got `{other}`")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no store path configured and no data directory available")]
    NoStorePath,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let options = options().run();
    match run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("repin: {e}");
            eprintln!("repin: {e}");
            ExitCode::FAILURE
        },
    }
}

async fn run(options: Options) -> Result<(), CliError> {
    let config_path = options.config.clone().or_else(default_config_path);
    let config = match &config_path {
        Some(path) => RepinConfig::load(path)?,
        None => RepinConfig::default(),
    };
    init_logging(&config.log_filter);

    if let Command::Config { path } = &options.command {
        if *path {
            match &config_path {
                Some(config_path) => println!("{}", config_path.display()),
                None => println!("(no configuration directory)"),
            }
        } else {
            print!("{}", config.to_toml()?);
        }
        return Ok(());
    }

    let store_path = options
        .store
        .clone()
        .or_else(|| config.store_path())
        .ok_or(CliError::NoStorePath)?;
    log::debug!("repin: using store {}", store_path.display());
    let store = Arc::new(FilePinStore::new(store_path));

    match options.command {
        Command::List { json } => {
            // Strict read: an unreadable store is reported, not shown as empty.
            let desired = DesiredPinSet::from_value(store.get(DESIRED_SET_KEY).await?.as_ref());
            if json {
                println!("{:#}", desired.to_value());
            } else if desired.is_empty() {
                println!("(desired set is empty)");
            } else {
                for (url, rank) in desired.ranked() {
                    println!("{rank:>4}  {url}");
                }
            }
        },
        Command::Remove { url } => {
            let cancel = CancellationToken::new();
            let (writer, writer_task) =
                PinSetWriter::spawn(store.clone(), config.writer_queue_capacity, cancel.clone());
            let outcome = writer.remove(&url).await;
            cancel.cancel();
            if let Err(e) = writer_task.await {
                log::warn!("repin: writer task failed ({e})");
            }
            if outcome?.changed {
                println!("removed {url}");
            } else {
                println!("{url} is not in the desired set");
            }
        },
        Command::AutoTrack { state } => {
            Settings::save_auto_track(store.as_ref(), state.0).await?;
            println!("auto-track {}", if state.0 { "on" } else { "off" });
        },
        Command::Config { .. } => {},
    }
    Ok(())
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
