// SPDX-License-Identifier: GPL-3.0-or-later

mod commands;
mod track_id;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use syncopate_config::ConfigPaths;

#[derive(Parser)]
#[command(
    name = "syncopate",
    version,
    about = "Supervisor for declarative Spotify playlist syncs"
)]
struct Cli {
    /// Configuration directory (default: ~/.syncopate)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configuration directory and a starter config.yml
    Init {
        /// Rewrite config.yml even if it already exists
        #[arg(long)]
        force: bool,
    },
    /// Run the supervisor in the foreground
    Serve {
        /// Disable configuration hot reload
        #[arg(long)]
        no_hot_reload: bool,
    },
    /// List the sync definitions
    List,
    /// Execute a single sync once, outside the supervisor
    Run { sync_id: String },
    /// Show the supervisor's job table
    Status,
    /// Trigger an immediate fire of a sync
    Start { sync_id: String },
    /// Pause a sync's schedule
    Pause { sync_id: String },
    /// Resume a paused sync
    Resume { sync_id: String },
    /// Remove a sync's trigger from the scheduler
    Delete { sync_id: String },
    /// Check configuration, credentials, and supervisor reachability
    Doctor,
    /// Render the last run records of a sync
    Logs {
        sync_id: String,
        /// Number of records to show, newest last
        #[arg(long, default_value_t = 10)]
        tail: usize,
    },
    /// Inspect or edit persisted sync state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Serve the HTTP control plane
    Api {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:5160")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// Set (or clear, with '-') the last processed track cursor
    SetLastTrack { sync_id: String, track_id: String },
}

fn init_tracing(level: &str) {
    let fmt_layer = fmt::layer().with_target(true).with_level(true);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn resolve_paths(config_dir: Option<PathBuf>) -> anyhow::Result<ConfigPaths> {
    Ok(match config_dir {
        Some(dir) => ConfigPaths::from_base_dir(dir),
        None => ConfigPaths::default_locations()?,
    })
}

/// Default log level: CLI flag, then config.yml, then info.
fn default_log_level(paths: &ConfigPaths, override_level: Option<&str>) -> String {
    if let Some(level) = override_level {
        return level.to_string();
    }
    syncopate_config::load_global_config(paths)
        .map(|config| config.runtime.log_level)
        .unwrap_or_else(|_| "info".to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = match resolve_paths(cli.config_dir.clone()) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };
    init_tracing(&default_log_level(&paths, cli.log_level.as_deref()));

    let result = match cli.command {
        Commands::Init { force } => commands::init(&paths, force),
        Commands::Serve { no_hot_reload } => commands::serve(&paths, !no_hot_reload).await,
        Commands::List => commands::list(&paths),
        Commands::Run { sync_id } => commands::run_once(&paths, &sync_id).await,
        Commands::Status => commands::status(&paths).await,
        Commands::Start { sync_id } => {
            commands::supervisor_command(&paths, syncopate_ipc::Command::Start, &sync_id).await
        }
        Commands::Pause { sync_id } => {
            commands::supervisor_command(&paths, syncopate_ipc::Command::Pause, &sync_id).await
        }
        Commands::Resume { sync_id } => {
            commands::supervisor_command(&paths, syncopate_ipc::Command::Resume, &sync_id).await
        }
        Commands::Delete { sync_id } => {
            commands::supervisor_command(&paths, syncopate_ipc::Command::Delete, &sync_id).await
        }
        Commands::Doctor => commands::doctor(&paths).await,
        Commands::Logs { sync_id, tail } => commands::logs(&paths, &sync_id, tail),
        Commands::State {
            command: StateCommands::SetLastTrack { sync_id, track_id },
        } => commands::set_last_track(&paths, &sync_id, &track_id),
        Commands::Api { bind } => commands::serve_api(&paths, &bind).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
