// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration layout and loaders for syncopate.
//!
//! Everything lives under a single base directory (default `~/.syncopate`):
//! the global `config.yml`, one YAML file per sync under `syncs/`, persisted
//! state under `state/`, and the asset/template library.

pub mod bootstrap;
pub mod global;
pub mod paths;
pub mod schedule;
pub mod sync;

use std::path::PathBuf;

use thiserror::Error;

pub use bootstrap::{bootstrap, BootstrapReport};
pub use global::{
    load_global_config, GlobalConfig, LastFmSettings, RetryPolicy, RuntimeSettings,
    SpotifySettings, SupervisorSettings,
};
pub use paths::ConfigPaths;
pub use schedule::parse_interval;
pub use sync::{
    iter_sync_config_paths, load_sync_config_file, load_sync_configs, SyncConfig, SyncSchedule,
};

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] figment::Error),

    #[error("sync schedule must define exactly one of 'interval' or 'cron'")]
    ScheduleInvalid,

    #[error("invalid interval expression: {0}")]
    IntervalInvalid(String),

    #[error("duplicate sync id: {0}")]
    DuplicateSyncId(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("could not determine home directory")]
    NoHomeDir,
}
