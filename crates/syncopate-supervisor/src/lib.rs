// SPDX-License-Identifier: GPL-3.0-or-later

//! The supervisor: scheduling, execution, hot reload, and the IPC control
//! plane for syncopate's sync jobs.
//!
//! One worker drains the ready queue, so at most one sync runs at any
//! instant; fires that land while a job is busy coalesce into a single
//! follow-up fire. Configuration changes are watched and diffed into
//! add/update/remove events without restarting the process.

pub mod cron;
pub mod executor;
pub mod ipc_server;
pub mod reload;
pub mod scheduler;
pub mod shared_cache;
pub mod supervisor;
pub mod trigger;

use std::path::PathBuf;

use thiserror::Error;

pub use executor::{execute_fire, FireReport};
pub use scheduler::{FireHandler, Scheduler};
pub use shared_cache::SharedCacheManager;
pub use supervisor::Supervisor;
pub use trigger::{resolve_timezone, Trigger};

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("invalid schedule for sync '{id}': {reason}")]
    ScheduleInvalid { id: String, reason: String },

    #[error("invalid cron expression: {0}")]
    CronInvalid(String),

    #[error(transparent)]
    Config(#[from] syncopate_config::ConfigError),

    #[error(transparent)]
    State(#[from] syncopate_state::StateError),

    #[error("failed to bind IPC socket {path}: {source}")]
    IpcBind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("filesystem watcher failed: {0}")]
    Watcher(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
