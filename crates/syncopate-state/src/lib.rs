// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent per-sync state.
//!
//! Each sync owns one JSON document on disk holding cursors, a bounded run
//! history, and free-form module scratch. The document is duck-typed: well
//! known keys get accessors, everything else is preserved verbatim across
//! load/save so modules can extend the schema without migrations.

mod record;
mod store;

use std::path::PathBuf;

use thiserror::Error;

pub use record::{RunRecord, RunStatus};
pub use store::{state_path_for_sync, SyncState, RUN_HISTORY_LIMIT, STATE_VERSION};

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to access state file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
