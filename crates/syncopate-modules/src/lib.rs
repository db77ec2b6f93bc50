// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync modules: the pluggable behaviors the supervisor schedules.
//!
//! A module validates its options at construction, runs once per fire
//! against the [`SyncContext`] it is handed, and reports a typed
//! [`RunOutcome`] the supervisor folds into the run history. Real failures
//! travel as [`ModuleError`]; a Spotify rate limit is an outcome, never an
//! error.

pub mod context;
pub mod lastfm;
pub mod mirror;
pub mod module;
pub mod outcome;
pub mod playlist_cache;
pub mod presentation;
pub mod registry;
pub mod resolver;
pub mod retention;

use thiserror::Error;

pub use context::SyncContext;
pub use module::SyncModule;
pub use outcome::RunOutcome;
pub use registry::{default_registry, ModuleRegistry};
pub use resolver::{PlaylistResolver, ResolverKind};

pub type Result<T> = std::result::Result<T, ModuleError>;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("unknown sync type: {0}")]
    UnknownType(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("playlist resolution failed: {0}")]
    PlaylistResolution(String),

    #[error(transparent)]
    Spotify(#[from] syncopate_spotify::SpotifyError),

    #[error(transparent)]
    State(#[from] syncopate_state::StateError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to read asset {path}: {source}")]
    AssetRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),
}
