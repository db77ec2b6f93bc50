// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use syncopate_config::{ConfigPaths, GlobalConfig};
use syncopate_spotify::{SharedPlaylistCache, SpotifyService};
use syncopate_state::SyncState;

/// Runtime context handed to a module for the duration of one fire.
///
/// The context is the module's only I/O handle: Spotify goes through
/// `spotify`, persistence through `state`. Modules borrow it for the scope
/// of `run` and must not stash references.
pub struct SyncContext<'a> {
    pub spotify: &'a SpotifyService,
    pub state: &'a mut SyncState,
    pub global: &'a GlobalConfig,
    pub paths: &'a ConfigPaths,
    pub shared_cache: Option<Arc<SharedPlaylistCache>>,
}
