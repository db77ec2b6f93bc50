// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::BTreeMap;

use syncopate_config::SyncConfig;
use tracing::debug;

use crate::lastfm::LastFmTopTracksModule;
use crate::mirror::PlaylistMirrorModule;
use crate::module::SyncModule;
use crate::playlist_cache::PlaylistCacheModule;
use crate::presentation::PlaylistPresentationModule;
use crate::retention::PlaylistRetentionModule;
use crate::{ModuleError, Result};

type ModuleFactory = fn(&SyncConfig) -> Result<Box<dyn SyncModule>>;

/// Maps a declared sync `type` to its module factory.
///
/// Built once at startup and never mutated afterwards; the supervisor holds
/// it for the lifetime of the process.
pub struct ModuleRegistry {
    factories: BTreeMap<&'static str, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, kind: &'static str, factory: ModuleFactory) {
        debug!(target: "modules", kind, "module registered");
        self.factories.insert(kind, factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Known type names, for diagnostics.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Instantiate the module for a sync, validating its options.
    pub fn create(&self, sync: &SyncConfig) -> Result<Box<dyn SyncModule>> {
        let factory = self
            .factories
            .get(sync.kind.as_str())
            .ok_or_else(|| ModuleError::UnknownType(sync.kind.clone()))?;
        factory(sync)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry with all built-in modules.
pub fn default_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register("playlist_mirror", |sync| {
        Ok(Box::new(PlaylistMirrorModule::new(sync)?))
    });
    registry.register("playlist_retention", |sync| {
        Ok(Box::new(PlaylistRetentionModule::new(sync)?))
    });
    registry.register("playlist_cache", |sync| {
        Ok(Box::new(PlaylistCacheModule::new(sync)?))
    });
    registry.register("playlist_presentation", |sync| {
        Ok(Box::new(PlaylistPresentationModule::new(sync)?))
    });
    registry.register("lastfm_top_tracks", |sync| {
        Ok(Box::new(LastFmTopTracksModule::new(sync)?))
    });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync(kind: &str, options: serde_json::Value) -> SyncConfig {
        serde_json::from_value(serde_json::json!({
            "id": "test",
            "type": kind,
            "schedule": {"interval": "5m"},
            "options": options,
        }))
        .unwrap()
    }

    #[test]
    fn default_registry_knows_all_builtins() {
        let registry = default_registry();
        for kind in [
            "playlist_mirror",
            "playlist_retention",
            "playlist_cache",
            "playlist_presentation",
            "lastfm_top_tracks",
        ] {
            assert!(registry.contains(kind), "missing {kind}");
        }
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn unknown_type_is_reported() {
        let registry = default_registry();
        let err = registry.create(&sync("nope", serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, ModuleError::UnknownType(kind) if kind == "nope"));
    }

    #[test]
    fn invalid_options_fail_at_construction() {
        let registry = default_registry();
        // mirror requires a source resolver
        let err = registry
            .create(&sync("playlist_mirror", serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(err, ModuleError::InvalidOptions(_)));
    }

    #[test]
    fn playlist_cache_accepts_empty_options() {
        let registry = default_registry();
        assert!(registry.create(&sync("playlist_cache", serde_json::json!({}))).is_ok());
    }
}
