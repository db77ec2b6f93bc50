// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

use syncopate_spotify::{format_pattern, SpotifyService};

use crate::{ModuleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    SavedTracks,
    PlaylistId,
    PlaylistName,
    PlaylistPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDirection {
    #[default]
    Oldest,
    Newest,
}

impl From<ScanDirection> for syncopate_spotify::service::ScanDirection {
    fn from(direction: ScanDirection) -> Self {
        match direction {
            ScanDirection::Oldest => Self::Oldest,
            ScanDirection::Newest => Self::Newest,
        }
    }
}

/// Declarative reference to a playlist (or the saved-tracks library), shared
/// by every module that names a source or target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistResolver {
    pub kind: ResolverKind,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "id")]
    pub playlist_id: Option<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_tracks: Option<usize>,
    #[serde(default)]
    pub lookback_count: Option<usize>,
    #[serde(default)]
    pub lookback_days: Option<i64>,
    #[serde(default)]
    pub full_scan: bool,
    #[serde(default)]
    pub scan_direction: ScanDirection,
}

impl PlaylistResolver {
    /// Resolve to a playlist id without creating anything: ids pass through,
    /// names must exist, patterns ensure-create.
    pub async fn resolve_existing(&self, service: &SpotifyService) -> Result<String> {
        match self.kind {
            ResolverKind::PlaylistId => self.require_id(),
            ResolverKind::PlaylistName => {
                let name = self.require_name()?;
                let playlist = service.find_playlist_by_name(name).await?;
                playlist.map(|p| p.id).ok_or_else(|| {
                    ModuleError::PlaylistResolution(format!("playlist '{name}' not found"))
                })
            }
            ResolverKind::PlaylistPattern => self.resolve_pattern(service).await,
            ResolverKind::SavedTracks => Err(ModuleError::PlaylistResolution(
                "saved_tracks cannot be used here".to_string(),
            )),
        }
    }

    /// Resolve to a playlist id, creating named or pattern targets that do
    /// not exist yet.
    pub async fn resolve_or_create(&self, service: &SpotifyService) -> Result<String> {
        match self.kind {
            ResolverKind::PlaylistId => self.require_id(),
            ResolverKind::PlaylistName => {
                let name = self.require_name()?;
                let playlist = service
                    .ensure_playlist(name, self.public, self.description.as_deref())
                    .await?;
                Ok(playlist.id)
            }
            ResolverKind::PlaylistPattern => self.resolve_pattern(service).await,
            ResolverKind::SavedTracks => Err(ModuleError::PlaylistResolution(
                "saved_tracks cannot be used here".to_string(),
            )),
        }
    }

    async fn resolve_pattern(&self, service: &SpotifyService) -> Result<String> {
        let pattern = self.pattern.as_deref().ok_or_else(|| {
            ModuleError::PlaylistResolution("playlist_pattern requires 'pattern'".to_string())
        })?;
        let name = format_pattern(pattern);
        let playlist = service
            .ensure_playlist(&name, self.public, self.description.as_deref())
            .await?;
        Ok(playlist.id)
    }

    fn require_id(&self) -> Result<String> {
        self.playlist_id.clone().ok_or_else(|| {
            ModuleError::PlaylistResolution("playlist_id requires 'id'".to_string())
        })
    }

    fn require_name(&self) -> Result<&str> {
        self.name.as_deref().ok_or_else(|| {
            ModuleError::PlaylistResolution("playlist_name requires 'name'".to_string())
        })
    }
}

/// Deserialize a module's options value, mapping failures to
/// [`ModuleError::InvalidOptions`].
pub fn parse_options<T: serde::de::DeserializeOwned>(options: &serde_json::Value) -> Result<T> {
    serde_json::from_value(options.clone())
        .map_err(|e| ModuleError::InvalidOptions(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_kinds_deserialize_from_snake_case() {
        let resolver: PlaylistResolver = serde_json::from_value(serde_json::json!({
            "kind": "playlist_name",
            "name": "Liked 2026",
            "public": true,
        }))
        .unwrap();
        assert_eq!(resolver.kind, ResolverKind::PlaylistName);
        assert!(resolver.public);
        assert_eq!(resolver.scan_direction, ScanDirection::Oldest);
    }

    #[test]
    fn missing_fields_surface_as_resolution_errors() {
        let resolver: PlaylistResolver =
            serde_json::from_value(serde_json::json!({"kind": "playlist_id"})).unwrap();
        assert!(matches!(
            resolver.require_id().unwrap_err(),
            ModuleError::PlaylistResolution(_)
        ));
    }
}
