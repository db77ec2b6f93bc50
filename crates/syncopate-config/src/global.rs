// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ConfigError, ConfigPaths, Result};

/// Placeholder written by `init`; credentials matching it are treated as unset.
pub const SPOTIFY_PLACEHOLDER: &str = "SET_ME";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_redirect_uri() -> String {
    "http://localhost:8888/callback".to_string()
}

impl SpotifySettings {
    /// True once both credential fields hold real values.
    pub fn is_configured(&self) -> bool {
        !(self.client_id.is_empty()
            || self.client_secret.is_empty()
            || self.client_id == SPOTIFY_PLACEHOLDER
            || self.client_secret == SPOTIFY_PLACEHOLDER)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LastFmSettings {
    pub api_key: String,
    pub api_secret: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_seconds: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_seconds: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeSettings {
    pub timezone: String,
    pub storage_dir: PathBuf,
    pub log_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSettings {
    pub ipc_socket: PathBuf,
    pub hot_reload: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    pub spotify: SpotifySettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastfm: Option<LastFmSettings>,
    pub runtime: RuntimeSettings,
    pub supervisor: SupervisorSettings,
}

impl GlobalConfig {
    /// Defaults seeded from the resolved layout. Credentials start as
    /// placeholders so a fresh install parses but refuses to talk to Spotify.
    pub fn defaults_for(paths: &ConfigPaths) -> Self {
        Self {
            spotify: SpotifySettings {
                client_id: SPOTIFY_PLACEHOLDER.to_string(),
                client_secret: SPOTIFY_PLACEHOLDER.to_string(),
                redirect_uri: default_redirect_uri(),
                scopes: vec![
                    "user-library-read".to_string(),
                    "playlist-read-private".to_string(),
                    "playlist-modify-private".to_string(),
                    "playlist-modify-public".to_string(),
                ],
            },
            lastfm: None,
            runtime: RuntimeSettings {
                timezone: "UTC".to_string(),
                storage_dir: paths.state_dir(),
                log_level: "info".to_string(),
                default_retry: Some(RetryPolicy::default()),
            },
            supervisor: SupervisorSettings {
                ipc_socket: paths.ipc_socket(),
                hot_reload: true,
            },
        }
    }

    /// The configured retry policy with defaults applied.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.runtime.default_retry.clone().unwrap_or_default()
    }
}

/// Load the global configuration: layout defaults, then `config.yml`, then
/// environment overrides (prefix: `SYNCOPATE_`, sections split on `__`).
pub fn load_global_config(paths: &ConfigPaths) -> Result<GlobalConfig> {
    if !paths.global_config.exists() {
        return Err(ConfigError::NotFound(paths.global_config.clone()));
    }

    let config: GlobalConfig = Figment::from(Serialized::defaults(GlobalConfig::defaults_for(paths)))
        .merge(Yaml::file(&paths.global_config))
        .merge(Env::prefixed("SYNCOPATE_").split("__"))
        .extract()?;

    info!(target: "config", path = %paths.global_config.display(), "global configuration loaded");
    Ok(config)
}
