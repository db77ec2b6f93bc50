// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use syncopate_config::GlobalConfig;

use crate::error::{Result, SpotifyError};

const ACCOUNTS_BASE: &str = "https://accounts.spotify.com";

/// Refresh the access token this many seconds before it actually expires.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

const DEFAULT_SCOPES: [&str; 3] = [
    "playlist-read-private",
    "playlist-modify-private",
    "playlist-modify-public",
];

/// Cached OAuth token as persisted under `<storage>/auth_cache/token.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenCache {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| SpotifyError::TokenCache(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| SpotifyError::TokenCache(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SpotifyError::TokenCache(format!("{}: {e}", parent.display())))?;
        }
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| SpotifyError::TokenCache(e.to_string()))?;
        fs::write(path, raw)
            .map_err(|e| SpotifyError::TokenCache(format!("{}: {e}", path.display())))
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() + EXPIRY_MARGIN_SECONDS >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Refresh-token authorization against the Spotify accounts service.
///
/// The initial user authorization (authorization-code grant) happens out of
/// band; this type only refreshes the cached token and keeps the cache file
/// up to date.
#[derive(Debug, Clone)]
pub struct SpotifyAuth {
    client_id: String,
    client_secret: String,
    scope: String,
    cache_path: PathBuf,
    accounts_base: String,
}

impl SpotifyAuth {
    /// Build from global configuration, rejecting placeholder credentials.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        if !config.spotify.is_configured() {
            return Err(SpotifyError::CredentialsMissing);
        }

        let mut scopes: Vec<String> = if config.spotify.scopes.is_empty() {
            DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
        } else {
            config.spotify.scopes.clone()
        };
        scopes.sort();
        scopes.dedup();

        Ok(Self {
            client_id: config.spotify.client_id.clone(),
            client_secret: config.spotify.client_secret.clone(),
            scope: scopes.join(" "),
            cache_path: config
                .runtime
                .storage_dir
                .join("auth_cache")
                .join("token.json"),
            accounts_base: ACCOUNTS_BASE.to_string(),
        })
    }

    /// Override the accounts endpoint (mock servers in tests).
    pub fn with_accounts_base(mut self, base: impl Into<String>) -> Self {
        self.accounts_base = base.into();
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Return a valid access token, refreshing and re-caching if expired.
    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String> {
        let cached = TokenCache::load(&self.cache_path).map_err(|_| {
            SpotifyError::AuthFailed(format!(
                "no cached token at {}; authorize this application first",
                self.cache_path.display()
            ))
        })?;

        if !cached.is_expired() {
            return Ok(cached.access_token);
        }

        debug!(target: "spotify", "access token expired, refreshing");
        let refreshed = self.refresh(http, &cached.refresh_token).await?;
        refreshed.save(&self.cache_path)?;
        Ok(refreshed.access_token)
    }

    async fn refresh(&self, http: &reqwest::Client, refresh_token: &str) -> Result<TokenCache> {
        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = http
            .post(format!("{}/api/token", self.accounts_base))
            .header("Authorization", format!("Basic {basic}"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SpotifyError::AuthFailed(format!(
                "token refresh returned {status}: {message}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::AuthFailed(format!("invalid token response: {e}")))?;

        Ok(TokenCache {
            access_token: token.access_token,
            refresh_token: token
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            expires_at: Utc::now().timestamp() + token.expires_in,
            scope: token.scope,
        })
    }
}
