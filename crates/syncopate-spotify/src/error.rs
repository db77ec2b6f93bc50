// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpotifyError>;

#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("Spotify credentials are not configured; update config.yml")]
    CredentialsMissing,

    #[error("Spotify authorization failed: {0}")]
    AuthFailed(String),

    #[error("rate limited by Spotify{}", retry_after.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("invalid response from Spotify API: {0}")]
    InvalidResponse(String),

    #[error("failed to access token cache: {0}")]
    TokenCache(String),
}

impl SpotifyError {
    /// True for the 429 condition that must not fail a run.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
