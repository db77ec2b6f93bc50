// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};

use crate::auth::SpotifyAuth;
use crate::error::{Result, SpotifyError};
use crate::models::{
    CurrentUser, Page, Playlist, PlaylistEntry, SavedTrackEntry, Track, TrackSearchResults,
};

const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
const USER_AGENT: &str = concat!("Syncopate/", env!("CARGO_PKG_VERSION"));

/// Fixed per-request timeout (spec: Spotify calls carry a 10 s budget).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of tracks per mutation request.
pub const BATCH_SIZE: usize = 100;

/// Page size used for listings.
pub const PAGE_LIMIT: usize = 50;

/// Low-level Spotify Web API client.
///
/// Bearer tokens come from [`SpotifyAuth`] on every request; 429 responses
/// are classified as [`SpotifyError::RateLimited`] with the `Retry-After`
/// header value attached.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: Client,
    base_url: String,
    auth: SpotifyAuth,
}

impl SpotifyClient {
    pub fn new(auth: SpotifyAuth) -> Result<Self> {
        Self::builder(auth).build()
    }

    pub fn builder(auth: SpotifyAuth) -> SpotifyClientBuilder {
        SpotifyClientBuilder {
            auth,
            base_url: SPOTIFY_API_BASE.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    // ------------------------------------------------------------------
    // User & playlists
    // ------------------------------------------------------------------

    pub async fn current_user(&self) -> Result<CurrentUser> {
        self.get_json(&format!("{}/me", self.base_url)).await
    }

    pub async fn current_user_playlists(&self, offset: usize) -> Result<Page<Playlist>> {
        self.get_json(&format!(
            "{}/me/playlists?limit={PAGE_LIMIT}&offset={offset}",
            self.base_url
        ))
        .await
    }

    pub async fn playlist(&self, playlist_id: &str) -> Result<Playlist> {
        self.get_json(&format!("{}/playlists/{playlist_id}", self.base_url))
            .await
    }

    pub async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        public: bool,
        description: Option<&str>,
    ) -> Result<Playlist> {
        let body = json!({
            "name": name,
            "public": public,
            "description": description.unwrap_or(""),
        });
        let response = self
            .send(
                self.request(Method::POST, &format!("{}/users/{user_id}/playlists", self.base_url))
                    .await?
                    .json(&body),
            )
            .await?;
        Self::parse_json(response).await
    }

    pub async fn playlist_items(
        &self,
        playlist_id: &str,
        offset: usize,
    ) -> Result<Page<PlaylistEntry>> {
        self.get_json(&format!(
            "{}/playlists/{playlist_id}/tracks?limit={PAGE_LIMIT}&offset={offset}",
            self.base_url
        ))
        .await
    }

    pub async fn saved_tracks(&self, limit: usize, offset: usize) -> Result<Page<SavedTrackEntry>> {
        self.get_json(&format!(
            "{}/me/tracks?limit={limit}&offset={offset}",
            self.base_url
        ))
        .await
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Add one batch of at most [`BATCH_SIZE`] tracks.
    pub async fn add_items(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let body = json!({ "uris": track_uris(track_ids) });
        let _ = self
            .send(
                self.request(Method::POST, &format!("{}/playlists/{playlist_id}/tracks", self.base_url))
                    .await?
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    /// Remove all occurrences of one batch of tracks.
    pub async fn remove_items(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let tracks: Vec<_> = track_uris(track_ids)
            .into_iter()
            .map(|uri| json!({ "uri": uri }))
            .collect();
        let _ = self
            .send(
                self.request(Method::DELETE, &format!("{}/playlists/{playlist_id}/tracks", self.base_url))
                    .await?
                    .json(&json!({ "tracks": tracks })),
            )
            .await?;
        Ok(())
    }

    /// Replace the playlist contents with one batch of at most
    /// [`BATCH_SIZE`] tracks (possibly empty).
    pub async fn replace_items(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let body = json!({ "uris": track_uris(track_ids) });
        let _ = self
            .send(
                self.request(Method::PUT, &format!("{}/playlists/{playlist_id}/tracks", self.base_url))
                    .await?
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    pub async fn change_details(
        &self,
        playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        public: Option<bool>,
    ) -> Result<()> {
        let mut body = serde_json::Map::new();
        if let Some(name) = name {
            body.insert("name".to_string(), json!(name));
        }
        if let Some(description) = description {
            body.insert("description".to_string(), json!(description));
        }
        if let Some(public) = public {
            body.insert("public".to_string(), json!(public));
        }
        if body.is_empty() {
            return Ok(());
        }

        let _ = self
            .send(
                self.request(Method::PUT, &format!("{}/playlists/{playlist_id}", self.base_url))
                    .await?
                    .json(&serde_json::Value::Object(body)),
            )
            .await?;
        Ok(())
    }

    /// Upload a base64-encoded JPEG as the playlist cover.
    pub async fn upload_cover(&self, playlist_id: &str, image_b64: String) -> Result<()> {
        let _ = self
            .send(
                self.request(Method::PUT, &format!("{}/playlists/{playlist_id}/images", self.base_url))
                    .await?
                    .header("Content-Type", "image/jpeg")
                    .body(image_b64),
            )
            .await?;
        Ok(())
    }

    pub async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let url = format!(
            "{}/search?q={}&type=track&limit={limit}",
            self.base_url,
            urlencoding::encode(query)
        );
        let results: TrackSearchResults = self.get_json(&url).await?;
        Ok(results.tracks.map(|page| page.items).unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = self.auth.access_token(&self.http).await?;
        trace!(target: "spotify", %method, url, "request");
        Ok(self
            .http
            .request(method, url)
            .header("Authorization", format!("Bearer {token}"))
            .header("User-Agent", USER_AGENT))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, url).await?).await?;
        Self::parse_json(response).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!(target: "spotify", status = %status, "response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            return Err(SpotifyError::RateLimited { retry_after });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = response.text().await.unwrap_or_default();
            return Err(SpotifyError::AuthFailed(message));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SpotifyError::NotFound(
                response.url().path().to_string(),
            ));
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SpotifyError::ApiError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| SpotifyError::InvalidResponse(format!("failed to parse response: {e}")))
    }
}

fn track_uris(track_ids: &[String]) -> Vec<String> {
    track_ids
        .iter()
        .map(|id| {
            if id.starts_with("spotify:") {
                id.clone()
            } else {
                format!("spotify:track:{id}")
            }
        })
        .collect()
}

/// Builder for configuring a Spotify client.
#[derive(Debug)]
pub struct SpotifyClientBuilder {
    auth: SpotifyAuth,
    base_url: String,
    timeout: Duration,
}

impl SpotifyClientBuilder {
    /// Set a custom API base URL (mock servers in tests).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<SpotifyClient> {
        let http = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(SpotifyClient {
            http,
            base_url: self.base_url,
            auth: self.auth,
        })
    }
}
