// SPDX-License-Identifier: GPL-3.0-or-later

//! Spotify Web API client for syncopate.
//!
//! This crate wraps the handful of playlist and library endpoints the sync
//! modules need: playlist discovery and creation, track listing with
//! pagination, batched mutation, cover upload, and track search. Rate limits
//! (HTTP 429) surface as a typed condition carrying the `Retry-After` value
//! so callers can record them without treating them as failures.

pub mod auth;
pub mod cache;
pub mod client;
pub mod error;
pub mod models;
pub mod service;
#[cfg(test)]
mod service_tests;

pub use auth::{SpotifyAuth, TokenCache};
pub use cache::{CachedPlaylist, SharedPlaylistCache};
pub use client::{SpotifyClient, SpotifyClientBuilder};
pub use error::{Result, SpotifyError};
pub use models::{CurrentUser, Page, Playlist, PlaylistEntry, SavedTrackEntry, Track};
pub use service::{format_pattern, SpotifyService};
