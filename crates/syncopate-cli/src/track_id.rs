// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{bail, Result};

/// Spotify track ids are base62 strings of exactly this length.
const TRACK_ID_LENGTH: usize = 22;

/// Accept a bare track id, a `spotify:track:` URI, or an open.spotify.com
/// URL, and return the bare id.
pub fn parse_track_id(value: &str) -> Result<String> {
    let value = value.trim();

    let candidate = if let Some(id) = value.strip_prefix("spotify:track:") {
        id
    } else if let Some(rest) = value
        .strip_prefix("https://open.spotify.com/track/")
        .or_else(|| value.strip_prefix("http://open.spotify.com/track/"))
    {
        rest.split(['?', '/']).next().unwrap_or_default()
    } else {
        value
    };

    if candidate.len() != TRACK_ID_LENGTH
        || !candidate.chars().all(|c| c.is_ascii_alphanumeric())
    {
        bail!("'{value}' does not look like a Spotify track id (expected {TRACK_ID_LENGTH} base62 characters)");
    }
    Ok(candidate.to_string())
}
