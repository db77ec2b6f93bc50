// SPDX-License-Identifier: GPL-3.0-or-later

use chrono::Utc;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use syncopate_config::{ConfigPaths, GlobalConfig};

use crate::auth::{SpotifyAuth, TokenCache};
use crate::cache::{CachedPlaylist, SharedPlaylistCache};
use crate::client::SpotifyClient;
use crate::service::{SavedTracksQuery, ScanDirection, SpotifyService};

fn service_for(server: &MockServer, dir: &tempfile::TempDir) -> SpotifyService {
    let path = dir.path().join("token.json");
    TokenCache {
        access_token: "token".to_string(),
        refresh_token: "r".to_string(),
        expires_at: Utc::now().timestamp() + 3600,
        scope: None,
    }
    .save(&path)
    .unwrap();

    let mut config = GlobalConfig::defaults_for(&ConfigPaths::from_base_dir("/tmp/syncopate"));
    config.spotify.client_id = "id".to_string();
    config.spotify.client_secret = "secret".to_string();

    let auth = SpotifyAuth::from_config(&config)
        .unwrap()
        .with_cache_path(path)
        .with_accounts_base(server.uri());
    let client = SpotifyClient::builder(auth)
        .base_url(format!("{}/v1", server.uri()))
        .build()
        .unwrap();
    SpotifyService::new(client)
}

fn playlist_json(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({"id": id, "name": name, "uri": format!("spotify:playlist:{id}")})
}

#[tokio::test]
async fn list_all_playlists_follows_pagination() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let service = service_for(&server, &dir);

    Mock::given(method("GET"))
        .and(path("/v1/me/playlists"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [playlist_json("p1", "One"), playlist_json("p2", "Two")],
            "next": format!("{}/v1/me/playlists?offset=2", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/me/playlists"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [playlist_json("p3", "Three")],
            "next": null,
        })))
        .mount(&server)
        .await;

    let playlists = service.list_all_playlists().await.unwrap();
    assert_eq!(playlists.len(), 3);
    assert_eq!(playlists[2].id, "p3");
}

#[tokio::test]
async fn find_by_name_prefers_the_shared_cache() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = SharedPlaylistCache::new(
        "2026-08-01T00:00:00+00:00".to_string(),
        vec![CachedPlaylist {
            id: "cached".to_string(),
            name: "Morning Mix".to_string(),
            uri: None,
            href: None,
            public: Some(false),
            collaborative: Some(false),
            owner_id: None,
            snapshot_id: None,
        }],
    );
    let service = service_for(&server, &dir).with_shared_cache(Some(cache));

    // no /me/playlists mock mounted: a cache hit must not touch the API
    let found = service.find_playlist_by_name("morning mix").await.unwrap();
    assert_eq!(found.unwrap().id, "cached");
}

#[tokio::test]
async fn ensure_playlist_creates_when_absent() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let service = service_for(&server, &dir);

    Mock::given(method("GET"))
        .and(path("/v1/me/playlists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [], "next": null,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "me"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/users/me/playlists"))
        .and(body_string_contains("Fresh Finds"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(playlist_json("new-id", "Fresh Finds")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let playlist = service
        .ensure_playlist("Fresh Finds", false, Some("weekly"))
        .await
        .unwrap();
    assert_eq!(playlist.id, "new-id");
}

fn saved_entry(id: &str, added_at: &str) -> serde_json::Value {
    serde_json::json!({
        "added_at": added_at,
        "track": {"id": id, "name": id, "artists": []},
    })
}

#[tokio::test]
async fn saved_tracks_scan_halts_at_the_cursor() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let service = service_for(&server, &dir);

    // newest-first listing: t3 (newest), t2, t1 (cursor)
    Mock::given(method("GET"))
        .and(path("/v1/me/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                saved_entry("t3", "2026-08-01T10:00:00Z"),
                saved_entry("t2", "2026-08-01T09:00:00Z"),
                saved_entry("t1", "2026-08-01T08:00:00Z"),
            ],
            "next": null,
        })))
        .mount(&server)
        .await;

    let oldest_first = service
        .get_saved_tracks(&SavedTracksQuery {
            last_processed_id: Some("t1".to_string()),
            direction: ScanDirection::Oldest,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(oldest_first, vec!["t2".to_string(), "t3".to_string()]);

    let newest_first = service
        .get_saved_tracks(&SavedTracksQuery {
            last_processed_id: Some("t1".to_string()),
            direction: ScanDirection::Newest,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(newest_first, vec!["t3".to_string(), "t2".to_string()]);
}

#[tokio::test]
async fn saved_tracks_scan_honours_lookback_count() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let service = service_for(&server, &dir);

    Mock::given(method("GET"))
        .and(path("/v1/me/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                saved_entry("t5", "2026-08-01T10:00:00Z"),
                saved_entry("t4", "2026-08-01T09:00:00Z"),
                saved_entry("t3", "2026-08-01T08:00:00Z"),
            ],
            "next": null,
        })))
        .mount(&server)
        .await;

    let collected = service
        .get_saved_tracks(&SavedTracksQuery {
            lookback_count: Some(2),
            full_scan: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(collected, vec!["t4".to_string(), "t5".to_string()]);
}

#[tokio::test]
async fn replace_tracks_replaces_then_appends() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let service = service_for(&server, &dir);

    Mock::given(method("PUT"))
        .and(path("/v1/playlists/p1/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"snapshot_id": "s"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/playlists/p1/tracks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"snapshot_id": "s"})))
        .expect(2)
        .mount(&server)
        .await;

    let ids: Vec<String> = (0..250).map(|i| format!("t{i}")).collect();
    service.replace_tracks("p1", &ids).await.unwrap();
}

#[tokio::test]
async fn search_track_relaxes_and_matches_by_name() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let service = service_for(&server, &dir);

    // strict field query misses
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tracks": {"items": []}
        })))
        .mount(&server)
        .await;
    // relaxed query returns a list; the name+artist match wins over order
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tracks": {"items": [
                {"id": "wrong", "name": "Karma Chameleon", "artists": [{"name": "Culture Club"}]},
                {"id": "right", "name": "Karma Police (Live)", "artists": [{"name": "Radiohead"}]},
            ]}
        })))
        .mount(&server)
        .await;

    let hit = service
        .search_track("Karma Police", Some("Radiohead"), 5)
        .await
        .unwrap();
    assert_eq!(hit.as_deref(), Some("right"));
}
